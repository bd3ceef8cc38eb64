/* Positional wire encoding.

   Records travel as JSON arrays indexed by field id, with `null` in every
   slot no field owns. Variants travel as `[ordinal]` or `[ordinal, payload]`.
   This module is the reference for what the generated accessors read and
   write, and works directly against a resolved schema. */

use crate::index::ResolvedSchema;
use glue_types::{Record, Type, TypeKey, Variant};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Zero value of an identifier.
pub const ZERO_ID: &str = "00000000-0000-0000-0000-000000000000";

/* Default for `raw`: an empty JSON object */
pub const RAW_DEFAULT: &str = "{}";

/// A decoded value of some schema type.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
  Bool(bool),
  Str(String),
  Int32(i32),
  Any(Value),
  Raw(String),
  Empty,
  Id(String),
  /// Absent `nullable` or `any`. This is the only form of an absent value:
  /// `Any` never holds a JSON `null`.
  Null,
  Array(Vec<Datum>),
  Dict(BTreeMap<String, Datum>),
  Record(BTreeMap<u16, Datum>),
  Variant {
    ordinal: u16,
    payload: Option<Box<Datum>>,
  },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
  #[error("expected {expected} for type {ty}, found {found}")]
  Mismatch {
    expected: &'static str,
    ty: String,
    found: String,
  },

  #[error("unknown ordinal {ordinal} for variant '{variant}'")]
  UnknownOrdinal { variant: String, ordinal: i64 },

  #[error("case {ordinal} of variant '{variant}' requires a payload")]
  MissingPayload { variant: String, ordinal: u16 },

  #[error("case {ordinal} of variant '{variant}' carries no payload")]
  UnexpectedPayload { variant: String, ordinal: u16 },

  #[error("type {0} is not resolved against this schema")]
  Unresolved(String),

  #[error("record '{record}' has no field {field}")]
  UnknownField { record: String, field: u16 },

  #[error("record '{record}' has no construction profile {profile}")]
  UnknownProfile { record: String, profile: u16 },

  #[error("profile {profile} of record '{record}' requires field {field}")]
  MissingProfileField {
    record: String,
    profile: u16,
    field: u16,
  },

  #[error("profile {profile} of record '{record}' does not accept field {field}")]
  UnexpectedProfileField {
    record: String,
    profile: u16,
    field: u16,
  },
}

pub type WireResult<T> = Result<T, WireError>;

fn json_kind(value: &Value) -> String {
  match value {
    Value::Null => "null".to_string(),
    Value::Bool(_) => "bool".to_string(),
    Value::Number(n) => format!("number {}", n),
    Value::String(_) => "string".to_string(),
    Value::Array(items) => format!("array of {}", items.len()),
    Value::Object(_) => "object".to_string(),
  }
}

fn datum_kind(datum: &Datum) -> String {
  match datum {
    Datum::Bool(_) => "bool",
    Datum::Str(_) => "str",
    Datum::Int32(_) => "int32",
    Datum::Any(_) => "any",
    Datum::Raw(_) => "raw",
    Datum::Empty => "empty",
    Datum::Id(_) => "id",
    Datum::Null => "null",
    Datum::Array(_) => "array",
    Datum::Dict(_) => "dict",
    Datum::Record(_) => "record",
    Datum::Variant { .. } => "variant",
  }
  .to_string()
}

impl Datum {
  /// Wrap a JSON value as `any`, folding `null` into [`Datum::Null`].
  pub fn any(value: Value) -> Datum {
    match value {
      Value::Null => Datum::Null,
      value => Datum::Any(value),
    }
  }
}

/// Encoder and decoder bound to one resolved schema.
pub struct Codec<'a> {
  schema: &'a ResolvedSchema,
}

impl<'a> Codec<'a> {
  pub fn new(schema: &'a ResolvedSchema) -> Self {
    Self { schema }
  }

  fn record(&self, key: TypeKey) -> WireResult<&'a Record> {
    self
      .schema
      .schema()
      .record(key)
      .ok_or_else(|| WireError::Unresolved(key.to_string()))
  }

  fn variant(&self, key: TypeKey) -> WireResult<&'a Variant> {
    self
      .schema
      .schema()
      .variant(key)
      .ok_or_else(|| WireError::Unresolved(key.to_string()))
  }

  fn record_name(&self, key: TypeKey) -> String {
    self
      .schema
      .schema()
      .qualified_type_name(key)
      .unwrap_or_else(|| key.to_string())
  }

  /// Zero value of `ty`.
  pub fn default_value(&self, ty: &Type) -> WireResult<Datum> {
    Ok(match ty {
      Type::Bool => Datum::Bool(false),
      Type::Str => Datum::Str(String::new()),
      Type::Int32 => Datum::Int32(0),
      Type::Any | Type::Nullable(_) => Datum::Null,
      Type::Raw => Datum::Raw(RAW_DEFAULT.to_string()),
      Type::Empty => Datum::Empty,
      Type::Id(_) => Datum::Id(ZERO_ID.to_string()),
      Type::Array(_) => Datum::Array(Vec::new()),
      Type::Dict(_) => Datum::Dict(BTreeMap::new()),
      Type::Record(key) => {
        let record = self.record(*key)?;
        let mut fields = BTreeMap::new();
        for field in record.fields.values() {
          fields.insert(field.id, self.default_value(&field.ty)?);
        }
        Datum::Record(fields)
      }
      Type::Variant(key) => {
        let variant = self.variant(*key)?;
        let case = variant.default_value().ok_or_else(|| WireError::UnknownOrdinal {
          variant: self.record_name(*key),
          ordinal: 0,
        })?;
        let payload = match &case.payload {
          Some(ty) => Some(Box::new(self.default_value(ty)?)),
          None => None,
        };
        Datum::Variant {
          ordinal: case.ordinal,
          payload,
        }
      }
      Type::Named(name) => return Err(WireError::Unresolved(name.clone())),
    })
  }

  /// Build a record through construction profile `profile`. Profile 0 accepts
  /// any subset of fields; every other profile takes exactly its declared
  /// fields. Fields not supplied receive their zero value.
  pub fn construct(&self, key: TypeKey, profile: u16, mut values: BTreeMap<u16, Datum>) -> WireResult<Datum> {
    let record = self.record(key)?;
    let name = self.record_name(key);

    if let Some(field) = values.keys().find(|id| !record.fields.contains_key(*id)) {
      return Err(WireError::UnknownField {
        record: name,
        field: *field,
      });
    }

    if profile != 0 {
      let required = &record
        .profiles
        .get(&profile)
        .ok_or_else(|| WireError::UnknownProfile {
          record: name.clone(),
          profile,
        })?
        .fields;
      if let Some(field) = required.iter().find(|id| !values.contains_key(*id)) {
        return Err(WireError::MissingProfileField {
          record: name,
          profile,
          field: *field,
        });
      }
      if let Some(field) = values.keys().find(|id| !required.contains(*id)) {
        return Err(WireError::UnexpectedProfileField {
          record: name,
          profile,
          field: *field,
        });
      }
    }

    let mut fields = BTreeMap::new();
    for field in record.fields.values() {
      let value = match values.remove(&field.id) {
        Some(value) => value,
        None => self.default_value(&field.ty)?,
      };
      fields.insert(field.id, value);
    }
    Ok(Datum::Record(fields))
  }

  pub fn encode(&self, ty: &Type, datum: &Datum) -> WireResult<Value> {
    let mismatch = |expected: &'static str| WireError::Mismatch {
      expected,
      ty: ty.to_string(),
      found: datum_kind(datum),
    };

    match (ty, datum) {
      (Type::Nullable(_), Datum::Null) | (Type::Any, Datum::Null) => Ok(Value::Null),
      /* Would decode as Datum::Null */
      (_, Datum::Any(Value::Null)) => Err(WireError::Mismatch {
        expected: "Datum::Null for an absent any",
        ty: ty.to_string(),
        found: "any null".to_string(),
      }),
      (Type::Nullable(inner), _) => self.encode(inner, datum),
      (Type::Bool, Datum::Bool(b)) => Ok(Value::Bool(*b)),
      (Type::Str, Datum::Str(s)) => Ok(Value::String(s.clone())),
      (Type::Int32, Datum::Int32(n)) => Ok(Value::from(*n)),
      (Type::Any, Datum::Any(v)) => Ok(v.clone()),
      (Type::Raw, Datum::Raw(s)) => Ok(Value::String(s.clone())),
      (Type::Empty, Datum::Empty) => Ok(Value::Object(Map::new())),
      (Type::Id(_), Datum::Id(s)) => Ok(Value::String(s.clone())),
      (Type::Array(inner), Datum::Array(items)) => items
        .iter()
        .map(|item| self.encode(inner, item))
        .collect::<WireResult<Vec<_>>>()
        .map(Value::Array),
      (Type::Dict(inner), Datum::Dict(entries)) => {
        let mut map = Map::new();
        for (k, v) in entries {
          map.insert(k.clone(), self.encode(inner, v)?);
        }
        Ok(Value::Object(map))
      }
      (Type::Record(key), Datum::Record(fields)) => self.encode_record(*key, fields),
      (Type::Variant(key), Datum::Variant { ordinal, payload }) => {
        self.encode_variant(*key, *ordinal, payload.as_deref())
      }
      (Type::Named(name), _) => Err(WireError::Unresolved(name.clone())),
      (Type::Bool, _) => Err(mismatch("bool")),
      (Type::Str, _) => Err(mismatch("str")),
      (Type::Int32, _) => Err(mismatch("int32")),
      (Type::Any, _) => Err(mismatch("any")),
      (Type::Raw, _) => Err(mismatch("raw")),
      (Type::Empty, _) => Err(mismatch("empty")),
      (Type::Id(_), _) => Err(mismatch("id")),
      (Type::Array(_), _) => Err(mismatch("array")),
      (Type::Dict(_), _) => Err(mismatch("dict")),
      (Type::Record(_), _) => Err(mismatch("record")),
      (Type::Variant(_), _) => Err(mismatch("variant")),
    }
  }

  fn encode_record(&self, key: TypeKey, fields: &BTreeMap<u16, Datum>) -> WireResult<Value> {
    let record = self.record(key)?;
    if let Some(field) = fields.keys().find(|id| !record.fields.contains_key(*id)) {
      return Err(WireError::UnknownField {
        record: self.record_name(key),
        field: *field,
      });
    }

    let mut slots = vec![Value::Null; record.wire_len()];
    for field in record.fields.values() {
      let encoded = match fields.get(&field.id) {
        Some(value) => self.encode(&field.ty, value)?,
        None => self.encode(&field.ty, &self.default_value(&field.ty)?)?,
      };
      slots[usize::from(field.id)] = encoded;
    }
    Ok(Value::Array(slots))
  }

  fn encode_variant(&self, key: TypeKey, ordinal: u16, payload: Option<&Datum>) -> WireResult<Value> {
    let variant = self.variant(key)?;
    let case = variant
      .values
      .get(&ordinal)
      .ok_or_else(|| WireError::UnknownOrdinal {
        variant: self.record_name(key),
        ordinal: i64::from(ordinal),
      })?;
    match (&case.payload, payload) {
      (Some(ty), Some(payload)) => Ok(Value::Array(vec![
        Value::from(ordinal),
        self.encode(ty, payload)?,
      ])),
      (None, None) => Ok(Value::Array(vec![Value::from(ordinal)])),
      (Some(_), None) => Err(WireError::MissingPayload {
        variant: self.record_name(key),
        ordinal,
      }),
      (None, Some(_)) => Err(WireError::UnexpectedPayload {
        variant: self.record_name(key),
        ordinal,
      }),
    }
  }

  pub fn decode(&self, ty: &Type, value: &Value) -> WireResult<Datum> {
    let mismatch = |expected: &'static str| WireError::Mismatch {
      expected,
      ty: ty.to_string(),
      found: json_kind(value),
    };

    match (ty, value) {
      (Type::Nullable(_), Value::Null) | (Type::Any, Value::Null) => Ok(Datum::Null),
      (Type::Nullable(inner), _) => self.decode(inner, value),
      (Type::Bool, Value::Bool(b)) => Ok(Datum::Bool(*b)),
      (Type::Str, Value::String(s)) => Ok(Datum::Str(s.clone())),
      (Type::Int32, Value::Number(n)) => n
        .as_i64()
        .and_then(|n| i32::try_from(n).ok())
        .map(Datum::Int32)
        .ok_or_else(|| mismatch("int32")),
      (Type::Any, _) => Ok(Datum::any(value.clone())),
      (Type::Raw, Value::String(s)) => Ok(Datum::Raw(s.clone())),
      (Type::Empty, Value::Null) => Ok(Datum::Empty),
      (Type::Empty, Value::Object(map)) if map.is_empty() => Ok(Datum::Empty),
      (Type::Id(_), Value::String(s)) => Ok(Datum::Id(s.clone())),
      (Type::Array(inner), Value::Array(items)) => items
        .iter()
        .map(|item| self.decode(inner, item))
        .collect::<WireResult<Vec<_>>>()
        .map(Datum::Array),
      (Type::Dict(inner), Value::Object(map)) => {
        let mut entries = BTreeMap::new();
        for (k, v) in map {
          entries.insert(k.clone(), self.decode(inner, v)?);
        }
        Ok(Datum::Dict(entries))
      }
      (Type::Record(key), Value::Array(items)) => self.decode_record(*key, items),
      (Type::Variant(key), Value::Array(items)) => self.decode_variant(*key, items),
      (Type::Named(name), _) => Err(WireError::Unresolved(name.clone())),
      (Type::Bool, _) => Err(mismatch("bool")),
      (Type::Str, _) => Err(mismatch("str")),
      (Type::Int32, _) => Err(mismatch("int32")),
      (Type::Raw, _) => Err(mismatch("raw")),
      (Type::Empty, _) => Err(mismatch("empty")),
      (Type::Id(_), _) => Err(mismatch("id")),
      (Type::Array(_), _) => Err(mismatch("array")),
      (Type::Dict(_), _) => Err(mismatch("object")),
      (Type::Record(_), _) => Err(mismatch("positional array")),
      (Type::Variant(_), _) => Err(mismatch("[ordinal, payload?]")),
    }
  }

  /* Short sequences come from older writers: missing trailing fields take
     their zero value. Extra trailing entries come from newer writers and are
     ignored, as are the placeholders in unowned slots. */
  fn decode_record(&self, key: TypeKey, items: &[Value]) -> WireResult<Datum> {
    let record = self.record(key)?;
    let mut fields = BTreeMap::new();
    for field in record.fields.values() {
      let value = match items.get(usize::from(field.id)) {
        Some(item) => self.decode(&field.ty, item)?,
        None => self.default_value(&field.ty)?,
      };
      fields.insert(field.id, value);
    }
    Ok(Datum::Record(fields))
  }

  fn decode_variant(&self, key: TypeKey, items: &[Value]) -> WireResult<Datum> {
    let variant = self.variant(key)?;
    let name = || self.record_name(key);
    let raw = match items.first() {
      Some(Value::Number(n)) => n.as_i64(),
      _ => None,
    }
    .ok_or_else(|| WireError::Mismatch {
      expected: "integer ordinal",
      ty: name(),
      found: items.first().map_or_else(|| "nothing".to_string(), json_kind),
    })?;

    let case = u16::try_from(raw)
      .ok()
      .and_then(|ordinal| variant.values.get(&ordinal))
      .ok_or_else(|| WireError::UnknownOrdinal {
        variant: name(),
        ordinal: raw,
      })?;

    let payload = match &case.payload {
      Some(ty) => {
        let item = items.get(1).ok_or_else(|| WireError::MissingPayload {
          variant: name(),
          ordinal: case.ordinal,
        })?;
        Some(Box::new(self.decode(ty, item)?))
      }
      None => None,
    };
    Ok(Datum::Variant {
      ordinal: case.ordinal,
      payload,
    })
  }
}

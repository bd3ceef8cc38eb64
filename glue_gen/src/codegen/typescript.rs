/* Lowering of schema types to TypeScript type expressions and to the
   expressions converting between class instances and positional wire
   values. */

use super::emitter::Emitter;
use super::naming::{namespace_alias, type_name};
use crate::error::{BuildError, BuildResult};
use crate::index::ResolvedSchema;
use crate::wire::ZERO_ID;
use glue_types::{Type, TypeKey};
use indexmap::IndexMap;
use std::collections::BTreeSet;

pub const RUNTIME_ALIAS: &str = "_rt";
pub const EMPTY_TYPE: &str = "Record<string, never>";

/// Where a generated file sits relative to the definitions it mentions.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
  pub resolved: &'a ResolvedSchema,
  /// Namespace owning the file
  pub home: u16,
  /// Home definitions are declared in this very file and need no prefix
  pub local: bool,
}

impl<'a> Scope<'a> {
  pub fn new(resolved: &'a ResolvedSchema, home: u16, local: bool) -> Self {
    Self {
      resolved,
      home,
      local,
    }
  }

  fn prefix(&self, namespace: u16) -> String {
    if self.local && namespace == self.home {
      String::new()
    } else {
      format!("{}.", namespace_alias(namespace))
    }
  }

  pub fn def_name(&self, key: TypeKey) -> BuildResult<String> {
    self
      .resolved
      .schema()
      .type_def(key)
      .map(|def| type_name(def.name()))
      .ok_or_else(|| BuildError::Internal(format!("no definition at {}", key)))
  }

  /* Class name, qualified as seen from this file */
  pub fn type_ref(&self, key: TypeKey) -> BuildResult<String> {
    Ok(format!("{}{}", self.prefix(key.namespace), self.def_name(key)?))
  }

  /* Tuple type of the wire form */
  pub fn fields_ref(&self, key: TypeKey) -> BuildResult<String> {
    Ok(format!("{}_fields_{}", self.prefix(key.namespace), self.def_name(key)?))
  }

  pub fn id_ref(&self, key: TypeKey) -> BuildResult<String> {
    Ok(format!("{}Id", self.type_ref(key)?))
  }

  fn nominal(&self, ty: &Type) -> Option<TypeKey> {
    match ty {
      Type::Id(Some(of)) => match of.as_ref() {
        Type::Record(key) if self.resolved.has_nominal_id(*key) => Some(*key),
        _ => None,
      },
      _ => None,
    }
  }

  /// Type exposed by getters and accepted by setters.
  pub fn class_type(&self, ty: &Type) -> BuildResult<String> {
    Ok(match ty {
      Type::Id(_) => match self.nominal(ty) {
        Some(key) => self.id_ref(key)?,
        None => "string".to_string(),
      },
      Type::Nullable(inner) => format!("{} | null", self.class_type(inner)?),
      Type::Array(inner) => format!("Array<{}>", self.class_type(inner)?),
      Type::Dict(inner) => format!("Record<string, {}>", self.class_type(inner)?),
      Type::Record(key) | Type::Variant(key) => self.type_ref(*key)?,
      other => scalar_type(other)?.to_string(),
    })
  }

  /// Type of the positional wire value.
  pub fn wire_type(&self, ty: &Type) -> BuildResult<String> {
    Ok(match ty {
      Type::Id(_) => "string".to_string(),
      Type::Nullable(inner) => format!("{} | null", self.wire_type(inner)?),
      Type::Array(inner) => format!("Array<{}>", self.wire_type(inner)?),
      Type::Dict(inner) => format!("Record<string, {}>", self.wire_type(inner)?),
      Type::Record(key) | Type::Variant(key) => self.fields_ref(*key)?,
      other => scalar_type(other)?.to_string(),
    })
  }

  /// Expression producing the zero value in wire form.
  pub fn default_wire(&self, ty: &Type) -> BuildResult<String> {
    Ok(match ty {
      Type::Bool => "false".to_string(),
      Type::Str => "\"\"".to_string(),
      Type::Int32 => "0".to_string(),
      Type::Any | Type::Nullable(_) => "null".to_string(),
      Type::Raw => "\"{}\"".to_string(),
      Type::Empty | Type::Dict(_) => "{}".to_string(),
      Type::Array(_) => "[]".to_string(),
      Type::Id(_) => format!("\"{}\"", ZERO_ID),
      Type::Record(key) | Type::Variant(key) => format!("new {}()._f", self.type_ref(*key)?),
      Type::Named(name) => return Err(unresolved(name)),
    })
  }

  fn needs_deserialize(&self, ty: &Type) -> bool {
    let mut needed = false;
    ty.walk(&mut |t| {
      needed |= matches!(t, Type::Record(_) | Type::Variant(_)) || self.nominal(t).is_some()
    });
    needed
  }

  fn needs_serialize(ty: &Type) -> bool {
    let mut needed = false;
    ty.walk(&mut |t| needed |= matches!(t, Type::Record(_) | Type::Variant(_)));
    needed
  }

  /// Wire value `expr` to its class form. `depth` numbers lambda variables.
  pub fn deserialize(&self, ty: &Type, expr: &str, depth: usize) -> BuildResult<String> {
    if !self.needs_deserialize(ty) {
      return Ok(expr.to_string());
    }
    Ok(match ty {
      Type::Record(key) | Type::Variant(key) => format!("new {}({})", self.type_ref(*key)?, expr),
      Type::Id(_) => format!("({} as {})", expr, self.class_type(ty)?),
      Type::Nullable(inner) => format!(
        "({} === null ? null : {})",
        expr,
        self.deserialize(inner, expr, depth)?
      ),
      Type::Array(inner) => {
        let v = format!("v{}", depth);
        format!("{}.map(({}) => {})", expr, v, self.deserialize(inner, &v, depth + 1)?)
      }
      Type::Dict(inner) => {
        let (k, v) = (format!("k{}", depth), format!("v{}", depth));
        format!(
          "Object.fromEntries(Object.entries({}).map(([{}, {}]) => [{}, {}]))",
          expr,
          k,
          v,
          k,
          self.deserialize(inner, &v, depth + 1)?
        )
      }
      _ => expr.to_string(),
    })
  }

  /// Class value `expr` to its wire form.
  pub fn serialize(&self, ty: &Type, expr: &str, depth: usize) -> BuildResult<String> {
    if !Self::needs_serialize(ty) {
      return Ok(expr.to_string());
    }
    Ok(match ty {
      Type::Record(_) | Type::Variant(_) => format!("{}._f", expr),
      Type::Nullable(inner) => format!(
        "({} === null ? null : {})",
        expr,
        self.serialize(inner, expr, depth)?
      ),
      Type::Array(inner) => {
        let v = format!("v{}", depth);
        format!("{}.map(({}) => {})", expr, v, self.serialize(inner, &v, depth + 1)?)
      }
      Type::Dict(inner) => {
        let (k, v) = (format!("k{}", depth), format!("v{}", depth));
        format!(
          "Object.fromEntries(Object.entries({}).map(([{}, {}]) => [{}, {}]))",
          expr,
          k,
          v,
          k,
          self.serialize(inner, &v, depth + 1)?
        )
      }
      _ => expr.to_string(),
    })
  }
}

fn scalar_type(ty: &Type) -> BuildResult<&'static str> {
  match ty {
    Type::Bool => Ok("boolean"),
    Type::Str | Type::Raw => Ok("string"),
    Type::Int32 => Ok("number"),
    Type::Any => Ok("any"),
    Type::Empty => Ok(EMPTY_TYPE),
    Type::Named(name) => Err(unresolved(name)),
    other => Err(BuildError::Internal(format!("'{}' is not a scalar", other))),
  }
}

fn unresolved(name: &str) -> BuildError {
  BuildError::Internal(format!("named reference '{}' survived resolution", name))
}

/// Namespaces whose definitions `ty` mentions.
pub fn referenced_namespaces(ty: &Type, out: &mut BTreeSet<u16>) {
  ty.walk(&mut |t| {
    if let Type::Record(key) | Type::Variant(key) = t {
      out.insert(key.namespace);
    }
  });
}

/// `import * as` lines of one file, in insertion order.
#[derive(Debug, Default)]
pub struct Imports {
  modules: IndexMap<String, String>,
}

impl Imports {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, alias: impl Into<String>, specifier: impl Into<String>) -> &mut Self {
    self.modules.entry(alias.into()).or_insert_with(|| specifier.into());
    self
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }

  pub fn emit(&self, e: &mut Emitter) {
    for (alias, specifier) in &self.modules {
      e.line(format!("import * as {} from \"{}\"", alias, specifier));
    }
    if !self.is_empty() {
      e.blank();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::index::index;
  use glue_types::prelude;

  fn resolved() -> ResolvedSchema {
    let schema = prelude::standard()
      .unwrap()
      .namespace(100, "people", glue_types::Layer::Core, |ns| {
        ns.record(0, "user", |r| {
          r.field(0, "id", Type::id_of("user"))?
            .field(1, "friends", Type::array(Type::named("user")))?
            .field(2, "manager", Type::nullable(Type::named("user"))?)?
            .field(3, "tags", Type::dict(Type::Str))?
            .field(4, "level", Type::named("core/logLevel"))
        })
      })
      .unwrap()
      .build();
    index(&schema).unwrap()
  }

  fn field_type(resolved: &ResolvedSchema, id: u16) -> Type {
    resolved
      .schema()
      .record(TypeKey::new(100, 0))
      .unwrap()
      .fields[&id]
      .ty
      .clone()
  }

  #[test]
  fn test_class_and_wire_types() {
    let resolved = resolved();
    let local = Scope::new(&resolved, 100, true);
    let remote = Scope::new(&resolved, 30001, false);

    assert_eq!(local.class_type(&field_type(&resolved, 0)).unwrap(), "UserId");
    assert_eq!(remote.class_type(&field_type(&resolved, 0)).unwrap(), "_ns_100.UserId");
    assert_eq!(local.class_type(&field_type(&resolved, 1)).unwrap(), "Array<User>");
    assert_eq!(local.wire_type(&field_type(&resolved, 1)).unwrap(), "Array<_fields_User>");
    assert_eq!(local.class_type(&field_type(&resolved, 2)).unwrap(), "User | null");
    assert_eq!(local.class_type(&field_type(&resolved, 4)).unwrap(), "_ns_64.LogLevel");
    assert_eq!(local.default_wire(&field_type(&resolved, 0)).unwrap(), format!("\"{}\"", ZERO_ID));
    assert_eq!(local.default_wire(&field_type(&resolved, 4)).unwrap(), "new _ns_64.LogLevel()._f");
    assert_eq!(local.default_wire(&Type::Raw).unwrap(), "\"{}\"");
  }

  #[test]
  fn test_conversions_recurse_through_wrappers() {
    let resolved = resolved();
    let scope = Scope::new(&resolved, 100, true);

    assert_eq!(
      scope.deserialize(&field_type(&resolved, 1), "this._f[1]", 0).unwrap(),
      "this._f[1].map((v0) => new User(v0))"
    );
    assert_eq!(
      scope.serialize(&field_type(&resolved, 2), "v", 0).unwrap(),
      "(v === null ? null : v._f)"
    );
    assert_eq!(
      scope.deserialize(&field_type(&resolved, 0), "this._f[0]", 0).unwrap(),
      "(this._f[0] as UserId)"
    );
    /* Plain values pass through unchanged */
    assert_eq!(scope.serialize(&field_type(&resolved, 3), "v", 0).unwrap(), "v");

    let nested = Type::dict(Type::array(Type::Record(TypeKey::new(100, 0))));
    assert_eq!(
      scope.deserialize(&nested, "x", 0).unwrap(),
      "Object.fromEntries(Object.entries(x).map(([k0, v0]) => [k0, v0.map((v1) => new User(v1))]))"
    );
  }

  #[test]
  fn test_imports_keep_insertion_order() {
    let mut imports = Imports::new();
    imports.add("_rt", "@dev/core").add("_ns_64", "@dev/core").add("_rt", "ignored");
    let mut e = Emitter::new("x.ts");
    imports.emit(&mut e);
    assert_eq!(
      e.contents(),
      "import * as _rt from \"@dev/core\"\nimport * as _ns_64 from \"@dev/core\"\n\n"
    );
  }
}

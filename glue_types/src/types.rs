use crate::error::{SchemaError, SchemaResult};
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// Stable address of a type definition: the owning namespace id and the type id
/// local to that namespace.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub struct TypeKey {
    pub namespace: u16,
    pub type_id: u16,
}

impl TypeKey {
    pub fn new(namespace: u16, type_id: u16) -> Self {
        Self { namespace, type_id }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.namespace, self.type_id)
    }
}

/// The closed type algebra.
///
/// `Named` only exists before indexing. The indexer replaces every named
/// reference with a `Record` or `Variant` node addressing the definition by
/// its [`TypeKey`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Type {
    Bool,
    Str,
    Int32,
    Any,
    Raw,
    Empty,
    /// Opaque identifier, optionally narrowed to identifiers of one record
    Id(Option<Box<Type>>),
    Nullable(Box<Type>),
    Array(Box<Type>),
    Dict(Box<Type>),
    Named(String),
    Record(TypeKey),
    Variant(TypeKey),
}

impl Type {
    pub fn id() -> Type {
        Type::Id(None)
    }

    /* Identifier narrowed to the record called `record` */
    pub fn id_of(record: &str) -> Type {
        Type::Id(Some(Box::new(Type::Named(record.to_string()))))
    }

    /// Wrap `inner` as nullable. Fails when `inner` is already nullable.
    pub fn nullable(inner: Type) -> SchemaResult<Type> {
        if let Type::Nullable(_) = inner {
            return Err(SchemaError::DoubleNullable {
                inner: inner.to_string(),
            });
        }
        Ok(Type::Nullable(Box::new(inner)))
    }

    pub fn array(inner: Type) -> Type {
        Type::Array(Box::new(inner))
    }

    pub fn dict(inner: Type) -> Type {
        Type::Dict(Box::new(inner))
    }

    pub fn named(name: &str) -> Type {
        Type::Named(name.to_string())
    }

    /* Contained type of a wrapper node */
    pub fn contained(&self) -> Option<&Type> {
        match self {
            Type::Nullable(inner) | Type::Array(inner) | Type::Dict(inner) => Some(inner),
            Type::Id(Some(inner)) => Some(inner),
            _ => None,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    /// True when no named reference remains anywhere in the tree.
    pub fn is_resolved(&self) -> bool {
        match self {
            Type::Named(_) => false,
            other => other.contained().map_or(true, Type::is_resolved),
        }
    }

    /// Calls `f` on this node and every node below it, parents first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Type)) {
        f(self);
        if let Some(inner) = self.contained() {
            inner.walk(f);
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => f.write_str("bool"),
            Type::Str => f.write_str("str"),
            Type::Int32 => f.write_str("int32"),
            Type::Any => f.write_str("any"),
            Type::Raw => f.write_str("raw"),
            Type::Empty => f.write_str("empty"),
            Type::Id(None) => f.write_str("id"),
            Type::Id(Some(of)) => write!(f, "id<{}>", of),
            Type::Nullable(inner) => write!(f, "nullable<{}>", inner),
            Type::Array(inner) => write!(f, "array<{}>", inner),
            Type::Dict(inner) => write!(f, "dict<{}>", inner),
            Type::Named(name) => f.write_str(name),
            Type::Record(key) => write!(f, "record{}", key),
            Type::Variant(key) => write!(f, "variant{}", key),
        }
    }
}

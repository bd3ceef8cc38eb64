use crate::layer::Layer;
use crate::types::{Type, TypeKey};
use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/* Namespace name reserved for generated index files */
pub const RESERVED_NAMESPACE_NAME: &str = "index";

/* Largest type id a namespace may assign */
pub const MAX_TYPE_ID: u32 = 65355;

/* Separator between namespace and definition in a qualified name */
pub const NAMESPACE_SEPARATOR: char = '/';

pub fn qualified_name(namespace: &str, name: &str) -> String {
    format!("{}{}{}", namespace, NAMESPACE_SEPARATOR, name)
}

/// A complete schema document: every namespace keyed by its id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Schema {
    pub namespaces: BTreeMap<u16, Namespace>,
}

impl Schema {
    pub fn namespace(&self, id: u16) -> Option<&Namespace> {
        self.namespaces.get(&id)
    }

    pub fn namespace_by_name(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.values().find(|ns| ns.name == name)
    }

    pub fn type_def(&self, key: TypeKey) -> Option<&TypeDef> {
        self.namespaces.get(&key.namespace)?.types.get(&key.type_id)
    }

    pub fn record(&self, key: TypeKey) -> Option<&Record> {
        match self.type_def(key)? {
            TypeDef::Record(record) => Some(record),
            TypeDef::Variant(_) => None,
        }
    }

    pub fn variant(&self, key: TypeKey) -> Option<&Variant> {
        match self.type_def(key)? {
            TypeDef::Variant(variant) => Some(variant),
            TypeDef::Record(_) => None,
        }
    }

    /* Namespaces of one layer in ascending id order */
    pub fn in_layer(&self, layer: Layer) -> impl Iterator<Item = &Namespace> {
        self.namespaces.values().filter(move |ns| ns.layer == layer)
    }

    /* "<namespace>/<name>" of the definition at `key` */
    pub fn qualified_type_name(&self, key: TypeKey) -> Option<String> {
        let ns = self.namespaces.get(&key.namespace)?;
        let def = ns.types.get(&key.type_id)?;
        Some(qualified_name(&ns.name, def.name()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Namespace {
    pub id: u16,
    pub name: String,
    pub layer: Layer,
    pub types: BTreeMap<u16, TypeDef>,
    pub services: BTreeMap<u16, Service>,
    pub service_groups: BTreeMap<u16, ServiceGroup>,
    /// Explicit extra dependencies, by namespace name
    pub depends_on: BTreeSet<String>,
}

impl Namespace {
    pub fn new(id: u16, name: &str, layer: Layer) -> Self {
        Self {
            id,
            name: name.to_string(),
            layer,
            types: BTreeMap::new(),
            services: BTreeMap::new(),
            service_groups: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    /// True when any owned record carries DB metadata.
    pub fn db(&self) -> bool {
        self.types
            .values()
            .any(|def| matches!(def, TypeDef::Record(r) if r.db.is_some()))
    }

    pub fn type_by_name(&self, name: &str) -> Option<&TypeDef> {
        self.types.values().find(|def| def.name() == name)
    }

    pub fn service_by_name(&self, name: &str) -> Option<&Service> {
        self.services.values().find(|svc| svc.name == name)
    }

    /* Root namespaces carry the lower-case name of their layer */
    pub fn is_layer_root(&self) -> bool {
        self.name == self.layer.name()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TypeDef {
    Record(Record),
    Variant(Variant),
}

impl TypeDef {
    pub fn id(&self) -> u16 {
        match self {
            TypeDef::Record(r) => r.id,
            TypeDef::Variant(v) => v.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TypeDef::Record(r) => &r.name,
            TypeDef::Variant(v) => &v.name,
        }
    }
}

/// Product type with positional, possibly sparse, field ids.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Record {
    pub id: u16,
    pub name: String,
    pub fields: BTreeMap<u16, Field>,
    /// Named construction profiles; profile 0 is implicit and never stored
    pub profiles: BTreeMap<u16, Profile>,
    pub db: Option<DbMeta>,
    pub description: Option<String>,
}

impl Record {
    pub fn new(id: u16, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            fields: BTreeMap::new(),
            profiles: BTreeMap::new(),
            db: None,
            description: None,
        }
    }

    /// Length of the positional wire sequence: highest field id plus one.
    pub fn wire_len(&self) -> usize {
        self.fields
            .keys()
            .next_back()
            .map_or(0, |max| usize::from(*max) + 1)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.values().find(|f| f.name == name)
    }
}

/// Exact field subset required by a non-zero construction profile.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Profile {
    pub id: u16,
    pub fields: BTreeSet<u16>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct DbMeta {
    pub primary: Option<u16>,
    pub shard: Option<u16>,
    pub indexes: Vec<Vec<u16>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct FieldMeta {
    pub deprecated: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Field {
    pub id: u16,
    pub name: String,
    pub ty: Type,
    pub meta: FieldMeta,
    pub description: Option<String>,
}

impl Field {
    pub fn new(id: u16, name: &str, ty: Type) -> Self {
        Self {
            id,
            name: name.to_string(),
            ty,
            meta: FieldMeta::default(),
            description: None,
        }
    }

    pub fn deprecated(mut self) -> Self {
        self.meta.deprecated = true;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Discriminated sum type keyed by ordinal.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Variant {
    pub id: u16,
    pub name: String,
    pub values: BTreeMap<u16, EnumValue>,
    pub description: Option<String>,
}

impl Variant {
    pub fn new(id: u16, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            values: BTreeMap::new(),
            description: None,
        }
    }

    /* Case used for zero-valued instances */
    pub fn default_value(&self) -> Option<&EnumValue> {
        self.values.values().next()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct EnumValue {
    pub ordinal: u16,
    pub name: String,
    pub payload: Option<Type>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Service {
    pub id: u16,
    pub name: String,
    pub config: Type,
    pub methods: BTreeMap<u16, Method>,
    /// Other services this one calls, by qualified name
    pub requires: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Method {
    pub id: u16,
    pub name: String,
    pub params: Type,
    pub returns: Type,
}

/// Deployable bundle of services. Only declared in the `deploy` layer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceGroup {
    pub id: u16,
    pub name: String,
    pub services: Vec<String>,
}

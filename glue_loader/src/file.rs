use glue_types::{Layer, Type};
use serde_derive::Deserialize;

/* ============================================================================
   Type Syntax
   ============================================================================ */

/* Raw type expression as written in a document: a scalar kind as a plain
   string, or a wrapper as a single-key map */
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum TypeExpr {
    Kind(String),
    Wrapper(Wrapper),
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
enum Wrapper {
    Nullable(Box<TypeExpr>),
    Array(Box<TypeExpr>),
    Dict(Box<TypeExpr>),
    /* Identifier narrowed to a record */
    IdOf(String),
    /* Reference to a record or variant, local or "namespace/name" */
    Ref(String),
}

/// A type as written in a schema document, already lowered to [`Type`].
///
/// `bool`, `str`, `int32`, `any`, `raw`, `empty` and `id` are written as
/// plain strings; `{nullable: T}`, `{array: T}`, `{dict: T}`,
/// `{id-of: record}` and `{ref: name}` wrap or reference other types.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "TypeExpr")]
pub struct TypeSpec(pub Type);

impl Default for TypeSpec {
    fn default() -> Self {
        TypeSpec(Type::Empty)
    }
}

impl TryFrom<TypeExpr> for TypeSpec {
    type Error = String;

    fn try_from(expr: TypeExpr) -> Result<Self, Self::Error> {
        lower(expr).map(TypeSpec)
    }
}

fn lower(expr: TypeExpr) -> Result<Type, String> {
    match expr {
        TypeExpr::Kind(kind) => match kind.as_str() {
            "bool" => Ok(Type::Bool),
            "str" => Ok(Type::Str),
            "int32" => Ok(Type::Int32),
            "any" => Ok(Type::Any),
            "raw" => Ok(Type::Raw),
            "empty" => Ok(Type::Empty),
            "id" => Ok(Type::id()),
            other => Err(format!(
                "unknown type kind '{}' (references are written as {{ref: {}}})",
                other, other
            )),
        },
        TypeExpr::Wrapper(Wrapper::Nullable(inner)) => {
            Type::nullable(lower(*inner)?).map_err(|e| e.to_string())
        }
        TypeExpr::Wrapper(Wrapper::Array(inner)) => Ok(Type::array(lower(*inner)?)),
        TypeExpr::Wrapper(Wrapper::Dict(inner)) => Ok(Type::dict(lower(*inner)?)),
        TypeExpr::Wrapper(Wrapper::IdOf(record)) => Ok(Type::id_of(&record)),
        TypeExpr::Wrapper(Wrapper::Ref(name)) => Ok(Type::named(&name)),
    }
}

/* ============================================================================
   Declarations
   ============================================================================ */

/* One field of a record */
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FieldDecl {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeSpec,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/* Construction profile requiring exactly `fields` */
#[derive(Deserialize, Debug, Clone)]
pub struct ProfileDecl {
    pub id: u32,
    pub fields: Vec<u32>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct DbDecl {
    #[serde(default)]
    pub primary: Option<u32>,
    #[serde(default)]
    pub shard: Option<u32>,
    /* Each index is a tuple of field ids */
    #[serde(default)]
    pub indexes: Vec<Vec<u32>>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct RecordDecl {
    /* Record name; the key also tells records and variants apart */
    pub record: String,
    pub id: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub profiles: Vec<ProfileDecl>,
    #[serde(default)]
    pub db: Option<DbDecl>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ValueDecl {
    pub ordinal: u32,
    pub name: String,
    #[serde(default)]
    pub payload: Option<TypeSpec>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct VariantDecl {
    pub variant: String,
    pub id: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub values: Vec<ValueDecl>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum TypeDecl {
    Record(RecordDecl),
    Variant(VariantDecl),
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct MethodDecl {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub params: TypeSpec,
    #[serde(default)]
    pub returns: TypeSpec,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceDecl {
    pub id: u32,
    pub name: String,
    /* Constructor argument of the generated server */
    #[serde(default)]
    pub config: TypeSpec,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    /* Qualified names of services this one calls */
    #[serde(default)]
    pub requires: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceGroupDecl {
    pub id: u32,
    pub name: String,
    pub services: Vec<String>,
}

/// A namespace declaration. `id` and `layer` are required the first time a
/// namespace is declared and may be left out when a later declaration adds
/// to it.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct NamespaceDecl {
    #[serde(default)]
    pub id: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub layer: Option<Layer>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub types: Vec<TypeDecl>,
    #[serde(default)]
    pub services: Vec<ServiceDecl>,
    #[serde(default)]
    pub service_groups: Vec<ServiceGroupDecl>,
}

/* ============================================================================
   Schema Document
   ============================================================================ */

/// One schema document.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct SchemaFile {
    /* Seed the standard root namespaces */
    #[serde(default)]
    pub include_prelude: bool,
    #[serde(default)]
    pub namespaces: Vec<NamespaceDecl>,
}

impl SchemaFile {
    pub fn parse(text: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_type(yaml: &str) -> Result<Type, serde_yml::Error> {
        serde_yml::from_str::<TypeSpec>(yaml).map(|parsed| parsed.0)
    }

    #[test]
    fn test_scalar_kinds() {
        assert_eq!(parse_type("bool").unwrap(), Type::Bool);
        assert_eq!(parse_type("int32").unwrap(), Type::Int32);
        assert_eq!(parse_type("id").unwrap(), Type::Id(None));
        assert_eq!(parse_type("empty").unwrap(), Type::Empty);
    }

    #[test]
    fn test_wrappers_nest() {
        assert_eq!(
            parse_type("{array: {nullable: str}}").unwrap(),
            Type::array(Type::Nullable(Box::new(Type::Str)))
        );
        assert_eq!(
            parse_type("{dict: {ref: core/logLevel}}").unwrap(),
            Type::dict(Type::named("core/logLevel"))
        );
        assert_eq!(parse_type("{id-of: account}").unwrap(), Type::id_of("account"));
    }

    #[test]
    fn test_rejects_bad_types() {
        let unknown = parse_type("account").unwrap_err().to_string();
        assert!(unknown.contains("unknown type kind 'account'"), "{}", unknown);

        let double = parse_type("{nullable: {nullable: bool}}").unwrap_err().to_string();
        assert!(double.contains("nullable cannot wrap another nullable"), "{}", double);
    }

    #[test]
    fn test_document_shape() {
        let file = SchemaFile::parse(
            r#"
include-prelude: true
namespaces:
  - id: 30001
    name: host
    layer: svc
    depends-on: [store]
    types:
      - record: config
        id: 0
        fields:
          - { id: 0, name: port, type: int32, deprecated: true }
        profiles:
          - { id: 1, fields: [0] }
      - variant: mode
        id: 1
        values:
          - { ordinal: 0, name: idle }
          - { ordinal: 1, name: busy, payload: str }
    services:
      - id: 0
        name: api
        config: { ref: config }
        methods:
          - { id: 0, name: ping }
"#,
        )
        .unwrap();

        assert!(file.include_prelude);
        let ns = &file.namespaces[0];
        assert_eq!(ns.layer, Some(Layer::Svc));
        assert_eq!(ns.depends_on, vec!["store".to_string()]);
        match &ns.types[0] {
            TypeDecl::Record(record) => {
                assert_eq!(record.record, "config");
                assert!(record.fields[0].deprecated);
                assert_eq!(record.profiles[0].fields, vec![0]);
            }
            other => panic!("expected a record, got {:?}", other),
        }
        match &ns.types[1] {
            TypeDecl::Variant(variant) => {
                assert_eq!(variant.values[1].payload, Some(TypeSpec(Type::Str)));
            }
            other => panic!("expected a variant, got {:?}", other),
        }
        let method = &ns.services[0].methods[0];
        assert_eq!(method.params, TypeSpec(Type::Empty));
        assert_eq!(ns.services[0].config, TypeSpec(Type::named("config")));
    }
}

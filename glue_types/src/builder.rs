//! Typed schema builder.
//!
//! Each level of the schema has its own builder context, handed to a closure
//! and returned from it, so a field can only be added while a record is open
//! and a method only while a service is open. Local invariants (id ranges,
//! reserved names, layer capabilities, duplicates) are checked by the call
//! that introduces them.
//!
//! ```
//! use glue_types::{Layer, SchemaBuilder, Type};
//!
//! let schema = SchemaBuilder::new()
//!     .namespace(64, "core", Layer::Core, |ns| {
//!         ns.variant(0, "logLevel", |v| v.value(0, "info")?.value(1, "warn"))?
//!             .record(1, "log", |r| {
//!                 r.field(0, "level", Type::named("logLevel"))?
//!                     .field(1, "message", Type::Str)
//!             })
//!     })
//!     .unwrap()
//!     .build();
//! assert_eq!(schema.namespaces.len(), 1);
//! ```

use crate::error::{SchemaError, SchemaResult};
use crate::layer::Layer;
use crate::schema::*;
use crate::types::Type;
use std::collections::BTreeSet;

fn check_u16(kind: &'static str, id: u32, scope: &str) -> SchemaResult<u16> {
    u16::try_from(id).map_err(|_| SchemaError::IdOutOfRange {
        kind,
        id,
        max: u32::from(u16::MAX),
        scope: scope.to_string(),
    })
}

/* Names end up as identifiers in generated code and as path segments */
fn check_name(kind: &'static str, name: &str) -> SchemaResult<()> {
    let invalid = |reason| SchemaError::InvalidName {
        kind,
        name: name.to_string(),
        reason,
    };
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("name is empty")),
        Some(c) if !c.is_ascii_alphabetic() => {
            return Err(invalid("must start with an ASCII letter"));
        }
        _ => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("only ASCII letters, digits and '_' are allowed"));
    }
    Ok(())
}

/// Root builder. Accumulates namespaces into a [`Schema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a namespace and fill it through `body`.
    pub fn namespace<F>(mut self, id: u32, name: &str, layer: Layer, body: F) -> SchemaResult<Self>
    where
        F: FnOnce(NamespaceBuilder) -> SchemaResult<NamespaceBuilder>,
    {
        let id = check_u16("namespace", id, name)?;
        if name == RESERVED_NAMESPACE_NAME {
            return Err(SchemaError::ReservedName {
                name: name.to_string(),
            });
        }
        check_name("namespace", name)?;
        if self.schema.namespaces.contains_key(&id) {
            return Err(SchemaError::DuplicateId {
                kind: "namespace",
                id: u32::from(id),
                scope: "schema".to_string(),
            });
        }
        if self.schema.namespace_by_name(name).is_some() {
            return Err(SchemaError::DuplicateName {
                kind: "namespace",
                name: name.to_string(),
                scope: "schema".to_string(),
            });
        }

        let ns = body(NamespaceBuilder {
            ns: Namespace::new(id, name, layer),
        })?
        .ns;
        self.schema.namespaces.insert(id, ns);
        Ok(self)
    }

    /// Add more declarations to a namespace that was already declared.
    pub fn reopen<F>(mut self, name: &str, body: F) -> SchemaResult<Self>
    where
        F: FnOnce(NamespaceBuilder) -> SchemaResult<NamespaceBuilder>,
    {
        let id = self
            .schema
            .namespace_by_name(name)
            .map(|ns| ns.id)
            .ok_or_else(|| SchemaError::UnknownNamespace {
                name: name.to_string(),
            })?;
        if let Some(ns) = self.schema.namespaces.remove(&id) {
            let ns = body(NamespaceBuilder { ns })?.ns;
            self.schema.namespaces.insert(id, ns);
        }
        Ok(self)
    }

    /// Namespace declared so far under `name`.
    pub fn declared(&self, name: &str) -> Option<&Namespace> {
        self.schema.namespace_by_name(name)
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

/// Context for one open namespace.
#[derive(Debug)]
pub struct NamespaceBuilder {
    ns: Namespace,
}

impl NamespaceBuilder {
    pub fn layer(&self) -> Layer {
        self.ns.layer
    }

    pub fn name(&self) -> &str {
        &self.ns.name
    }

    fn check_type_slot(&self, id: u32, name: &str) -> SchemaResult<u16> {
        if id > MAX_TYPE_ID {
            return Err(SchemaError::IdOutOfRange {
                kind: "type",
                id,
                max: MAX_TYPE_ID,
                scope: self.ns.name.clone(),
            });
        }
        let id = check_u16("type", id, &self.ns.name)?;
        check_name("type", name)?;
        if self.ns.types.contains_key(&id) {
            return Err(SchemaError::DuplicateId {
                kind: "type",
                id: u32::from(id),
                scope: self.ns.name.clone(),
            });
        }
        if self.ns.type_by_name(name).is_some() {
            return Err(SchemaError::DuplicateName {
                kind: "type",
                name: name.to_string(),
                scope: self.ns.name.clone(),
            });
        }
        Ok(id)
    }

    /// Declare a record ("struct") and fill it through `body`.
    pub fn record<F>(mut self, id: u32, name: &str, body: F) -> SchemaResult<Self>
    where
        F: FnOnce(RecordBuilder) -> SchemaResult<RecordBuilder>,
    {
        let id = self.check_type_slot(id, name)?;
        let scope = qualified_name(&self.ns.name, name);
        let record = body(RecordBuilder {
            record: Record::new(id, name),
            scope,
        })?
        .finish()?;
        self.ns.types.insert(id, TypeDef::Record(record));
        Ok(self)
    }

    /// Declare a variant ("enum") and fill it through `body`.
    pub fn variant<F>(mut self, id: u32, name: &str, body: F) -> SchemaResult<Self>
    where
        F: FnOnce(VariantBuilder) -> SchemaResult<VariantBuilder>,
    {
        let id = self.check_type_slot(id, name)?;
        let scope = qualified_name(&self.ns.name, name);
        let variant = body(VariantBuilder {
            variant: Variant::new(id, name),
            scope,
        })?
        .variant;
        self.ns.types.insert(id, TypeDef::Variant(variant));
        Ok(self)
    }

    /// Declare a service. Only namespaces in layer `svc` or above may own services.
    pub fn service<F>(mut self, id: u32, name: &str, config: Type, body: F) -> SchemaResult<Self>
    where
        F: FnOnce(ServiceBuilder) -> SchemaResult<ServiceBuilder>,
    {
        if !self.ns.layer.allows_services() {
            return Err(SchemaError::ServicesNotAllowed {
                namespace: self.ns.name.clone(),
                layer: self.ns.layer,
            });
        }
        let id = check_u16("service", id, &self.ns.name)?;
        check_name("service", name)?;
        if self.ns.services.contains_key(&id) {
            return Err(SchemaError::DuplicateId {
                kind: "service",
                id: u32::from(id),
                scope: self.ns.name.clone(),
            });
        }
        if self.ns.service_by_name(name).is_some() {
            return Err(SchemaError::DuplicateName {
                kind: "service",
                name: name.to_string(),
                scope: self.ns.name.clone(),
            });
        }

        let scope = qualified_name(&self.ns.name, name);
        let service = body(ServiceBuilder {
            service: Service {
                id,
                name: name.to_string(),
                config,
                methods: Default::default(),
                requires: Vec::new(),
            },
            scope,
        })?
        .service;
        self.ns.services.insert(id, service);
        Ok(self)
    }

    /// Declare a deployable group of services, referenced by qualified name.
    /// Only the `deploy` layer may own service groups.
    pub fn service_group(mut self, id: u32, name: &str, services: &[&str]) -> SchemaResult<Self> {
        if !self.ns.layer.allows_service_groups() {
            return Err(SchemaError::ServiceGroupsNotAllowed {
                namespace: self.ns.name.clone(),
                layer: self.ns.layer,
            });
        }
        let id = check_u16("service group", id, &self.ns.name)?;
        check_name("service group", name)?;
        if self.ns.service_groups.contains_key(&id) {
            return Err(SchemaError::DuplicateId {
                kind: "service group",
                id: u32::from(id),
                scope: self.ns.name.clone(),
            });
        }
        if self.ns.service_groups.values().any(|g| g.name == name) {
            return Err(SchemaError::DuplicateName {
                kind: "service group",
                name: name.to_string(),
                scope: self.ns.name.clone(),
            });
        }
        self.ns.service_groups.insert(
            id,
            ServiceGroup {
                id,
                name: name.to_string(),
                services: services.iter().map(|s| s.to_string()).collect(),
            },
        );
        Ok(self)
    }

    /// Explicit dependency on another namespace, by name.
    pub fn depends_on(mut self, namespace: &str) -> Self {
        self.ns.depends_on.insert(namespace.to_string());
        self
    }
}

/// Context for one open record.
#[derive(Debug)]
pub struct RecordBuilder {
    record: Record,
    scope: String,
}

impl RecordBuilder {
    pub fn field(self, id: u32, name: &str, ty: Type) -> SchemaResult<Self> {
        let id = check_u16("field", id, &self.scope)?;
        self.push_field(Field::new(id, name, ty))
    }

    /// Like [`RecordBuilder::field`], finishing the field through `body`,
    /// e.g. `|f| f.deprecated()`.
    pub fn field_with<F>(self, id: u32, name: &str, ty: Type, body: F) -> SchemaResult<Self>
    where
        F: FnOnce(Field) -> Field,
    {
        let id = check_u16("field", id, &self.scope)?;
        self.push_field(body(Field::new(id, name, ty)))
    }

    /// Add a fully described field, e.g. `Field::new(..).deprecated()`.
    pub fn push_field(mut self, field: Field) -> SchemaResult<Self> {
        check_name("field", &field.name)?;
        if self.record.fields.contains_key(&field.id) {
            return Err(SchemaError::DuplicateId {
                kind: "field",
                id: u32::from(field.id),
                scope: self.scope,
            });
        }
        if self.record.field_by_name(&field.name).is_some() {
            return Err(SchemaError::DuplicateName {
                kind: "field",
                name: field.name,
                scope: self.scope,
            });
        }
        self.record.fields.insert(field.id, field);
        Ok(self)
    }

    /// Declare construction profile `id` requiring exactly `fields`.
    pub fn profile(mut self, id: u32, fields: &[u32]) -> SchemaResult<Self> {
        if id == 0 {
            return Err(SchemaError::ReservedProfile {
                record: self.scope,
            });
        }
        let id = check_u16("profile", id, &self.scope)?;
        if self.record.profiles.contains_key(&id) {
            return Err(SchemaError::DuplicateId {
                kind: "profile",
                id: u32::from(id),
                scope: self.scope,
            });
        }
        let mut required = BTreeSet::new();
        for field in fields {
            required.insert(check_u16("field", *field, &self.scope)?);
        }
        self.record.profiles.insert(id, Profile { id, fields: required });
        Ok(self)
    }

    /// Attach DB metadata; presence of keys is checked at indexing time.
    pub fn db<F>(mut self, body: F) -> SchemaResult<Self>
    where
        F: FnOnce(DbBuilder) -> SchemaResult<DbBuilder>,
    {
        let db = body(DbBuilder {
            db: DbMeta::default(),
            scope: self.scope.clone(),
        })?
        .db;
        self.record.db = Some(db);
        Ok(self)
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.record.description = Some(description.to_string());
        self
    }

    /* Profiles may be declared before the fields they name */
    fn finish(self) -> SchemaResult<Record> {
        for profile in self.record.profiles.values() {
            if let Some(field) = profile
                .fields
                .iter()
                .find(|f| !self.record.fields.contains_key(*f))
            {
                return Err(SchemaError::UnknownProfileField {
                    record: self.scope,
                    profile: profile.id,
                    field: *field,
                });
            }
        }
        Ok(self.record)
    }
}

/// Context for a record's DB metadata.
#[derive(Debug)]
pub struct DbBuilder {
    db: DbMeta,
    scope: String,
}

impl DbBuilder {
    pub fn primary(mut self, field: u32) -> SchemaResult<Self> {
        self.db.primary = Some(check_u16("field", field, &self.scope)?);
        Ok(self)
    }

    pub fn shard(mut self, field: u32) -> SchemaResult<Self> {
        self.db.shard = Some(check_u16("field", field, &self.scope)?);
        Ok(self)
    }

    pub fn index(mut self, fields: &[u32]) -> SchemaResult<Self> {
        let mut tuple = Vec::with_capacity(fields.len());
        for field in fields {
            tuple.push(check_u16("field", *field, &self.scope)?);
        }
        self.db.indexes.push(tuple);
        Ok(self)
    }
}

/// Context for one open variant.
#[derive(Debug)]
pub struct VariantBuilder {
    variant: Variant,
    scope: String,
}

impl VariantBuilder {
    pub fn value(self, ordinal: u32, name: &str) -> SchemaResult<Self> {
        self.push_value(ordinal, name, None)
    }

    pub fn value_with(self, ordinal: u32, name: &str, payload: Type) -> SchemaResult<Self> {
        self.push_value(ordinal, name, Some(payload))
    }

    fn push_value(mut self, ordinal: u32, name: &str, payload: Option<Type>) -> SchemaResult<Self> {
        let ordinal = check_u16("enum value", ordinal, &self.scope)?;
        check_name("enum value", name)?;
        if self.variant.values.contains_key(&ordinal) {
            return Err(SchemaError::DuplicateId {
                kind: "enum value",
                id: u32::from(ordinal),
                scope: self.scope,
            });
        }
        if self.variant.values.values().any(|v| v.name == name) {
            return Err(SchemaError::DuplicateName {
                kind: "enum value",
                name: name.to_string(),
                scope: self.scope,
            });
        }
        self.variant.values.insert(
            ordinal,
            EnumValue {
                ordinal,
                name: name.to_string(),
                payload,
            },
        );
        Ok(self)
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.variant.description = Some(description.to_string());
        self
    }
}

/// Context for one open service.
#[derive(Debug)]
pub struct ServiceBuilder {
    service: Service,
    scope: String,
}

impl ServiceBuilder {
    pub fn method(mut self, id: u32, name: &str, params: Type, returns: Type) -> SchemaResult<Self> {
        let id = check_u16("method", id, &self.scope)?;
        check_name("method", name)?;
        if self.service.methods.contains_key(&id) {
            return Err(SchemaError::DuplicateId {
                kind: "method",
                id: u32::from(id),
                scope: self.scope,
            });
        }
        if self.service.methods.values().any(|m| m.name == name) {
            return Err(SchemaError::DuplicateName {
                kind: "method",
                name: name.to_string(),
                scope: self.scope,
            });
        }
        self.service.methods.insert(
            id,
            Method {
                id,
                name: name.to_string(),
                params,
                returns,
            },
        );
        Ok(self)
    }

    /// Another service this one calls, by qualified name ("ns/service").
    pub fn requires(mut self, service: &str) -> Self {
        self.service.requires.push(service.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKey;
    use assert_matches::assert_matches;

    fn core() -> SchemaResult<SchemaBuilder> {
        SchemaBuilder::new().namespace(64, "core", Layer::Core, |ns| {
            ns.variant(0, "logLevel", |v| v.value(0, "info")?.value(1, "warn"))
        })
    }

    #[test]
    fn test_builds_namespace_with_types() {
        let schema = core()
            .unwrap()
            .namespace(20000, "infra", Layer::Infra, |ns| {
                ns.record(0, "rpcRequest", |r| {
                    r.field(0, "reqId", Type::Str)?
                        .field(1, "level", Type::named("core/logLevel"))
                })
            })
            .unwrap()
            .build();

        let infra = schema.namespace_by_name("infra").unwrap();
        assert_eq!(infra.id, 20000);
        let record = schema.record(TypeKey::new(20000, 0)).unwrap();
        assert_eq!(record.fields[&1].ty, Type::Named("core/logLevel".to_string()));
        assert_eq!(record.wire_len(), 2);
        assert!(schema.variant(TypeKey::new(64, 0)).is_some());
    }

    #[test]
    fn test_namespace_id_must_fit_16_bits() {
        let err = SchemaBuilder::new()
            .namespace(70_000, "wide", Layer::Core, Ok)
            .unwrap_err();
        assert_matches!(err, SchemaError::IdOutOfRange { kind: "namespace", id: 70_000, .. });
    }

    #[test]
    fn test_reserved_namespace_name() {
        let err = SchemaBuilder::new()
            .namespace(1, "index", Layer::Core, Ok)
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::ReservedName {
                name: "index".to_string()
            }
        );
    }

    #[test]
    fn test_type_id_budget() {
        let ok = SchemaBuilder::new().namespace(1, "core", Layer::Core, |ns| {
            ns.record(65355, "last", Ok)
        });
        assert!(ok.is_ok());

        let err = SchemaBuilder::new()
            .namespace(1, "core", Layer::Core, |ns| ns.record(65356, "past", Ok))
            .unwrap_err();
        assert_matches!(err, SchemaError::IdOutOfRange { kind: "type", max: 65355, .. });
    }

    #[test]
    fn test_member_ids_must_fit_16_bits() {
        let field = SchemaBuilder::new().namespace(1, "core", Layer::Core, |ns| {
            ns.record(0, "r", |r| r.field(65_536, "f", Type::Str))
        });
        assert_matches!(field, Err(SchemaError::IdOutOfRange { kind: "field", .. }));

        let value = SchemaBuilder::new().namespace(1, "core", Layer::Core, |ns| {
            ns.variant(0, "v", |v| v.value(1 << 20, "big"))
        });
        assert_matches!(value, Err(SchemaError::IdOutOfRange { kind: "enum value", .. }));

        let method = SchemaBuilder::new().namespace(1, "svc", Layer::Svc, |ns| {
            ns.service(0, "s", Type::Empty, |s| s.method(99_999, "m", Type::Str, Type::Str))
        });
        assert_matches!(method, Err(SchemaError::IdOutOfRange { kind: "method", .. }));

        let group = SchemaBuilder::new().namespace(1, "deploy", Layer::Deploy, |ns| {
            ns.service_group(100_000, "g", &[])
        });
        assert_matches!(group, Err(SchemaError::IdOutOfRange { kind: "service group", .. }));
    }

    #[test]
    fn test_services_require_svc_layer() {
        let err = SchemaBuilder::new()
            .namespace(20000, "infra", Layer::Infra, |ns| {
                ns.service(0, "service", Type::Empty, Ok)
            })
            .unwrap_err();
        assert_matches!(err, SchemaError::ServicesNotAllowed { layer: Layer::Infra, .. });

        let ok = SchemaBuilder::new().namespace(30001, "host", Layer::Svc, |ns| {
            ns.service(0, "service", Type::Empty, |s| {
                s.method(0, "ping", Type::Empty, Type::Empty)
            })
        });
        assert!(ok.is_ok());
    }

    #[test]
    fn test_service_groups_only_in_deploy() {
        let err = SchemaBuilder::new()
            .namespace(50000, "app", Layer::App, |ns| ns.service_group(0, "all", &["svc/a"]))
            .unwrap_err();
        assert_matches!(err, SchemaError::ServiceGroupsNotAllowed { .. });
    }

    #[test]
    fn test_service_group_names_are_unique() {
        let err = SchemaBuilder::new()
            .namespace(60000, "deploy", Layer::Deploy, |ns| {
                ns.service_group(0, "edge", &["host/api"])?
                    .service_group(1, "edge", &["host/admin"])
            })
            .unwrap_err();
        assert_matches!(
            err,
            SchemaError::DuplicateName { kind: "service group", name, scope }
                if name == "edge" && scope == "deploy"
        );
    }

    #[test]
    fn test_profile_zero_is_reserved() {
        let err = SchemaBuilder::new()
            .namespace(1, "core", Layer::Core, |ns| {
                ns.record(0, "r", |r| r.field(0, "a", Type::Str)?.profile(0, &[0]))
            })
            .unwrap_err();
        assert_matches!(err, SchemaError::ReservedProfile { record } if record == "core/r");
    }

    #[test]
    fn test_profile_may_precede_fields_but_must_name_them() {
        let ok = SchemaBuilder::new().namespace(1, "core", Layer::Core, |ns| {
            ns.record(0, "r", |r| {
                r.profile(1, &[0, 2])?
                    .field(0, "a", Type::Str)?
                    .field(2, "b", Type::Int32)
            })
        });
        assert!(ok.is_ok());

        let err = SchemaBuilder::new()
            .namespace(1, "core", Layer::Core, |ns| {
                ns.record(0, "r", |r| r.profile(1, &[5])?.field(0, "a", Type::Str))
            })
            .unwrap_err();
        assert_matches!(err, SchemaError::UnknownProfileField { profile: 1, field: 5, .. });
    }

    #[test]
    fn test_duplicates_rejected() {
        let dup_field = SchemaBuilder::new().namespace(1, "core", Layer::Core, |ns| {
            ns.record(0, "r", |r| r.field(0, "a", Type::Str)?.field(0, "b", Type::Str))
        });
        assert_matches!(dup_field, Err(SchemaError::DuplicateId { kind: "field", .. }));

        let dup_type = SchemaBuilder::new().namespace(1, "core", Layer::Core, |ns| {
            ns.record(0, "r", Ok)?.variant(1, "r", Ok)
        });
        assert_matches!(dup_type, Err(SchemaError::DuplicateName { kind: "type", .. }));

        let dup_ns = core().unwrap().namespace(64, "other", Layer::Core, Ok);
        assert_matches!(dup_ns, Err(SchemaError::DuplicateId { kind: "namespace", .. }));
    }

    #[test]
    fn test_db_metadata_and_flag() {
        let schema = SchemaBuilder::new()
            .namespace(30008, "cluster", Layer::Svc, |ns| {
                ns.record(98, "cluster", |r| {
                    r.field(0, "id", Type::id_of("cluster"))?
                        .field(1, "name", Type::Str)?
                        .db(|db| db.primary(0)?.shard(0)?.index(&[1]))
                })
            })
            .unwrap()
            .build();
        let ns = schema.namespace(30008).unwrap();
        assert!(ns.db());
        let db = schema.record(TypeKey::new(30008, 98)).unwrap().db.clone().unwrap();
        assert_eq!(db.primary, Some(0));
        assert_eq!(db.shard, Some(0));
        assert_eq!(db.indexes, vec![vec![1]]);
    }

    #[test]
    fn test_reopen_extends_namespace() {
        let schema = core()
            .unwrap()
            .reopen("core", |ns| ns.record(5, "extra", |r| r.field(0, "x", Type::Bool)))
            .unwrap()
            .build();
        assert_eq!(schema.namespace(64).unwrap().types.len(), 2);

        let err = SchemaBuilder::new().reopen("missing", Ok).unwrap_err();
        assert_matches!(err, SchemaError::UnknownNamespace { .. });
    }

    #[test]
    fn test_field_with_and_declared() {
        let builder = core()
            .unwrap()
            .reopen("core", |ns| {
                ns.record(5, "extra", |r| {
                    r.field_with(0, "old", Type::Str, |f| f.deprecated().with_description("gone"))
                })
            })
            .unwrap();
        assert_eq!(builder.declared("core").map(|ns| ns.id), Some(64));
        assert!(builder.declared("infra").is_none());

        let schema = builder.build();
        let field = &schema.record(TypeKey::new(64, 5)).unwrap().fields[&0];
        assert!(field.meta.deprecated);
        assert_eq!(field.description.as_deref(), Some("gone"));
    }

    #[test]
    fn test_invalid_names() {
        let err = SchemaBuilder::new()
            .namespace(1, "has/slash", Layer::Core, Ok)
            .unwrap_err();
        assert_matches!(err, SchemaError::InvalidName { kind: "namespace", .. });
    }
}

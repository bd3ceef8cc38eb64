use crate::error::{LoadError, LoadResult};
use crate::file::{NamespaceDecl, RecordDecl, SchemaFile, ServiceDecl, TypeDecl, VariantDecl};
use glue_types::{
    prelude, NamespaceBuilder, RecordBuilder, Schema, SchemaBuilder, SchemaResult, ServiceBuilder,
    VariantBuilder,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/* Collects schema documents and assembles them, in order, into one schema */
#[derive(Debug, Default)]
pub struct SchemaLoader {
    /* Track loaded files so a file listed twice is read once */
    loaded_files: HashSet<PathBuf>,

    documents: Vec<(PathBuf, SchemaFile)>,
}

impl SchemaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /* Read and parse one document from disk */
    pub fn add_file(&mut self, path: &Path) -> LoadResult<()> {
        let read_error = |source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        };
        let canonical = path.canonicalize().map_err(read_error)?;
        if !self.loaded_files.insert(canonical) {
            debug!("Skipping already loaded file {}", path.display());
            return Ok(());
        }
        let text = fs::read_to_string(path).map_err(read_error)?;
        self.add_str(path, &text)
    }

    /* Parse a document held in memory; `origin` names it in errors */
    pub fn add_str(&mut self, origin: &Path, text: &str) -> LoadResult<()> {
        let file = SchemaFile::parse(text).map_err(|source| LoadError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        debug!(
            "Parsed {}: {} namespace declarations",
            origin.display(),
            file.namespaces.len()
        );
        self.documents.push((origin.to_path_buf(), file));
        Ok(())
    }

    /// Assemble every document added so far. The standard roots are seeded
    /// first when any document asks for them; declarations of a namespace
    /// already seen add to it.
    pub fn load(self) -> LoadResult<Schema> {
        let with_prelude = self.documents.iter().any(|(_, file)| file.include_prelude);
        let mut builder = if with_prelude {
            prelude::standard().map_err(|source| LoadError::Schema {
                path: PathBuf::from("<prelude>"),
                source,
            })?
        } else {
            SchemaBuilder::new()
        };

        for (path, file) in &self.documents {
            for decl in &file.namespaces {
                builder = declare(builder, decl, path)?;
            }
        }

        let schema = builder.build();
        info!(
            "Loaded {} namespaces from {} documents",
            schema.namespaces.len(),
            self.documents.len()
        );
        Ok(schema)
    }
}

/// Load and assemble schema documents in the given order.
pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> LoadResult<Schema> {
    let mut loader = SchemaLoader::new();
    for path in paths {
        loader.add_file(path.as_ref())?;
    }
    loader.load()
}

fn declare(builder: SchemaBuilder, decl: &NamespaceDecl, path: &Path) -> LoadResult<SchemaBuilder> {
    let schema_error = |source| LoadError::Schema {
        path: path.to_path_buf(),
        source,
    };

    match builder.declared(&decl.name).map(|ns| (u32::from(ns.id), ns.layer)) {
        Some((declared_id, declared_layer)) => {
            if let Some(found) = decl.id.filter(|id| *id != declared_id) {
                return Err(LoadError::ConflictingId {
                    namespace: decl.name.clone(),
                    path: path.to_path_buf(),
                    declared: declared_id,
                    found,
                });
            }
            if let Some(found) = decl.layer.filter(|layer| *layer != declared_layer) {
                return Err(LoadError::ConflictingLayer {
                    namespace: decl.name.clone(),
                    path: path.to_path_buf(),
                    declared: declared_layer,
                    found,
                });
            }
            debug!("Adding to namespace '{}' from {}", decl.name, path.display());
            builder
                .reopen(&decl.name, |ns| fill_namespace(ns, decl))
                .map_err(schema_error)
        }
        None => {
            let incomplete = |missing| LoadError::Incomplete {
                namespace: decl.name.clone(),
                path: path.to_path_buf(),
                missing,
            };
            let id = decl.id.ok_or_else(|| incomplete("an id"))?;
            let layer = decl.layer.ok_or_else(|| incomplete("a layer"))?;
            debug!("Declaring namespace '{}' ({}) from {}", decl.name, layer, path.display());
            builder
                .namespace(id, &decl.name, layer, |ns| fill_namespace(ns, decl))
                .map_err(schema_error)
        }
    }
}

fn fill_namespace(mut ns: NamespaceBuilder, decl: &NamespaceDecl) -> SchemaResult<NamespaceBuilder> {
    for dependency in &decl.depends_on {
        ns = ns.depends_on(dependency);
    }
    for ty in &decl.types {
        ns = match ty {
            TypeDecl::Record(record) => ns.record(record.id, &record.record, |r| fill_record(r, record))?,
            TypeDecl::Variant(variant) => {
                ns.variant(variant.id, &variant.variant, |v| fill_variant(v, variant))?
            }
        };
    }
    for svc in &decl.services {
        ns = ns.service(svc.id, &svc.name, svc.config.0.clone(), |s| fill_service(s, svc))?;
    }
    for group in &decl.service_groups {
        let services: Vec<&str> = group.services.iter().map(String::as_str).collect();
        ns = ns.service_group(group.id, &group.name, &services)?;
    }
    Ok(ns)
}

fn fill_record(mut r: RecordBuilder, decl: &RecordDecl) -> SchemaResult<RecordBuilder> {
    if let Some(description) = &decl.description {
        r = r.describe(description);
    }
    for field in &decl.fields {
        r = r.field_with(field.id, &field.name, field.ty.0.clone(), |mut f| {
            if field.deprecated {
                f = f.deprecated();
            }
            if let Some(description) = &field.description {
                f = f.with_description(description);
            }
            f
        })?;
    }
    for profile in &decl.profiles {
        r = r.profile(profile.id, &profile.fields)?;
    }
    if let Some(db) = &decl.db {
        r = r.db(|mut d| {
            if let Some(primary) = db.primary {
                d = d.primary(primary)?;
            }
            if let Some(shard) = db.shard {
                d = d.shard(shard)?;
            }
            for index in &db.indexes {
                d = d.index(index)?;
            }
            Ok(d)
        })?;
    }
    Ok(r)
}

fn fill_variant(mut v: VariantBuilder, decl: &VariantDecl) -> SchemaResult<VariantBuilder> {
    if let Some(description) = &decl.description {
        v = v.describe(description);
    }
    for value in &decl.values {
        v = match &value.payload {
            Some(payload) => v.value_with(value.ordinal, &value.name, payload.0.clone())?,
            None => v.value(value.ordinal, &value.name)?,
        };
    }
    Ok(v)
}

fn fill_service(mut s: ServiceBuilder, decl: &ServiceDecl) -> SchemaResult<ServiceBuilder> {
    for method in &decl.methods {
        s = s.method(method.id, &method.name, method.params.0.clone(), method.returns.0.clone())?;
    }
    for required in &decl.requires {
        s = s.requires(required);
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use glue_types::{Layer, SchemaError, Type};

    fn load(documents: &[&str]) -> LoadResult<Schema> {
        let mut loader = SchemaLoader::new();
        for (i, text) in documents.iter().enumerate() {
            loader.add_str(Path::new(&format!("doc{}.yaml", i)), text)?;
        }
        loader.load()
    }

    #[test]
    fn test_later_documents_add_to_namespaces() {
        let schema = load(&[
            "namespaces:\n  - { id: 64, name: core, layer: core, types: [{ record: a, id: 0 }] }\n",
            "namespaces:\n  - { name: core, types: [{ record: b, id: 1 }] }\n",
        ])
        .unwrap();
        let core = schema.namespace_by_name("core").unwrap();
        assert_eq!(core.types.len(), 2);
    }

    #[test]
    fn test_first_declaration_needs_id_and_layer() {
        let err = load(&["namespaces:\n  - { name: core, layer: core }\n"]).unwrap_err();
        assert_matches!(err, LoadError::Incomplete { missing: "an id", .. });

        let err = load(&["namespaces:\n  - { id: 1, name: core }\n"]).unwrap_err();
        assert_matches!(err, LoadError::Incomplete { missing: "a layer", .. });
    }

    #[test]
    fn test_redeclaration_must_agree() {
        let err = load(&[
            "namespaces:\n  - { id: 64, name: core, layer: core }\n",
            "namespaces:\n  - { id: 65, name: core }\n",
        ])
        .unwrap_err();
        assert_matches!(err, LoadError::ConflictingId { declared: 64, found: 65, .. });

        let err = load(&[
            "namespaces:\n  - { id: 64, name: core, layer: core }\n",
            "namespaces:\n  - { name: core, layer: infra }\n",
        ])
        .unwrap_err();
        assert_matches!(
            err,
            LoadError::ConflictingLayer {
                declared: Layer::Core,
                found: Layer::Infra,
                ..
            }
        );
    }

    #[test]
    fn test_builder_checks_apply() {
        let err = load(&[
            "namespaces:\n  - { id: 64, name: core, layer: core, services: [{ id: 0, name: api }] }\n",
        ])
        .unwrap_err();
        assert_matches!(
            err,
            LoadError::Schema {
                source: SchemaError::ServicesNotAllowed { .. },
                ..
            }
        );
    }

    #[test]
    fn test_prelude_is_seeded_once() {
        let schema = load(&["include-prelude: true\n", "include-prelude: true\n"]).unwrap();
        assert!(schema.namespace_by_name("rpcserver").is_some());
        assert_eq!(
            schema.namespace_by_name("core").unwrap().type_by_name("logLevel").map(|t| t.id()),
            Some(0)
        );
    }

    #[test]
    fn test_field_metadata() {
        let schema = load(&[r#"
namespaces:
  - id: 64
    name: core
    layer: core
    types:
      - record: user
        id: 0
        description: A person
        fields:
          - { id: 0, name: name, type: str, description: Display name }
          - { id: 1, name: nick, type: { nullable: str }, deprecated: true }
"#])
        .unwrap();
        let core = schema.namespace_by_name("core").unwrap();
        let record = schema.record(glue_types::TypeKey::new(core.id, 0)).unwrap();
        assert_eq!(record.description.as_deref(), Some("A person"));
        assert_eq!(record.fields[&0].description.as_deref(), Some("Display name"));
        assert!(record.fields[&1].meta.deprecated);
        assert_eq!(record.fields[&1].ty, Type::Nullable(Box::new(Type::Str)));
    }
}

//! TypeScript emission.
//!
//! [`Generator`] walks the layers bottom-up. Within a layer every namespace
//! is scaffolded first, then its types, DB accessors and services are
//! emitted, one pass at a time, so later passes can rely on the packages of
//! the earlier ones. Service groups and the `index.ts` manifests are written
//! once every layer is done.

pub mod db;
pub mod emitter;
pub mod manifest;
pub mod models;
pub mod naming;
pub mod scaffold;
pub mod services;
pub mod typescript;

use crate::error::{BuildError, BuildResult};
use crate::index::ResolvedSchema;
use crate::options::GenOptions;
use crate::sink::OutputSink;
use emitter::Emitter;
use glue_types::prelude::{DB_WRAPPER, RPC_CLIENT, RPC_SERVER};
use glue_types::{Layer, Namespace, TypeDef, TypeKey};
use naming::{group_package, namespace_alias, namespace_package, service_package};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use typescript::{Imports, RUNTIME_ALIAS, Scope, referenced_namespaces};

pub const TYPES_FILE: &str = "codegen.types.ts";
pub const DB_FILE: &str = "codegen.db.ts";
pub const CLIENTS_FILE: &str = "codegen.rpcclients.ts";
pub const SERVERS_FILE: &str = "codegen.rpcservers.ts";
pub const ENTRYPOINT_FILE: &str = "entrypoint.ts";
pub const INDEX_FILE: &str = "index.ts";

/* Package holding the hand-written model runtime */
pub const CORE_PACKAGE: &str = "core";
const RUNTIME_MODULE: &str = "./model.js";
const LOCAL_TYPES_MODULE: &str = "./codegen.types.js";

pub struct Generator<'a> {
  resolved: &'a ResolvedSchema,
  options: &'a GenOptions,
  sink: &'a mut dyn OutputSink,
  packages: BTreeSet<String>,
  written: Vec<PathBuf>,
}

impl<'a> Generator<'a> {
  pub fn new(resolved: &'a ResolvedSchema, options: &'a GenOptions, sink: &'a mut dyn OutputSink) -> Self {
    Self {
      resolved,
      options,
      sink,
      packages: BTreeSet::new(),
      written: Vec::new(),
    }
  }

  /// Run every pass. Returns the paths written, in write order.
  pub fn run(mut self) -> BuildResult<Vec<PathBuf>> {
    let resolved = self.resolved;
    let schema = resolved.schema();
    for layer in Layer::ALL {
      let namespaces: Vec<&Namespace> = schema.in_layer(layer).collect();
      if namespaces.is_empty() {
        continue;
      }
      info!(
        "Emitting layer {}: {}",
        layer,
        namespaces.iter().map(|ns| ns.name.as_str()).collect::<Vec<_>>().join(", ")
      );
      for ns in &namespaces {
        self.scaffold_namespace(ns)?;
      }
      for ns in &namespaces {
        self.emit_types(ns)?;
      }
      for ns in namespaces.iter().filter(|ns| ns.db()) {
        self.emit_db(ns)?;
      }
      for ns in namespaces.iter().filter(|ns| !ns.services.is_empty()) {
        self.emit_services(ns)?;
      }
    }

    for ns in schema.namespaces.values() {
      if !ns.service_groups.is_empty() {
        self.emit_service_groups(ns)?;
      }
    }

    let packages = std::mem::take(&mut self.packages);
    for package in &packages {
      let path = manifest::write_index(self.sink, package)?;
      self.written.push(path);
    }
    info!("Generated {} files in {} packages", self.written.len(), packages.len());
    Ok(self.written)
  }

  fn namespace(&self, id: u16) -> BuildResult<&'a Namespace> {
    let resolved = self.resolved;
    resolved
      .schema()
      .namespace(id)
      .ok_or_else(|| BuildError::Internal(format!("no namespace with id {}", id)))
  }

  fn root(&self, name: &str) -> BuildResult<&'a Namespace> {
    let resolved = self.resolved;
    resolved
      .schema()
      .namespace_by_name(name)
      .ok_or_else(|| BuildError::Internal(format!("runtime root '{}' is missing", name)))
  }

  fn runtime_module(&self, home: &Namespace) -> String {
    if namespace_package(home) == CORE_PACKAGE {
      RUNTIME_MODULE.to_string()
    } else {
      self.options.package_name(CORE_PACKAGE)
    }
  }

  /* Import every namespace in `ids`; `home_module` replaces the package of
     the file's own namespace */
  fn import_namespaces(&self, imports: &mut Imports, ids: &BTreeSet<u16>, home: u16, home_module: &str) -> BuildResult<()> {
    for id in ids {
      let module = if *id == home {
        home_module.to_string()
      } else {
        self.options.package_name(&namespace_package(self.namespace(*id)?))
      };
      imports.add(namespace_alias(*id), module);
    }
    Ok(())
  }

  fn finish(&mut self, emitter: Emitter) -> BuildResult<()> {
    let path = emitter.finish(self.sink)?;
    debug!("Wrote {}", path.display());
    self.written.push(path);
    Ok(())
  }

  fn scaffold(&mut self, package: &str, dependencies: &BTreeSet<String>) -> BuildResult<()> {
    let descriptor = scaffold::write_descriptor(self.sink, self.options, package, dependencies)?;
    let tsconfig = scaffold::write_tsconfig(self.sink, package)?;
    self.written.push(descriptor);
    self.written.push(tsconfig);
    self.packages.insert(package.to_string());
    Ok(())
  }

  /* Pass (a) */
  fn scaffold_namespace(&mut self, ns: &Namespace) -> BuildResult<()> {
    let dependencies: BTreeSet<String> = self
      .resolved
      .dependencies_of(ns.id)
      .map(namespace_package)
      .collect();
    self.scaffold(&namespace_package(ns), &dependencies)
  }

  /* Pass (b) */
  fn emit_types(&mut self, ns: &Namespace) -> BuildResult<()> {
    if ns.types.is_empty() {
      return Ok(());
    }
    let package = namespace_package(ns);
    let scope = Scope::new(self.resolved, ns.id, true);

    let mut referenced = BTreeSet::new();
    for def in ns.types.values() {
      match def {
        TypeDef::Record(record) => {
          for field in record.fields.values() {
            referenced_namespaces(&field.ty, &mut referenced);
          }
        }
        TypeDef::Variant(variant) => {
          for payload in variant.values.values().filter_map(|v| v.payload.as_ref()) {
            referenced_namespaces(payload, &mut referenced);
          }
        }
      }
    }
    referenced.remove(&ns.id);

    let mut imports = Imports::new();
    imports.add(RUNTIME_ALIAS, self.runtime_module(ns));
    self.import_namespaces(&mut imports, &referenced, ns.id, LOCAL_TYPES_MODULE)?;

    let mut e = Emitter::source(Path::new(&package).join(TYPES_FILE));
    imports.emit(&mut e);
    for def in ns.types.values() {
      match def {
        TypeDef::Record(record) => models::emit_record(&mut e, &scope, ns, record)?,
        TypeDef::Variant(variant) => models::emit_variant(&mut e, &scope, ns, variant)?,
      }
    }
    self.finish(e)
  }

  /* Pass (c) */
  fn emit_db(&mut self, ns: &Namespace) -> BuildResult<()> {
    let package = namespace_package(ns);
    let wrapper = self.root(DB_WRAPPER)?;
    let scope = Scope::new(self.resolved, ns.id, false);

    let mut imports = Imports::new();
    imports.add(
      namespace_alias(wrapper.id),
      self.options.package_name(&namespace_package(wrapper)),
    );
    imports.add(namespace_alias(ns.id), LOCAL_TYPES_MODULE);

    let mut e = Emitter::source(Path::new(&package).join(DB_FILE));
    imports.emit(&mut e);
    for def in ns.types.values() {
      if let TypeDef::Record(record) = def {
        if record.db.is_some() {
          let table = db::table_schema(self.resolved, TypeKey::new(ns.id, record.id))?;
          db::emit_table(&mut e, &scope, &table, &namespace_alias(wrapper.id))?;
        }
      }
    }
    self.finish(e)
  }

  /* Pass (d): clients in the namespace package, one package per server */
  fn emit_services(&mut self, ns: &Namespace) -> BuildResult<()> {
    let package = namespace_package(ns);
    let client_root = self.root(RPC_CLIENT)?;
    let server_root = self.root(RPC_SERVER)?;

    let mut referenced = BTreeSet::new();
    for svc in ns.services.values() {
      referenced_namespaces(&svc.config, &mut referenced);
      for method in svc.methods.values() {
        referenced_namespaces(&method.params, &mut referenced);
        referenced_namespaces(&method.returns, &mut referenced);
      }
    }

    let scope = Scope::new(self.resolved, ns.id, false);
    let mut imports = Imports::new();
    imports.add(
      namespace_alias(client_root.id),
      self.options.package_name(&namespace_package(client_root)),
    );
    self.import_namespaces(&mut imports, &referenced, ns.id, LOCAL_TYPES_MODULE)?;
    let mut e = Emitter::source(Path::new(&package).join(CLIENTS_FILE));
    imports.emit(&mut e);
    for svc in ns.services.values() {
      services::emit_client(&mut e, &scope, ns, svc, &namespace_alias(client_root.id))?;
    }
    self.finish(e)?;

    let home_module = self.options.package_name(&package);
    for svc in ns.services.values() {
      let svc_package = service_package(ns, svc);
      let mut dependencies: BTreeSet<String> = [package.clone(), namespace_package(server_root)].into();
      for id in &referenced {
        dependencies.insert(namespace_package(self.namespace(*id)?));
      }
      self.scaffold(&svc_package, &dependencies)?;

      let mut ids = referenced.clone();
      ids.insert(ns.id);
      let mut imports = Imports::new();
      imports.add(
        namespace_alias(server_root.id),
        self.options.package_name(&namespace_package(server_root)),
      );
      self.import_namespaces(&mut imports, &ids, ns.id, &home_module)?;

      let mut e = Emitter::source(Path::new(&svc_package).join(SERVERS_FILE));
      imports.emit(&mut e);
      services::emit_outcome_type(&mut e);
      services::emit_server(&mut e, &scope, ns, svc, &namespace_alias(server_root.id))?;
      self.finish(e)?;

      let entrypoint = Path::new(&svc_package).join(ENTRYPOINT_FILE);
      if !self.sink.exists(&entrypoint) {
        self.sink.write_file(&entrypoint, services::ENTRYPOINT_STUB)?;
        info!("Created entrypoint stub {}", entrypoint.display());
        self.written.push(entrypoint);
      }
    }
    Ok(())
  }

  /* Pass (e) */
  fn emit_service_groups(&mut self, ns: &Namespace) -> BuildResult<()> {
    let resolved = self.resolved;
    for group in ns.service_groups.values() {
      let package = group_package(ns, group);
      let mut members = Vec::with_capacity(group.services.len());
      for reference in &group.services {
        let (svc_ns, svc) = resolved
          .lookup_service(reference)
          .and_then(|key| resolved.service(key))
          .ok_or_else(|| BuildError::Internal(format!("service '{}' vanished after indexing", reference)))?;
        members.push(service_package(svc_ns, svc));
      }
      let dependencies: BTreeSet<String> = members.iter().cloned().collect();
      self.scaffold(&package, &dependencies)?;

      let scoped: Vec<String> = members.iter().map(|m| self.options.package_name(m)).collect();
      let mut e = Emitter::source(Path::new(&package).join(ENTRYPOINT_FILE));
      services::emit_group_entrypoint(&mut e, &scoped);
      self.finish(e)?;
    }
    Ok(())
  }
}

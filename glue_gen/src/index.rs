/* Whole-schema reference resolution and dependency validation.

   `index` turns a schema as written by the builder into a `ResolvedSchema`:
   a new tree in which every named reference is replaced by a record or
   variant node addressed by its `TypeKey`, plus the namespace dependency
   graph. The input is never modified. */

use crate::dependency::{Dependency, DependencyGraph, DependencyKind};
use crate::error::{BuildError, BuildResult};
use glue_types::prelude::{DB_WRAPPER, RPC_CLIENT, RPC_SERVER};
use glue_types::{
  EnumValue, Field, Method, NAMESPACE_SEPARATOR, Namespace, Record, Schema, Service,
  ServiceGroup, Type, TypeDef, TypeKey, Variant, qualified_name,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceKey {
  pub namespace: u16,
  pub service_id: u16,
}

/// A fully resolved schema and the facts derived while resolving it.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
  schema: Schema,
  types: BTreeMap<String, TypeKey>,
  services: BTreeMap<String, ServiceKey>,
  graph: DependencyGraph,
  nominal_ids: BTreeSet<TypeKey>,
}

impl ResolvedSchema {
  pub fn schema(&self) -> &Schema {
    &self.schema
  }

  pub fn graph(&self) -> &DependencyGraph {
    &self.graph
  }

  pub fn into_schema(self) -> Schema {
    self.schema
  }

  pub fn lookup_type(&self, qualified: &str) -> Option<TypeKey> {
    self.types.get(qualified).copied()
  }

  pub fn lookup_service(&self, qualified: &str) -> Option<ServiceKey> {
    self.services.get(qualified).copied()
  }

  pub fn service(&self, key: ServiceKey) -> Option<(&Namespace, &Service)> {
    let ns = self.schema.namespace(key.namespace)?;
    Some((ns, ns.services.get(&key.service_id)?))
  }

  /// Records that own a self-referential id field and therefore get a
  /// nominal identifier type.
  pub fn has_nominal_id(&self, key: TypeKey) -> bool {
    self.nominal_ids.contains(&key)
  }

  /* Namespaces `ns` depends on, ascending id */
  pub fn dependencies_of(&self, ns: u16) -> impl Iterator<Item = &Namespace> {
    self
      .graph
      .dependencies_of(ns)
      .filter_map(|id| self.schema.namespace(id))
  }
}

/// Resolve and validate `schema`. Runs the flat index, reference resolution,
/// dependency graph construction and DB key validation in that order, then
/// rejects unbounded recursive records and dependency cycles.
pub fn index(schema: &Schema) -> BuildResult<ResolvedSchema> {
  info!("Indexing {} namespaces", schema.namespaces.len());
  let mut indexer = Indexer::new(schema);
  indexer.flat_index();
  let resolved = indexer.resolve()?;
  let graph = indexer.build_graph(&resolved)?;
  validate_db_keys(&resolved)?;
  check_unbounded_recursion(&resolved)?;

  if let Some(cycle) = graph.find_cycle() {
    let names = cycle
      .cycle
      .iter()
      .map(|id| namespace_name(&resolved, *id))
      .collect();
    return Err(BuildError::CyclicDependency { cycle: names });
  }

  let nominal_ids = collect_nominal_ids(&resolved);
  info!(
    "Indexed {} types, {} services, {} dependency edges",
    indexer.types.len(),
    indexer.services.len(),
    graph.edges.len()
  );
  Ok(ResolvedSchema {
    schema: resolved,
    types: indexer.types,
    services: indexer.services,
    graph,
    nominal_ids,
  })
}

fn namespace_name(schema: &Schema, id: u16) -> String {
  schema
    .namespace(id)
    .map_or_else(|| format!("#{}", id), |ns| ns.name.clone())
}

struct Indexer<'a> {
  source: &'a Schema,
  types: BTreeMap<String, TypeKey>,
  services: BTreeMap<String, ServiceKey>,
  /* Cross-namespace dependencies discovered while resolving, in walk order */
  discovered: Vec<Dependency>,
}

impl<'a> Indexer<'a> {
  fn new(source: &'a Schema) -> Self {
    Self {
      source,
      types: BTreeMap::new(),
      services: BTreeMap::new(),
      discovered: Vec::new(),
    }
  }

  /* Pass 1: "<namespace>/<name>" lookup tables */
  fn flat_index(&mut self) {
    let source = self.source;
    for ns in source.namespaces.values() {
      for def in ns.types.values() {
        self
          .types
          .insert(qualified_name(&ns.name, def.name()), TypeKey::new(ns.id, def.id()));
      }
      for svc in ns.services.values() {
        self.services.insert(
          qualified_name(&ns.name, &svc.name),
          ServiceKey {
            namespace: ns.id,
            service_id: svc.id,
          },
        );
      }
    }
  }

  fn qualify(name: &str, origin: &Namespace) -> String {
    if name.contains(NAMESPACE_SEPARATOR) {
      name.to_string()
    } else {
      qualified_name(&origin.name, name)
    }
  }

  fn discover(&mut self, origin: &Namespace, target: u16, kind: DependencyKind, context: &str) {
    if origin.id != target {
      self.discovered.push(Dependency {
        from: origin.id,
        to: target,
        kind,
        context: context.to_string(),
      });
    }
  }

  /* Pass 2: build the resolved tree */
  fn resolve(&mut self) -> BuildResult<Schema> {
    let source = self.source;
    let mut resolved = Schema::default();
    for ns in source.namespaces.values() {
      resolved.namespaces.insert(ns.id, self.resolve_namespace(ns)?);
    }
    Ok(resolved)
  }

  fn resolve_namespace(&mut self, ns: &Namespace) -> BuildResult<Namespace> {
    let mut out = Namespace::new(ns.id, &ns.name, ns.layer);
    out.depends_on = ns.depends_on.clone();

    for (id, def) in &ns.types {
      let def = match def {
        TypeDef::Record(record) => TypeDef::Record(self.resolve_record(ns, record)?),
        TypeDef::Variant(variant) => TypeDef::Variant(self.resolve_variant(ns, variant)?),
      };
      out.types.insert(*id, def);
    }

    for (id, svc) in &ns.services {
      out.services.insert(*id, self.resolve_service(ns, svc)?);
    }

    for (id, group) in &ns.service_groups {
      let context = format!("service group '{}'", qualified_name(&ns.name, &group.name));
      let mut services = Vec::with_capacity(group.services.len());
      for reference in &group.services {
        services.push(self.resolve_service_ref(ns, reference, &context)?);
      }
      out.service_groups.insert(
        *id,
        ServiceGroup {
          id: group.id,
          name: group.name.clone(),
          services,
        },
      );
    }

    for dependency in &ns.depends_on {
      let target = self
        .source
        .namespace_by_name(dependency)
        .map(|target| target.id)
        .ok_or_else(|| BuildError::UnresolvedReference {
          reference: dependency.clone(),
          context: format!("dependencies of namespace '{}'", ns.name),
        })?;
      let context = format!("explicit dependency of '{}'", ns.name);
      self.discover(ns, target, DependencyKind::Explicit, &context);
    }

    Ok(out)
  }

  fn resolve_record(&mut self, ns: &Namespace, record: &Record) -> BuildResult<Record> {
    let mut out = record.clone();
    for field in out.fields.values_mut() {
      let context = format!(
        "field '{}.{}'",
        qualified_name(&ns.name, &record.name),
        field.name
      );
      field.ty = self.resolve_type(ns, &field.ty, &context)?;
    }
    Ok(out)
  }

  fn resolve_variant(&mut self, ns: &Namespace, variant: &Variant) -> BuildResult<Variant> {
    let mut out = variant.clone();
    for value in out.values.values_mut() {
      let EnumValue { name, payload, .. } = value;
      if let Some(payload) = payload {
        let context = format!(
          "payload of '{}.{}'",
          qualified_name(&ns.name, &variant.name),
          name
        );
        *payload = self.resolve_type(ns, payload, &context)?;
      }
    }
    Ok(out)
  }

  fn resolve_service(&mut self, ns: &Namespace, svc: &Service) -> BuildResult<Service> {
    let qualified = qualified_name(&ns.name, &svc.name);
    let config = self.resolve_type(ns, &svc.config, &format!("config of service '{}'", qualified))?;

    let mut methods = BTreeMap::new();
    for (id, method) in &svc.methods {
      let params = self.resolve_type(
        ns,
        &method.params,
        &format!("params of '{}.{}'", qualified, method.name),
      )?;
      let returns = self.resolve_type(
        ns,
        &method.returns,
        &format!("returns of '{}.{}'", qualified, method.name),
      )?;
      methods.insert(
        *id,
        Method {
          id: method.id,
          name: method.name.clone(),
          params,
          returns,
        },
      );
    }

    let context = format!("requirements of service '{}'", qualified);
    let mut requires = Vec::with_capacity(svc.requires.len());
    for reference in &svc.requires {
      requires.push(self.resolve_service_ref(ns, reference, &context)?);
    }

    Ok(Service {
      id: svc.id,
      name: svc.name.clone(),
      config,
      methods,
      requires,
    })
  }

  /* Service references resolve to their qualified name */
  fn resolve_service_ref(&mut self, ns: &Namespace, reference: &str, context: &str) -> BuildResult<String> {
    let qualified = Self::qualify(reference, ns);
    let key = self
      .services
      .get(&qualified)
      .copied()
      .ok_or_else(|| BuildError::UnresolvedReference {
        reference: reference.to_string(),
        context: context.to_string(),
      })?;
    self.discover(ns, key.namespace, DependencyKind::ServiceReference, context);
    Ok(qualified)
  }

  fn resolve_type(&mut self, ns: &Namespace, ty: &Type, context: &str) -> BuildResult<Type> {
    match ty {
      Type::Named(name) => {
        let qualified = Self::qualify(name, ns);
        let key = self
          .types
          .get(&qualified)
          .copied()
          .ok_or_else(|| BuildError::UnresolvedReference {
            reference: name.clone(),
            context: context.to_string(),
          })?;
        debug!("Resolved {} in {} to {}", qualified, context, key);
        self.resolved_node(ns, key, context)
      }
      Type::Record(key) | Type::Variant(key) => {
        /* Already resolved; the key must still address the same kind of definition */
        let node = self.resolved_node(ns, *key, context)?;
        if &node != ty {
          return Err(BuildError::UnresolvedReference {
            reference: ty.to_string(),
            context: context.to_string(),
          });
        }
        Ok(node)
      }
      Type::Id(Some(of)) => {
        let target = self.resolve_type(ns, of, context)?;
        if !matches!(target, Type::Record(_)) {
          return Err(BuildError::InvalidIdTarget {
            reference: of.to_string(),
            context: context.to_string(),
          });
        }
        Ok(Type::Id(Some(Box::new(target))))
      }
      Type::Nullable(inner) => {
        /* Nullable never wraps nullable, even when built without Type::nullable */
        let inner = self.resolve_type(ns, inner, context)?;
        Ok(Type::nullable(inner)?)
      }
      Type::Array(inner) => Ok(Type::Array(Box::new(self.resolve_type(ns, inner, context)?))),
      Type::Dict(inner) => Ok(Type::Dict(Box::new(self.resolve_type(ns, inner, context)?))),
      Type::Bool | Type::Str | Type::Int32 | Type::Any | Type::Raw | Type::Empty | Type::Id(None) => {
        Ok(ty.clone())
      }
    }
  }

  fn resolved_node(&mut self, ns: &Namespace, key: TypeKey, context: &str) -> BuildResult<Type> {
    let node = match self.source.type_def(key) {
      Some(TypeDef::Record(_)) => Type::Record(key),
      Some(TypeDef::Variant(_)) => Type::Variant(key),
      None => {
        return Err(BuildError::UnresolvedReference {
          reference: key.to_string(),
          context: context.to_string(),
        });
      }
    };
    self.discover(ns, key.namespace, DependencyKind::TypeReference, context);
    Ok(node)
  }

  /* Pass 3: dependency graph with the layering rule */
  fn build_graph(&self, schema: &Schema) -> BuildResult<DependencyGraph> {
    let mut graph = DependencyGraph::new();
    for id in schema.namespaces.keys() {
      graph.add_node(*id);
    }

    for dependency in &self.discovered {
      link(schema, &mut graph, dependency.clone())?;
    }

    for ns in schema.namespaces.values() {
      for layer in ns.layer.below() {
        match schema.namespace_by_name(layer.name()) {
          Some(root) => link(
            schema,
            &mut graph,
            Dependency {
              from: ns.id,
              to: root.id,
              kind: DependencyKind::LayerRoot,
              context: format!("root of layer '{}'", layer),
            },
          )?,
          None => warn!(
            "Namespace '{}' skips missing root namespace of layer '{}'",
            ns.name, layer
          ),
        }
      }

      if !ns.services.is_empty() {
        for runtime in [RPC_CLIENT, RPC_SERVER] {
          let target = required_root(schema, runtime, ns, "services")?;
          link(
            schema,
            &mut graph,
            Dependency {
              from: ns.id,
              to: target,
              kind: DependencyKind::RpcRuntime,
              context: format!("services of '{}'", ns.name),
            },
          )?;
        }
      }

      if ns.db() {
        let target = required_root(schema, DB_WRAPPER, ns, "db records")?;
        link(
          schema,
          &mut graph,
          Dependency {
            from: ns.id,
            to: target,
            kind: DependencyKind::DbRuntime,
            context: format!("db records of '{}'", ns.name),
          },
        )?;
      }
    }

    Ok(graph)
  }
}

fn required_root(schema: &Schema, name: &str, ns: &Namespace, what: &str) -> BuildResult<u16> {
  schema
    .namespace_by_name(name)
    .map(|root| root.id)
    .ok_or_else(|| BuildError::UnresolvedReference {
      reference: name.to_string(),
      context: format!("runtime root required by {} of namespace '{}'", what, ns.name),
    })
}

fn link(schema: &Schema, graph: &mut DependencyGraph, dependency: Dependency) -> BuildResult<()> {
  let (Some(origin), Some(target)) = (
    schema.namespace(dependency.from),
    schema.namespace(dependency.to),
  ) else {
    return Err(BuildError::Internal(format!(
      "dependency {} -> {} names an unknown namespace",
      dependency.from, dependency.to
    )));
  };
  if target.layer > origin.layer {
    return Err(BuildError::LayeringViolation {
      origin: origin.name.clone(),
      origin_layer: origin.layer,
      target: target.name.clone(),
      target_layer: target.layer,
      context: dependency.context,
    });
  }
  graph.add_dependency(dependency);
  Ok(())
}

/* Pass 4: DB key requirements */
fn validate_db_keys(schema: &Schema) -> BuildResult<()> {
  for ns in schema.namespaces.values() {
    for def in ns.types.values() {
      let TypeDef::Record(record) = def else {
        continue;
      };
      let Some(db) = &record.db else {
        continue;
      };
      let name = qualified_name(&ns.name, &record.name);
      let primary = db.primary.ok_or_else(|| BuildError::MissingPrimaryKey {
        record: name.clone(),
      })?;
      let shard = db.shard.ok_or_else(|| BuildError::MissingShardKey {
        record: name.clone(),
      })?;

      for key in [primary, shard] {
        let field = key_field(record, key, &name)?;
        if !is_key_type(&field.ty) {
          return Err(BuildError::InvalidDbKey {
            record: name,
            field: key,
            reason: "must be a non-nullable id, str, int32 or bool",
          });
        }
      }

      for tuple in &db.indexes {
        for key in tuple {
          let field = key_field(record, *key, &name)?;
          if single_column_type(&field.ty).is_none() {
            return Err(BuildError::InvalidDbKey {
              record: name,
              field: *key,
              reason: "does not map to a single column and cannot be indexed",
            });
          }
        }
      }
    }
  }
  Ok(())
}

fn key_field<'r>(record: &'r Record, key: u16, name: &str) -> BuildResult<&'r Field> {
  record.fields.get(&key).ok_or_else(|| BuildError::InvalidDbKey {
    record: name.to_string(),
    field: key,
    reason: "is not declared on the record",
  })
}

fn is_key_type(ty: &Type) -> bool {
  matches!(ty, Type::Id(_) | Type::Str | Type::Int32 | Type::Bool)
}

/* Record and variant fields flatten into several columns */
fn single_column_type(ty: &Type) -> Option<&Type> {
  match ty {
    Type::Nullable(inner) => single_column_type(inner),
    Type::Record(_) | Type::Variant(_) | Type::Named(_) => None,
    other => Some(other),
  }
}

/* A record or variant whose zero value would contain itself can never be
   constructed. Only unwrapped record fields and the payload of a variant's
   default case are followed; nullable and container wrappers break the chain. */
fn check_unbounded_recursion(schema: &Schema) -> BuildResult<()> {
  let mut done = BTreeSet::new();
  for ns in schema.namespaces.values() {
    for def in ns.types.values() {
      let key = TypeKey::new(ns.id, def.id());
      let mut path = Vec::new();
      if let Some(cycle) = containment_cycle(schema, key, &mut path, &mut done) {
        let path = cycle
          .into_iter()
          .map(|k| schema.qualified_type_name(k).unwrap_or_else(|| k.to_string()))
          .collect();
        return Err(BuildError::UnboundedRecursion { path });
      }
    }
  }
  Ok(())
}

fn contained_defs(schema: &Schema, key: TypeKey) -> Vec<TypeKey> {
  let direct = |ty: &Type| match ty {
    Type::Record(k) | Type::Variant(k) => Some(*k),
    _ => None,
  };
  match schema.type_def(key) {
    Some(TypeDef::Record(record)) => record.fields.values().filter_map(|f| direct(&f.ty)).collect(),
    Some(TypeDef::Variant(variant)) => variant
      .default_value()
      .and_then(|v| v.payload.as_ref())
      .and_then(direct)
      .into_iter()
      .collect(),
    None => Vec::new(),
  }
}

fn containment_cycle(
  schema: &Schema,
  key: TypeKey,
  path: &mut Vec<TypeKey>,
  done: &mut BTreeSet<TypeKey>,
) -> Option<Vec<TypeKey>> {
  if let Some(start) = path.iter().position(|k| *k == key) {
    let mut cycle = path[start..].to_vec();
    cycle.push(key);
    return Some(cycle);
  }
  if done.contains(&key) {
    return None;
  }
  path.push(key);
  for next in contained_defs(schema, key) {
    if let Some(cycle) = containment_cycle(schema, next, path, done) {
      return Some(cycle);
    }
  }
  path.pop();
  done.insert(key);
  None
}

fn collect_nominal_ids(schema: &Schema) -> BTreeSet<TypeKey> {
  let mut keys = BTreeSet::new();
  for ns in schema.namespaces.values() {
    for def in ns.types.values() {
      let TypeDef::Record(record) = def else {
        continue;
      };
      let key = TypeKey::new(ns.id, record.id);
      let self_id = Type::Id(Some(Box::new(Type::Record(key))));
      let mut found = false;
      for field in record.fields.values() {
        field.ty.walk(&mut |t| found |= *t == self_id);
      }
      if found {
        keys.insert(key);
      }
    }
  }
  keys
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod index_tests;

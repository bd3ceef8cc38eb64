use crate::sink::SinkError;
use glue_types::{Layer, SchemaError};
use thiserror::Error;

/// Every way a build can fail. All variants are fatal to the current build.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("invalid schema construction: {0}")]
  InvalidSchemaConstruction(#[from] SchemaError),

  /// A named reference is missing from the flat index
  #[error("unresolved reference '{reference}' in {context}")]
  UnresolvedReference { reference: String, context: String },

  #[error("'{reference}' in {context} does not name a record, so it cannot narrow an id")]
  InvalidIdTarget { reference: String, context: String },

  /// A namespace would depend on a strictly higher layer
  #[error(
    "layering violation: namespace '{origin}' ({origin_layer}) cannot depend on '{target}' ({target_layer}) via {context}"
  )]
  LayeringViolation {
    origin: String,
    origin_layer: Layer,
    target: String,
    target_layer: Layer,
    context: String,
  },

  #[error("record '{record}' has db metadata but no primary key")]
  MissingPrimaryKey { record: String },

  #[error("record '{record}' has db metadata but no shard key")]
  MissingShardKey { record: String },

  #[error("record '{record}': db field {field} {reason}")]
  InvalidDbKey {
    record: String,
    field: u16,
    reason: &'static str,
  },

  /// A record contains itself without any nullable or container indirection
  #[error("type contains itself without indirection: {}", path.join(" -> "))]
  UnboundedRecursion { path: Vec<String> },

  #[error("cyclic dependency between namespaces: {}", cycle.join(" -> "))]
  CyclicDependency { cycle: Vec<String> },

  #[error("output sink failure: {0}")]
  OutputSinkFailure(#[from] SinkError),

  #[error("malformed package descriptor '{path}': {source}")]
  InvalidDescriptor {
    path: String,
    source: serde_json::Error,
  },

  /// Inconsistency inside the generator; indicates a bug, never a schema problem
  #[error("internal generator error: {0}")]
  Internal(String),
}

pub type BuildResult<T> = Result<T, BuildError>;

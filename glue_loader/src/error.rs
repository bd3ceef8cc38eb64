use glue_types::{Layer, SchemaError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read '{}': {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yml::Error,
    },

    /// First declaration of a namespace without an id or a layer
    #[error("namespace '{namespace}' in '{}' is declared for the first time and needs {missing}", path.display())]
    Incomplete {
        namespace: String,
        path: PathBuf,
        missing: &'static str,
    },

    #[error("namespace '{namespace}' in '{}' has id {found}, but was declared with id {declared}", path.display())]
    ConflictingId {
        namespace: String,
        path: PathBuf,
        declared: u32,
        found: u32,
    },

    #[error("namespace '{namespace}' in '{}' is in layer '{found}', but was declared in '{declared}'", path.display())]
    ConflictingLayer {
        namespace: String,
        path: PathBuf,
        declared: Layer,
        found: Layer,
    },

    #[error("invalid schema in '{}': {source}", path.display())]
    Schema { path: PathBuf, source: SchemaError },
}

pub type LoadResult<T> = Result<T, LoadError>;

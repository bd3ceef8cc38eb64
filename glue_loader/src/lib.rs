//! Schema Document Loading
//!
//! This crate reads declarative YAML schema documents and assembles them
//! into a [`glue_types::Schema`]. Every declaration goes through the typed
//! builder, so documents are held to the same construction rules as schemas
//! built in code.

pub mod error;
pub mod file;
pub mod loader;

pub use error::{LoadError, LoadResult};
pub use file::{NamespaceDecl, SchemaFile, TypeDecl, TypeSpec};
pub use loader::{load_files, SchemaLoader};

// Re-export glue_types for convenience
pub use glue_types;

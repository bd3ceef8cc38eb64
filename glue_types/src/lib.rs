//! Schema Type Definitions
//!
//! This crate contains the schema model for the glue interface compiler:
//! layers, the closed type algebra, namespaces with their records, variants
//! and services, and the typed builder used to assemble them. It performs no
//! file I/O, reference resolution or code generation.

pub mod builder;
pub mod error;
pub mod layer;
pub mod prelude;
pub mod schema;
pub mod types;

// Re-export commonly used types at the crate root
pub use builder::*;
pub use error::*;
pub use layer::*;
pub use schema::*;
pub use types::*;

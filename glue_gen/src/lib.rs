//! Schema indexing, validation and TypeScript generation.
//!
//! [`build`] is the whole pipeline: take the build lock, resolve and validate
//! the schema with [`index`], generate every package into a staging area and
//! publish it into the output root only when all passes succeed.

pub mod build;
pub mod codegen;
pub mod dependency;
pub mod error;
pub mod index;
pub mod lock;
pub mod options;
pub mod sink;
pub mod wire;

pub use build::{BuildReport, build, build_into};
pub use error::{BuildError, BuildResult};
pub use index::{ResolvedSchema, ServiceKey, index};
pub use options::{ConfigError, GenOptions};

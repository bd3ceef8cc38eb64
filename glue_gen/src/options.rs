//! Generator configuration.

use crate::lock::default_lock_path;
use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config '{}': {source}", path.display())]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },

  #[error("invalid config '{}': {source}", path.display())]
  InvalidFormat {
    path: PathBuf,
    source: serde_yml::Error,
  },

  #[error("invalid config: {0}")]
  Validation(String),
}

/// Options shared by every generated package.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct GenOptions {
  /// Scope prefixed to every package name, e.g. `@dev`
  pub package_scope: String,
  pub package_version: String,
  /// Cross-process lock guarding a build
  pub lock_path: PathBuf,
}

impl Default for GenOptions {
  fn default() -> Self {
    Self {
      package_scope: "@dev".to_string(),
      package_version: "1.0.0".to_string(),
      lock_path: default_lock_path(),
    }
  }
}

impl GenOptions {
  /// Load options from a YAML file. Missing keys take their defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let options: GenOptions =
      serde_yml::from_str(&content).map_err(|source| ConfigError::InvalidFormat {
        path: path.to_path_buf(),
        source,
      })?;
    options.validate()?;
    Ok(options)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !self.package_scope.starts_with('@') || self.package_scope.contains('/') {
      return Err(ConfigError::Validation(format!(
        "package-scope '{}' must look like '@name'",
        self.package_scope
      )));
    }
    if self.package_version.trim().is_empty() {
      return Err(ConfigError::Validation(
        "package-version must not be empty".to_string(),
      ));
    }
    Ok(())
  }

  /* "@dev/core" for package "core" */
  pub fn package_name(&self, package: &str) -> String {
    format!("{}/{}", self.package_scope, package)
  }
}

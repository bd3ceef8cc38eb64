use crate::sink::{SinkError, SinkResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the default build lock inside the system temp directory.
pub const DEFAULT_LOCK_NAME: &str = "glue-codegen.lock";

pub fn default_lock_path() -> PathBuf {
  std::env::temp_dir().join(DEFAULT_LOCK_NAME)
}

/// Exclusive advisory lock held for the duration of a build. Two processes
/// using the same lock path never generate at the same time. The lock is
/// released when the guard is dropped.
#[derive(Debug)]
pub struct BuildLock {
  file: File,
  path: PathBuf,
}

impl BuildLock {
  /// Block until the lock at `path` is held.
  pub fn acquire(path: &Path) -> SinkResult<Self> {
    let lock_error = |source| SinkError::Lock {
      path: path.to_path_buf(),
      source,
    };
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(lock_error)?;
    }
    let file = OpenOptions::new()
      .create(true)
      .truncate(false)
      .write(true)
      .open(path)
      .map_err(lock_error)?;
    debug!("Waiting for build lock {}", path.display());
    file.lock_exclusive().map_err(lock_error)?;
    info!("Acquired build lock {}", path.display());
    Ok(Self {
      file,
      path: path.to_path_buf(),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Drop for BuildLock {
  fn drop(&mut self) {
    match FileExt::unlock(&self.file) {
      Ok(()) => debug!("Released build lock {}", self.path.display()),
      Err(e) => warn!("Failed to release build lock {}: {}", self.path.display(), e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_lock_is_exclusive_and_released_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locks/build.lock");

    let guard = BuildLock::acquire(&path).unwrap();
    assert_eq!(guard.path(), path.as_path());

    let other = OpenOptions::new().write(true).open(&path).unwrap();
    let contended = other.try_lock_exclusive().unwrap_err();
    assert_eq!(contended.kind(), fs2::lock_contended_error().kind());

    drop(guard);
    assert!(other.try_lock_exclusive().is_ok());
  }
}

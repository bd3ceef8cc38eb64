/* Output sinks.

   Generated files are written through `OutputSink` with paths relative to
   a root. Writes append to a lazily opened handle; the first write after a
   handle is opened truncates the file. */

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SinkError {
  #[error("output root '{}' does not exist or is not a directory", .0.display())]
  MissingRoot(PathBuf),

  #[error("path '{}' is not relative to the output root", .0.display())]
  InvalidPath(PathBuf),

  #[error("'{}' does not exist", .0.display())]
  NotFound(PathBuf),

  #[error("i/o error on '{}': {source}", path.display())]
  Io { path: PathBuf, source: io::Error },

  #[error("could not acquire build lock '{}': {source}", path.display())]
  Lock { path: PathBuf, source: io::Error },
}

pub type SinkResult<T> = Result<T, SinkError>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SinkError + '_ {
  move |source| SinkError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/* Only plain relative paths may be written */
fn check_relative(path: &Path) -> SinkResult<()> {
  let plain = path
    .components()
    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
  if path.as_os_str().is_empty() || !plain {
    return Err(SinkError::InvalidPath(path.to_path_buf()));
  }
  Ok(())
}

/// Path-keyed text writer.
pub trait OutputSink {
  /// Append UTF-8 text to `path`, opening it first if needed.
  fn write(&mut self, path: &Path, chunk: &str) -> SinkResult<()>;

  /// Finish `path` and release its handle.
  fn close(&mut self, path: &Path) -> SinkResult<()>;

  fn exists(&self, path: &Path) -> bool;

  fn read(&self, path: &Path) -> SinkResult<String>;

  /// File names directly inside `dir` ending in `suffix`, sorted.
  fn list_dir(&self, dir: &Path, suffix: &str) -> SinkResult<Vec<String>>;

  /* Write a whole file in one go */
  fn write_file(&mut self, path: &Path, contents: &str) -> SinkResult<()> {
    self.write(path, contents)?;
    self.close(path)
  }
}

/// Sink writing below a directory on disk.
#[derive(Debug)]
pub struct FsSink {
  root: PathBuf,
  handles: HashMap<PathBuf, File>,
}

impl FsSink {
  /// The root must already exist.
  pub fn new(root: &Path) -> SinkResult<Self> {
    if !root.is_dir() {
      return Err(SinkError::MissingRoot(root.to_path_buf()));
    }
    Ok(Self {
      root: root.to_path_buf(),
      handles: HashMap::new(),
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn resolve(&self, path: &Path) -> SinkResult<PathBuf> {
    check_relative(path)?;
    Ok(self.root.join(path))
  }

  pub fn close_all(&mut self) -> SinkResult<()> {
    let open: Vec<PathBuf> = self.handles.keys().cloned().collect();
    for path in open {
      self.close(&path)?;
    }
    Ok(())
  }
}

impl OutputSink for FsSink {
  fn write(&mut self, path: &Path, chunk: &str) -> SinkResult<()> {
    let full = self.resolve(path)?;
    if !self.handles.contains_key(path) {
      if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
      }
      let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&full)
        .map_err(io_error(&full))?;
      debug!("Opened {}", full.display());
      self.handles.insert(path.to_path_buf(), file);
    }
    match self.handles.get_mut(path) {
      Some(file) => file.write_all(chunk.as_bytes()).map_err(io_error(&full)),
      None => Err(SinkError::NotFound(full)),
    }
  }

  fn close(&mut self, path: &Path) -> SinkResult<()> {
    if let Some(mut file) = self.handles.remove(path) {
      let full = self.root.join(path);
      file.flush().map_err(io_error(&full))?;
    }
    Ok(())
  }

  fn exists(&self, path: &Path) -> bool {
    self.resolve(path).map(|p| p.exists()).unwrap_or(false)
  }

  fn read(&self, path: &Path) -> SinkResult<String> {
    let full = self.resolve(path)?;
    fs::read_to_string(&full).map_err(|source| match source.kind() {
      io::ErrorKind::NotFound => SinkError::NotFound(full.clone()),
      _ => SinkError::Io {
        path: full.clone(),
        source,
      },
    })
  }

  fn list_dir(&self, dir: &Path, suffix: &str) -> SinkResult<Vec<String>> {
    let full = self.root.join(dir);
    if !full.is_dir() {
      return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(&full).map_err(io_error(&full))? {
      let entry = entry.map_err(io_error(&full))?;
      let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
      if let Some(name) = entry.file_name().to_str() {
        if is_file && name.ends_with(suffix) {
          names.push(name.to_string());
        }
      }
    }
    names.sort();
    Ok(names)
  }
}

/// In-memory sink. Files present at construction behave like pre-existing
/// files in an output tree.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
  files: BTreeMap<PathBuf, String>,
  open: BTreeSet<PathBuf>,
}

impl MemorySink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_file(mut self, path: &str, contents: &str) -> Self {
    self.files.insert(PathBuf::from(path), contents.to_string());
    self
  }

  pub fn get(&self, path: &str) -> Option<&str> {
    self.files.get(Path::new(path)).map(String::as_str)
  }

  pub fn paths(&self) -> impl Iterator<Item = &Path> {
    self.files.keys().map(PathBuf::as_path)
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }
}

impl OutputSink for MemorySink {
  fn write(&mut self, path: &Path, chunk: &str) -> SinkResult<()> {
    check_relative(path)?;
    if self.open.insert(path.to_path_buf()) {
      self.files.insert(path.to_path_buf(), String::new());
    }
    self
      .files
      .entry(path.to_path_buf())
      .or_default()
      .push_str(chunk);
    Ok(())
  }

  fn close(&mut self, path: &Path) -> SinkResult<()> {
    self.open.remove(path);
    Ok(())
  }

  fn exists(&self, path: &Path) -> bool {
    self.files.contains_key(path) || self.files.keys().any(|p| p.starts_with(path))
  }

  fn read(&self, path: &Path) -> SinkResult<String> {
    self
      .files
      .get(path)
      .cloned()
      .ok_or_else(|| SinkError::NotFound(path.to_path_buf()))
  }

  fn list_dir(&self, dir: &Path, suffix: &str) -> SinkResult<Vec<String>> {
    let names = self
      .files
      .keys()
      .filter(|p| p.parent() == Some(dir))
      .filter_map(|p| p.file_name()?.to_str())
      .filter(|name| name.ends_with(suffix))
      .map(str::to_string)
      .collect();
    Ok(names)
  }
}

/// Sink that stages every write in a directory inside the output root and
/// only moves files into place on [`StagedSink::publish`]. Reads, existence
/// checks and listings see staged files layered over the published tree.
/// Dropping an unpublished sink discards the staging directory.
#[derive(Debug)]
pub struct StagedSink {
  published: FsSink,
  staging: TempDir,
  staged: FsSink,
  written: BTreeSet<PathBuf>,
}

impl StagedSink {
  pub fn new(root: &Path) -> SinkResult<Self> {
    let published = FsSink::new(root)?;
    let staging = tempfile::Builder::new()
      .prefix(".glue-staging-")
      .tempdir_in(root)
      .map_err(io_error(root))?;
    let staged = FsSink::new(staging.path())?;
    debug!("Staging output in {}", staging.path().display());
    Ok(Self {
      published,
      staging,
      staged,
      written: BTreeSet::new(),
    })
  }

  /// Move every staged file into the output root. Each file is replaced by
  /// a rename within the same filesystem, and the files it replaces are kept
  /// aside until every rename succeeded. If one rename fails, the files
  /// already published are taken back and the replaced ones restored.
  pub fn publish(mut self) -> SinkResult<Vec<PathBuf>> {
    self.staged.close_all()?;
    let root = self.published.root().to_path_buf();
    let replaced = tempfile::Builder::new()
      .prefix(".glue-replaced-")
      .tempdir_in(&root)
      .map_err(io_error(&root))?;

    let mut moves = Vec::new();
    for path in &self.written {
      match self.publish_one(&root, replaced.path(), path) {
        Ok(done) => moves.push(done),
        Err(e) => {
          warn!(
            "Publishing {} failed, rolling back {} published files",
            path.display(),
            moves.len()
          );
          roll_back(&moves);
          return Err(e);
        }
      }
    }
    info!("Published {} files to {}", self.written.len(), root.display());
    Ok(self.written.into_iter().collect())
  }

  fn publish_one(&self, root: &Path, replaced: &Path, path: &Path) -> SinkResult<Published> {
    let from = self.staging.path().join(path);
    let to = root.join(path);

    /* Outermost missing ancestor, removed again on rollback */
    let created_dir = to
      .parent()
      .into_iter()
      .flat_map(Path::ancestors)
      .take_while(|dir| !dir.exists())
      .last()
      .map(Path::to_path_buf);
    if let Some(parent) = to.parent() {
      fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let backup = if to.is_file() {
      let backup = replaced.join(path);
      if let Some(parent) = backup.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
      }
      fs::rename(&to, &backup).map_err(io_error(&to))?;
      Some(backup)
    } else {
      None
    };

    let done = Published {
      target: to,
      backup,
      created_dir,
    };
    if let Err(source) = fs::rename(&from, &done.target) {
      let error = io_error(&done.target)(source);
      roll_back(std::slice::from_ref(&done));
      return Err(error);
    }
    Ok(done)
  }
}

/* One file moved into the output root */
#[derive(Debug)]
struct Published {
  target: PathBuf,
  backup: Option<PathBuf>,
  created_dir: Option<PathBuf>,
}

/* Undo published moves, newest first. Best effort: failures are logged */
fn roll_back(moves: &[Published]) {
  for done in moves.iter().rev() {
    if done.target.is_file() {
      if let Err(e) = fs::remove_file(&done.target) {
        warn!("Rollback could not remove {}: {}", done.target.display(), e);
      }
    }
    if let Some(backup) = &done.backup {
      if let Err(e) = fs::rename(backup, &done.target) {
        warn!("Rollback could not restore {}: {}", done.target.display(), e);
      }
    }
    if let Some(dir) = &done.created_dir {
      if let Err(e) = fs::remove_dir_all(dir) {
        warn!("Rollback could not remove {}: {}", dir.display(), e);
      }
    }
  }
}

impl OutputSink for StagedSink {
  fn write(&mut self, path: &Path, chunk: &str) -> SinkResult<()> {
    self.staged.write(path, chunk)?;
    self.written.insert(path.to_path_buf());
    Ok(())
  }

  fn close(&mut self, path: &Path) -> SinkResult<()> {
    self.staged.close(path)
  }

  fn exists(&self, path: &Path) -> bool {
    self.staged.exists(path) || self.published.exists(path)
  }

  fn read(&self, path: &Path) -> SinkResult<String> {
    if self.written.contains(path) {
      self.staged.read(path)
    } else {
      self.published.read(path)
    }
  }

  fn list_dir(&self, dir: &Path, suffix: &str) -> SinkResult<Vec<String>> {
    let mut names: BTreeSet<String> = self.published.list_dir(dir, suffix)?.into_iter().collect();
    names.extend(self.staged.list_dir(dir, suffix)?);
    Ok(names.into_iter().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use assert_matches::assert_matches;

  #[test]
  fn test_fs_sink_appends_until_closed() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = FsSink::new(dir.path()).unwrap();
    let path = Path::new("pkg/nested/file.ts");

    sink.write(path, "one\n").unwrap();
    sink.write(path, "two\n").unwrap();
    sink.close(path).unwrap();
    assert_eq!(sink.read(path).unwrap(), "one\ntwo\n");

    /* Reopening truncates */
    sink.write(path, "three\n").unwrap();
    sink.close(path).unwrap();
    assert_eq!(sink.read(path).unwrap(), "three\n");
    assert!(sink.exists(Path::new("pkg/nested")));
    assert_eq!(sink.list_dir(Path::new("pkg/nested"), ".ts").unwrap(), vec!["file.ts"]);
  }

  #[test]
  fn test_fs_sink_requires_root_and_relative_paths() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent");
    assert_matches!(FsSink::new(&missing), Err(SinkError::MissingRoot(_)));

    let mut sink = FsSink::new(dir.path()).unwrap();
    assert_matches!(
      sink.write(Path::new("../escape.ts"), "x"),
      Err(SinkError::InvalidPath(_))
    );
    assert_matches!(sink.read(Path::new("nothing.ts")), Err(SinkError::NotFound(_)));
  }

  #[test]
  fn test_memory_sink_listing() {
    let mut sink = MemorySink::new().with_file("pkg/entrypoint.ts", "user");
    sink.write_file(Path::new("pkg/codegen.types.ts"), "gen").unwrap();
    sink.write_file(Path::new("pkg/package.json"), "{}").unwrap();
    sink.write_file(Path::new("pkg/sub/deep.ts"), "x").unwrap();

    assert_eq!(
      sink.list_dir(Path::new("pkg"), ".ts").unwrap(),
      vec!["codegen.types.ts", "entrypoint.ts"]
    );
    assert!(sink.exists(Path::new("pkg/sub")));
    assert_eq!(sink.get("pkg/entrypoint.ts"), Some("user"));
  }

  #[test]
  fn test_staged_sink_publishes_only_on_success() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("keep.txt"), "old").unwrap();

    {
      let mut staged = StagedSink::new(dir.path()).unwrap();
      staged.write_file(Path::new("pkg/a.ts"), "a").unwrap();
      assert!(staged.exists(Path::new("pkg/a.ts")));
      assert!(staged.exists(Path::new("keep.txt")));
      assert!(!dir.path().join("pkg/a.ts").exists());
      /* dropped without publishing */
    }
    assert!(!dir.path().join("pkg").exists());

    let mut staged = StagedSink::new(dir.path()).unwrap();
    staged.write_file(Path::new("pkg/a.ts"), "a").unwrap();
    staged.write_file(Path::new("keep.txt"), "new").unwrap();
    assert_eq!(staged.read(Path::new("keep.txt")).unwrap(), "new");
    let published = staged.publish().unwrap();
    assert_eq!(published.len(), 2);
    assert_eq!(fs::read_to_string(dir.path().join("pkg/a.ts")).unwrap(), "a");
    assert_eq!(fs::read_to_string(dir.path().join("keep.txt")).unwrap(), "new");

    let leftovers: Vec<_> = fs::read_dir(dir.path())
      .unwrap()
      .filter_map(|e| e.ok())
      .filter(|e| e.file_name().to_string_lossy().starts_with(".glue-staging-"))
      .collect();
    assert!(leftovers.is_empty());
  }

  #[test]
  fn test_failed_publish_restores_the_output_root() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("keep.txt"), "old").unwrap();
    /* A directory where a file should land makes the last rename fail */
    fs::create_dir_all(dir.path().join("z/x.ts/inner")).unwrap();

    let mut staged = StagedSink::new(dir.path()).unwrap();
    staged.write_file(Path::new("a/deep/one.ts"), "one").unwrap();
    staged.write_file(Path::new("keep.txt"), "new").unwrap();
    staged.write_file(Path::new("z/x.ts"), "x").unwrap();
    assert_matches!(staged.publish(), Err(SinkError::Io { path, .. }) if path.ends_with("z/x.ts"));

    assert_eq!(fs::read_to_string(dir.path().join("keep.txt")).unwrap(), "old");
    assert!(!dir.path().join("a").exists());
    assert!(dir.path().join("z/x.ts/inner").is_dir());

    let mut names: Vec<String> = fs::read_dir(dir.path())
      .unwrap()
      .filter_map(|e| e.ok())
      .map(|e| e.file_name().to_string_lossy().into_owned())
      .collect();
    names.sort();
    assert_eq!(names, vec!["keep.txt", "z"]);
  }
}

use crate::codegen::Generator;
use crate::error::BuildResult;
use crate::index::{ResolvedSchema, index};
use crate::lock::BuildLock;
use crate::options::GenOptions;
use crate::sink::{OutputSink, SinkError, StagedSink};
use glue_types::Schema;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
  /// Published paths, relative to the output root
  pub files: Vec<PathBuf>,
  pub namespaces: usize,
  pub elapsed: Duration,
}

/// Build `schema` into `output_root`.
///
/// The build lock is held from before validation until return. Files are
/// staged and only moved into `output_root` once every pass succeeded, so a
/// failed build leaves the output tree as it was.
pub fn build(schema: &Schema, output_root: &Path, options: &GenOptions) -> BuildResult<BuildReport> {
  let started = Instant::now();
  if !output_root.is_dir() {
    return Err(SinkError::MissingRoot(output_root.to_path_buf()).into());
  }

  let _lock = BuildLock::acquire(&options.lock_path)?;
  let resolved = index(schema)?;

  let mut staged = StagedSink::new(output_root)?;
  Generator::new(&resolved, options, &mut staged).run()?;
  let files = staged.publish()?;

  let report = BuildReport {
    files,
    namespaces: resolved.schema().namespaces.len(),
    elapsed: started.elapsed(),
  };
  info!(
    "Built {} namespaces into {} ({} files) in {:?}",
    report.namespaces,
    output_root.display(),
    report.files.len(),
    report.elapsed
  );
  Ok(report)
}

/// Generate an already resolved schema into any sink, without locking or
/// staging. Returns the paths written.
pub fn build_into(
  resolved: &ResolvedSchema,
  sink: &mut dyn OutputSink,
  options: &GenOptions,
) -> BuildResult<Vec<PathBuf>> {
  Generator::new(resolved, options, sink).run()
}

use super::emitter::Emitter;
use super::{ENTRYPOINT_FILE, INDEX_FILE};
use crate::error::BuildResult;
use crate::sink::OutputSink;
use std::path::{Path, PathBuf};
use tracing::warn;

/* Module stems that can appear in an `export * from` specifier */
fn is_module_stem(stem: &str) -> bool {
  !stem.is_empty()
    && stem
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Regenerate `index.ts` of a package from the `.ts` files present in it,
/// generated or hand-written. The entrypoint is re-exported as `start`.
pub fn write_index(sink: &mut dyn OutputSink, package: &str) -> BuildResult<PathBuf> {
  let dir = Path::new(package);
  let files = sink.list_dir(dir, ".ts")?;
  let mut e = Emitter::source(dir.join(INDEX_FILE));
  let mut exported = 0;
  let mut entrypoint = false;

  for file in &files {
    if file == INDEX_FILE || file.ends_with(".d.ts") {
      continue;
    }
    if file == ENTRYPOINT_FILE {
      entrypoint = true;
      continue;
    }
    let Some(stem) = file.strip_suffix(".ts") else {
      continue;
    };
    if !is_module_stem(stem) {
      warn!("Not exporting '{}/{}': unusable module name", package, file);
      continue;
    }
    e.line(format!("export * from \"./{}.js\"", stem));
    exported += 1;
  }
  if entrypoint {
    e.line("export { default as start } from \"./entrypoint.js\"");
    exported += 1;
  }
  if exported == 0 {
    e.line("export {}");
  }
  Ok(e.finish(sink)?)
}

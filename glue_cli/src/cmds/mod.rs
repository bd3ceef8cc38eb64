pub mod build;
pub mod check;
pub mod graph;

use anyhow::Context;
use glue_gen::ResolvedSchema;
use std::path::PathBuf;

/* Load the documents and resolve them; shared by every subcommand */
pub fn load_and_index(files: &[PathBuf]) -> anyhow::Result<ResolvedSchema> {
    let schema = glue_loader::load_files(files).context("failed to load schema documents")?;
    let resolved = glue_gen::index(&schema).context("schema is invalid")?;
    Ok(resolved)
}

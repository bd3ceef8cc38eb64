/* Build command - validate the schema and generate every package */

use anyhow::Context;
use glue_gen::GenOptions;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/* Options file picked up from the working directory when --config is absent */
pub const DEFAULT_CONFIG: &str = "glue.yaml";

/* Options from the config file, then overridden by flags and environment */
pub fn resolve_options(
    config: Option<PathBuf>,
    package_scope: Option<String>,
    lock_path: Option<PathBuf>,
) -> anyhow::Result<GenOptions> {
    let config = config.or_else(|| {
        let fallback = PathBuf::from(DEFAULT_CONFIG);
        fallback.is_file().then_some(fallback)
    });
    let mut options = match &config {
        Some(path) => {
            info!("Using options from {}", path.display());
            GenOptions::load(path)?
        }
        None => GenOptions::default(),
    };
    if let Some(scope) = package_scope {
        options.package_scope = scope;
    }
    if let Some(lock_path) = lock_path {
        options.lock_path = lock_path;
    }
    options.validate()?;
    debug!("Generator options: {:?}", options);
    Ok(options)
}

/* Execute the build command */
pub fn run(files: &[PathBuf], output_dir: &Path, options: &GenOptions) -> anyhow::Result<()> {
    let schema = glue_loader::load_files(files).context("failed to load schema documents")?;

    if !output_dir.exists() {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("cannot create output directory '{}'", output_dir.display()))?;
        debug!("Created output directory {}", output_dir.display());
    }

    let report = glue_gen::build(&schema, output_dir, options).context("build failed")?;
    println!(
        "Generated {} files for {} namespaces into {} ({:.2?})",
        report.files.len(),
        report.namespaces,
        output_dir.display(),
        report.elapsed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("glue.yaml");
        fs::write(&config, "package-scope: \"@acme\"\npackage-version: 2.0.0\n").unwrap();

        let options = resolve_options(Some(config.clone()), None, None).unwrap();
        assert_eq!(options.package_scope, "@acme");
        assert_eq!(options.package_version, "2.0.0");

        let lock = dir.path().join("build.lock");
        let options = resolve_options(Some(config), Some("@other".to_string()), Some(lock.clone())).unwrap();
        assert_eq!(options.package_scope, "@other");
        assert_eq!(options.lock_path, lock);
    }

    #[test]
    fn test_invalid_scope_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("glue.yaml");
        fs::write(&config, "package-scope: \"@acme\"\n").unwrap();
        assert!(resolve_options(Some(config), Some("acme".to_string()), None).is_err());
    }

    #[test]
    fn test_run_generates_into_new_directory() {
        let docs = tempfile::tempdir().unwrap();
        let schema = docs.path().join("schema.yaml");
        fs::write(
            &schema,
            "include-prelude: true\nnamespaces:\n  - { id: 30001, name: host, layer: svc, types: [{ record: config, id: 0 }] }\n",
        )
        .unwrap();

        let out = tempfile::tempdir().unwrap();
        let output_dir = out.path().join("generated");
        let options = GenOptions {
            lock_path: docs.path().join("build.lock"),
            ..GenOptions::default()
        };
        run(&[schema], &output_dir, &options).unwrap();
        assert!(output_dir.join("svc-host/codegen.types.ts").is_file());
        assert!(output_dir.join("core/index.ts").is_file());
    }
}

/* Package scaffolding: `package.json` and `tsconfig.json`.

   Descriptors are merged into whatever the user already has: identity,
   scripts and dependencies are always regenerated, a few layout defaults are
   only filled in when missing, and every other key is left alone. */

use crate::error::{BuildError, BuildResult};
use crate::options::GenOptions;
use crate::sink::OutputSink;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DESCRIPTOR_FILE: &str = "package.json";
pub const TSCONFIG_FILE: &str = "tsconfig.json";

/* Filled in only when the user has not set them */
const LAYOUT_DEFAULTS: [(&str, &str); 3] = [
  ("type", "module"),
  ("main", "dist/index.js"),
  ("types", "dist/index.d.ts"),
];

/// Generated descriptor fields of `package`, depending on the unscoped
/// package names in `dependencies`.
pub fn descriptor(options: &GenOptions, package: &str, dependencies: &BTreeSet<String>) -> Map<String, Value> {
  let dependencies: Map<String, Value> = dependencies
    .iter()
    .map(|dep| (options.package_name(dep), Value::from(options.package_version.clone())))
    .collect();
  let mut fields = Map::new();
  fields.insert("name".to_string(), Value::from(options.package_name(package)));
  fields.insert("version".to_string(), Value::from(options.package_version.clone()));
  fields.insert(
    "scripts".to_string(),
    json!({
      "build": "tsc -p tsconfig.json",
      "clean": "rm -rf dist",
    }),
  );
  fields.insert("dependencies".to_string(), Value::Object(dependencies));
  fields
}

/// Merge generated fields over an existing descriptor text.
pub fn merge_descriptor(path: &Path, existing: Option<&str>, generated: Map<String, Value>) -> BuildResult<String> {
  let mut merged = match existing {
    Some(text) => serde_json::from_str::<Map<String, Value>>(text).map_err(|source| {
      BuildError::InvalidDescriptor {
        path: path.display().to_string(),
        source,
      }
    })?,
    None => Map::new(),
  };
  for (key, value) in generated {
    merged.insert(key, value);
  }
  for (key, value) in LAYOUT_DEFAULTS {
    merged.entry(key).or_insert_with(|| Value::from(value));
  }
  let mut text = serde_json::to_string_pretty(&Value::Object(merged))
    .map_err(|e| BuildError::Internal(format!("cannot serialize descriptor: {}", e)))?;
  text.push('\n');
  Ok(text)
}

pub fn write_descriptor(
  sink: &mut dyn OutputSink,
  options: &GenOptions,
  package: &str,
  dependencies: &BTreeSet<String>,
) -> BuildResult<PathBuf> {
  let path = Path::new(package).join(DESCRIPTOR_FILE);
  let existing = if sink.exists(&path) {
    Some(sink.read(&path)?)
  } else {
    None
  };
  let text = merge_descriptor(&path, existing.as_deref(), descriptor(options, package, dependencies))?;
  sink.write_file(&path, &text)?;
  debug!("Wrote {}", path.display());
  Ok(path)
}

pub fn write_tsconfig(sink: &mut dyn OutputSink, package: &str) -> BuildResult<PathBuf> {
  let path = Path::new(package).join(TSCONFIG_FILE);
  let config = json!({
    "compilerOptions": {
      "target": "ES2022",
      "module": "NodeNext",
      "moduleResolution": "NodeNext",
      "declaration": true,
      "strict": true,
      "skipLibCheck": true,
      "rootDir": ".",
      "outDir": "dist",
    },
    "include": ["*.ts"],
  });
  let mut text = serde_json::to_string_pretty(&config)
    .map_err(|e| BuildError::Internal(format!("cannot serialize tsconfig: {}", e)))?;
  text.push('\n');
  sink.write_file(&path, &text)?;
  Ok(path)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sink::MemorySink;
  use assert_matches::assert_matches;

  fn deps(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
  }

  #[test]
  fn test_merge_preserves_user_fields() {
    let existing = r#"{
      "name": "stale",
      "description": "hand written",
      "version": "0.0.1",
      "main": "lib/custom.js",
      "dependencies": { "left-pad": "1.0.0" }
    }"#;
    let options = GenOptions::default();
    let text = merge_descriptor(
      Path::new("svc-host/package.json"),
      Some(existing),
      descriptor(&options, "svc-host", &deps(&["core", "svc"])),
    )
    .unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(value["name"], "@dev/svc-host");
    assert_eq!(value["version"], "1.0.0");
    assert_eq!(value["description"], "hand written");
    /* User layout wins over defaults, missing defaults are added */
    assert_eq!(value["main"], "lib/custom.js");
    assert_eq!(value["type"], "module");
    /* Dependencies are recomputed, not merged */
    assert_eq!(value["dependencies"], json!({ "@dev/core": "1.0.0", "@dev/svc": "1.0.0" }));
    assert_eq!(value["scripts"]["build"], "tsc -p tsconfig.json");

    /* Existing keys keep their position */
    let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(&keys[..3], &["name", "description", "version"]);
  }

  #[test]
  fn test_malformed_descriptor_is_rejected() {
    let options = GenOptions::default();
    let result = merge_descriptor(
      Path::new("core/package.json"),
      Some("[1, 2]"),
      descriptor(&options, "core", &BTreeSet::new()),
    );
    assert_matches!(result, Err(BuildError::InvalidDescriptor { path, .. }) if path == "core/package.json");
  }

  #[test]
  fn test_write_descriptor_through_sink() {
    let mut sink = MemorySink::new().with_file("core/package.json", "{\"private\": true}");
    let options = GenOptions::default();
    write_descriptor(&mut sink, &options, "core", &BTreeSet::new()).unwrap();
    write_tsconfig(&mut sink, "core").unwrap();

    let value: Value = serde_json::from_str(sink.get("core/package.json").unwrap()).unwrap();
    assert_eq!(value["private"], true);
    assert_eq!(value["name"], "@dev/core");
    let tsconfig: Value = serde_json::from_str(sink.get("core/tsconfig.json").unwrap()).unwrap();
    assert_eq!(tsconfig["compilerOptions"]["strict"], true);
  }
}

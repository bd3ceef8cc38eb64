use assert_matches::assert_matches;
use glue_loader::glue_types::{prelude, Layer, Schema, Type};
use glue_loader::{load_files, LoadError, SchemaLoader};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/* The same schema as platform.yaml + deploy.yaml, built in code */
fn expected() -> Schema {
    prelude::standard()
        .unwrap()
        .namespace(20010, "store", Layer::Infra, |ns| {
            ns.record(0, "account", |r| {
                r.field(0, "id", Type::id_of("account"))?
                    .field(1, "region", Type::Str)?
                    .field(2, "level", Type::named("core/logLevel"))?
                    .field(3, "tags", Type::array(Type::Str))?
                    .profile(1, &[1])?
                    .db(|db| db.primary(0)?.shard(1)?.index(&[1, 2]))
            })
        })
        .unwrap()
        .namespace(30001, "host", Layer::Svc, |ns| {
            ns.record(0, "config", |r| r.field(0, "port", Type::Int32))?
                .variant(1, "health", |v| {
                    v.value(0, "unknown")?.value_with(1, "degraded", Type::Str)
                })?
                .service(0, "api", Type::named("config"), |s| {
                    s.method(
                        0,
                        "lookup",
                        Type::id_of("store/account"),
                        Type::named("store/account"),
                    )?
                    .method(1, "health", Type::Empty, Type::named("health"))
                })
        })
        .unwrap()
        .reopen("deploy", |ns| ns.service_group(0, "edge", &["host/api"]))
        .unwrap()
        .reopen("host", |ns| ns.record(2, "status", |r| r.field(0, "up", Type::Bool)))
        .unwrap()
        .build()
}

#[test]
fn load_matches_builder() {
    let schema = load_files(&[fixture("platform.yaml"), fixture("deploy.yaml")])
        .expect("fixtures should load");
    assert_eq!(schema, expected());
}

#[test]
fn file_listed_twice_is_read_once() {
    let once = load_files(&[fixture("platform.yaml")]).unwrap();
    let twice = load_files(&[fixture("platform.yaml"), fixture("platform.yaml")]).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn order_matters_for_additions() {
    /* deploy.yaml adds to namespaces that only platform.yaml declares */
    let err = load_files(&[fixture("deploy.yaml"), fixture("platform.yaml")]).unwrap_err();
    assert_matches!(err, LoadError::Incomplete { namespace, .. } if namespace == "deploy");
}

#[test]
fn conflicting_layer_names_the_file() {
    let err = load_files(&[fixture("platform.yaml"), fixture("conflict.yaml")]).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("conflict.yaml"), "{}", message);
    assert_matches!(
        err,
        LoadError::ConflictingLayer {
            declared: Layer::Svc,
            found: Layer::Biz,
            ..
        }
    );
}

#[test]
fn malformed_document_is_a_parse_error() {
    let err = load_files(&[fixture("malformed.yaml")]).unwrap_err();
    assert_matches!(err, LoadError::Parse { path, .. } if path.ends_with("malformed.yaml"));
}

#[test]
fn missing_file_is_a_read_error() {
    let err = load_files(&[fixture("absent.yaml")]).unwrap_err();
    assert_matches!(err, LoadError::Read { .. });
}

#[test]
fn documents_can_come_from_a_temp_dir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.yaml");
    std::fs::write(
        &path,
        "namespaces:\n  - { id: 64, name: core, layer: core, types: [{ variant: level, id: 0, values: [{ ordinal: 0, name: low }] }] }\n",
    )
    .unwrap();

    let mut loader = SchemaLoader::new();
    loader.add_file(&path).unwrap();
    let schema = loader.load().unwrap();
    assert_eq!(schema.namespaces.len(), 1);
    assert!(schema.namespace(64).unwrap().type_by_name("level").is_some());
}

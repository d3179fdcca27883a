//! Tests for CLI configuration and batch loading.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use serde_json::json;
use std::path::Path;
use tessera::cli::{load_config, open_store, parse_batch, parse_config, parse_sources};
use tessera_core::TesseraError;

const TOML_CONFIG: &str = r#"
[backends.default]
type = "memory"

[manifests.default]
backend = "default"

[manifests.default.models.report]
properties = { status = { type = "string", required = true }, count = { type = "integer" } }
"#;

// =============================================================================
// CONFIGURATION TESTS
// =============================================================================

#[test]
fn test_toml_config_by_extension() {
    let raw = parse_config(TOML_CONFIG, Path::new("tessera.toml")).unwrap();
    assert_eq!(raw["backends"]["default"]["type"], json!("memory"));
    assert_eq!(
        raw["manifests"]["default"]["models"]["report"]["properties"]["status"]["required"],
        json!(true)
    );
}

#[test]
fn test_json_config_by_default() {
    let raw = parse_config(
        r#"{"backends": {"default": {"type": "memory"}}}"#,
        Path::new("tessera.json"),
    )
    .unwrap();
    assert_eq!(raw["backends"]["default"]["type"], json!("memory"));
}

#[test]
fn test_config_must_be_mapping() {
    let err = parse_config("[1, 2]", Path::new("tessera.json")).unwrap_err();
    assert!(matches!(err, TesseraError::Config(_)));
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = parse_config("backends = [", Path::new("tessera.toml")).unwrap_err();
    assert!(matches!(err, TesseraError::Config(_)));
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, TesseraError::IoError(_)));
}

#[test]
fn test_open_store_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tessera.toml");
    std::fs::write(&path, TOML_CONFIG).unwrap();

    let store = open_store(&path).unwrap();
    assert!(store.is_configured());
    assert!(store.model("default", "report").is_ok());
}

#[test]
fn test_open_store_with_redb_backend() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("tessera.redb");
    let config = dir.path().join("tessera.json");
    std::fs::write(
        &config,
        json!({
            "backends": { "default": { "type": "redb", "path": db } },
            "manifests": { "default": { "models": { "report": {} } } },
        })
        .to_string(),
    )
    .unwrap();

    let store = open_store(&config).unwrap();
    store.migrate(false).unwrap();
    let results = store
        .push(
            &parse_batch(r#"[{"type": "report"}]"#).unwrap(),
            "default",
            "default",
        )
        .unwrap();
    assert_eq!(results[0]["id"], json!("1"));
}

// =============================================================================
// BATCH TESTS
// =============================================================================

#[test]
fn test_batch_as_json_array() {
    let records = parse_batch(r#"[{"type": "report"}, {"type": "report", "status": "ok"}]"#)
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["status"], json!("ok"));
}

#[test]
fn test_batch_as_json_lines() {
    let records = parse_batch(
        "{\"type\": \"report\", \"<id>\": \"r1\"}\n\n{\"type\": \"report\"}\n",
    )
    .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["<id>"], json!("r1"));
}

#[test]
fn test_batch_entries_must_be_mappings() {
    let err = parse_batch("[1]").unwrap_err();
    assert!(matches!(err, TesseraError::SerializationError(_)));
}

#[test]
fn test_batch_with_invalid_json() {
    let err = parse_batch("{not json}").unwrap_err();
    assert!(matches!(err, TesseraError::SerializationError(_)));
}

// =============================================================================
// PULL TESTS
// =============================================================================

const DATASET_CONFIG: &str = r#"
[backends.default]
type = "memory"

[manifests.default.datasets.gov.objects.country]
source = "countries"
properties = { id = { source = "code" }, title = { source = "name", type = "string" } }
"#;

#[test]
fn test_sources_must_be_mapping() {
    let err = parse_sources("[]").unwrap_err();
    assert!(matches!(err, TesseraError::SerializationError(_)));
}

#[test]
fn test_pull_from_toml_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tessera.toml");
    std::fs::write(&path, DATASET_CONFIG).unwrap();

    let store = open_store(&path).unwrap();
    store.migrate(false).unwrap();
    let sources =
        parse_sources(r#"{"countries": [{"code": "lt", "name": "Lithuania"}]}"#).unwrap();
    let records = store.pull("gov", &sources, &[], "default").unwrap();
    let results = store.push(&records, "default", "default").unwrap();
    assert_eq!(results[0]["<id>"], json!("lt"));
    assert_eq!(results[0]["type"], json!("country/:source/gov"));
    assert_eq!(results[0]["title"], json!("Lithuania"));
}

//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tessera_core::primitives::MAX_BATCH_LENGTH;
use tessera_core::{Record, Store, TesseraError};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum configuration file size (10 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum batch file size (100 MB).
///
/// This prevents memory exhaustion from malicious or accidental large files.
const MAX_BATCH_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TesseraError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TesseraError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TesseraError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and make sure it names a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, TesseraError> {
    let canonical = path.canonicalize().map_err(|e| {
        TesseraError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TesseraError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

fn read_input(path: &Path, max_size: u64) -> Result<String, TesseraError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, max_size)?;
    std::fs::read_to_string(&validated)
        .map_err(|e| TesseraError::IoError(format!("Read file: {}", e)))
}

// =============================================================================
// INPUT PARSING
// =============================================================================

/// Parse configuration text. `.toml` files are TOML, anything else JSON.
pub fn parse_config(text: &str, path: &Path) -> Result<Record, TesseraError> {
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let value: Value = if is_toml {
        toml::from_str(text)
            .map_err(|e| TesseraError::Config(format!("{}: {}", path.display(), e)))?
    } else {
        serde_json::from_str(text)?
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(TesseraError::Config(format!(
            "{}: configuration must be a mapping",
            path.display()
        ))),
    }
}

/// Read and parse a configuration file.
pub fn load_config(path: &Path) -> Result<Record, TesseraError> {
    let text = read_input(path, MAX_CONFIG_FILE_SIZE)?;
    parse_config(&text, path)
}

/// A store over the built-in roots, configured from `path`.
pub fn open_store(path: &Path) -> Result<Store, TesseraError> {
    let raw = load_config(path)?;
    let mut store = Store::with_builtins()?;
    store.configure(&raw)?;
    Ok(store)
}

/// Parse a batch: a JSON array of records, or one record per line.
pub fn parse_batch(text: &str) -> Result<Vec<Record>, TesseraError> {
    let values: Vec<Value> = if text.trim_start().starts_with('[') {
        serde_json::from_str(text)?
    } else {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?
    };

    if values.len() > MAX_BATCH_LENGTH {
        return Err(TesseraError::BatchTooLarge {
            len: values.len(),
            max: MAX_BATCH_LENGTH,
        });
    }

    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::Object(record) => Ok(record),
            _ => Err(TesseraError::SerializationError(format!(
                "Batch entry #{} is not a mapping",
                index
            ))),
        })
        .collect()
}

fn print_json(value: &Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// REGISTRY COMMANDS
// =============================================================================

/// List registered schema types.
pub fn cmd_types(json_mode: bool) -> Result<(), TesseraError> {
    let store = Store::with_builtins()?;

    if json_mode {
        let types: Vec<Value> = store
            .types()
            .iter()
            .map(|t| {
                json!({
                    "name": t.name(),
                    "ancestors": t.ancestors(),
                    "fields": t.fields().iter().map(|f| f.name).collect::<Vec<_>>(),
                })
            })
            .collect();
        print_json(&Value::Array(types));
        return Ok(());
    }

    println!("Registered Types");
    println!("================");
    println!(
        "Roots: {}",
        store.discovery().root_names().collect::<Vec<_>>().join(", ")
    );
    for t in store.types().iter() {
        if t.ancestors().is_empty() {
            println!("{}", t.name());
        } else {
            println!("{} ({})", t.name(), t.ancestors().join(" -> "));
        }
    }
    Ok(())
}

/// List the dispatch table.
pub fn cmd_commands(json_mode: bool) -> Result<(), TesseraError> {
    let store = Store::with_builtins()?;

    if json_mode {
        let commands: Vec<Value> = store
            .commands()
            .iter()
            .map(|((operation, type_name, backend), handler)| {
                json!({
                    "operation": operation,
                    "type": type_name,
                    "backend": backend,
                    "handler": handler,
                })
            })
            .collect();
        print_json(&Value::Array(commands));
        return Ok(());
    }

    println!("Registered Commands");
    println!("===================");
    for ((operation, type_name, backend), handler) in store.commands().iter() {
        println!(
            "{:<26} {:<10} {:<8} {}",
            operation,
            type_name.unwrap_or("-"),
            backend.unwrap_or("-"),
            handler
        );
    }
    Ok(())
}

// =============================================================================
// LIFECYCLE COMMANDS
// =============================================================================

/// Load the configuration; `configure` checks every manifest.
pub fn cmd_check(config: &Path, json_mode: bool) -> Result<(), TesseraError> {
    let store = open_store(config)?;

    let namespaces: Vec<(String, Vec<String>)> = store
        .namespaces()
        .map(|ns| {
            let models = store.models(ns).map(|m| m.name().to_string()).collect();
            (ns.to_string(), models)
        })
        .collect();

    if json_mode {
        let namespaces: serde_json::Map<String, Value> = namespaces
            .into_iter()
            .map(|(ns, models)| (ns, json!(models)))
            .collect();
        print_json(&json!({
            "status": "ok",
            "backends": store.backend_names().collect::<Vec<_>>(),
            "namespaces": namespaces,
        }));
        return Ok(());
    }

    println!("Configuration OK: {}", config.display());
    println!(
        "Backends:   {}",
        store.backend_names().collect::<Vec<_>>().join(", ")
    );
    for (ns, models) in namespaces {
        println!("Namespace {:?}: {}", ns, models.join(", "));
    }
    Ok(())
}

/// Validate backend constraints of every model.
pub fn cmd_prepare(config: &Path, internal: bool) -> Result<(), TesseraError> {
    let store = open_store(config)?;
    store.prepare(internal)?;
    println!("Prepared{}", if internal { " (internal)" } else { "" });
    Ok(())
}

/// Create backend storage for every model.
pub fn cmd_migrate(config: &Path, internal: bool) -> Result<(), TesseraError> {
    let store = open_store(config)?;
    store.migrate(internal)?;
    println!("Migrated{}", if internal { " (internal)" } else { "" });
    Ok(())
}

// =============================================================================
// DATA COMMANDS
// =============================================================================

/// Push a batch file in one transaction.
pub fn cmd_push(
    config: &Path,
    json_mode: bool,
    file: &Path,
    backend: &str,
    namespace: &str,
) -> Result<(), TesseraError> {
    tracing::info!("Pushing from {:?} to backend {}", file, backend);

    let store = open_store(config)?;
    let text = read_input(file, MAX_BATCH_FILE_SIZE)?;
    let records = parse_batch(&text)?;
    let results = store.push(&records, backend, namespace)?;

    if json_mode {
        print_json(&Value::Array(results.into_iter().map(Value::Object).collect()));
        return Ok(());
    }

    println!("Pushed {} records", results.len());
    for result in &results {
        println!("{}", Value::Object(result.clone()));
    }
    Ok(())
}

/// Parse pull sources: a JSON mapping of source name to a list of rows.
pub fn parse_sources(text: &str) -> Result<Record, TesseraError> {
    match serde_json::from_str(text)? {
        Value::Object(sources) => Ok(sources),
        _ => Err(TesseraError::SerializationError(
            "Sources must be a mapping of source name to rows".to_string(),
        )),
    }
}

/// Arguments of `pull`.
#[derive(Debug)]
pub struct PullArgs<'a> {
    pub dataset: &'a str,
    pub file: &'a Path,
    pub models: &'a [String],
    pub push: bool,
    pub backend: &'a str,
    pub namespace: &'a str,
}

/// Pull a dataset from local sources and print or push the records.
pub fn cmd_pull(config: &Path, json_mode: bool, args: &PullArgs<'_>) -> Result<(), TesseraError> {
    tracing::info!("Pulling dataset {} from {:?}", args.dataset, args.file);

    let store = open_store(config)?;
    let text = read_input(args.file, MAX_BATCH_FILE_SIZE)?;
    let sources = parse_sources(&text)?;
    let mut records = store.pull(args.dataset, &sources, args.models, args.namespace)?;
    if args.push {
        records = store.push(&records, args.backend, args.namespace)?;
    }

    if json_mode {
        print_json(&Value::Array(records.into_iter().map(Value::Object).collect()));
        return Ok(());
    }

    println!(
        "{} {} records",
        if args.push { "Pushed" } else { "Pulled" },
        records.len()
    );
    for record in records {
        println!("{}", Value::Object(record));
    }
    Ok(())
}

/// Read records of a model, or one record by id.
pub fn cmd_get(
    config: &Path,
    json_mode: bool,
    model: &str,
    id: Option<&str>,
    backend: &str,
    namespace: &str,
) -> Result<(), TesseraError> {
    let store = open_store(config)?;

    let records = match id {
        Some(id) => store
            .getone(model, id, backend, namespace)?
            .into_iter()
            .collect(),
        None => store.getall(model, backend, namespace)?,
    };

    if json_mode {
        print_json(&Value::Array(records.into_iter().map(Value::Object).collect()));
        return Ok(());
    }

    if records.is_empty() {
        println!("No records");
    }
    for record in records {
        println!("{}", Value::Object(record));
    }
    Ok(())
}

/// Print every loaded object.
pub fn cmd_serialize(config: &Path) -> Result<(), TesseraError> {
    let store = open_store(config)?;
    print_json(&store.serialize()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn oversized_files_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"[]").expect("write");
        assert!(validate_file_size(file.path(), 1).is_err());
        assert!(validate_file_size(file.path(), 2).is_ok());
    }

    #[test]
    fn directories_are_not_input_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(matches!(
            validate_file_path(dir.path()),
            Err(TesseraError::IoError(_))
        ));
    }
}

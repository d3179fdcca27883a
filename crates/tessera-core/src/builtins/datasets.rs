//! Dataset handlers: manifest checks and pulls from local source data.

use crate::dataset::DatasetObject;
use crate::dispatch::{Command, Invocation};
use crate::primitives::{CORRELATION_KEY, ID_KEY};
use crate::store::Store;
use crate::types::{Output, Record, TesseraError};
use serde_json::{Map, Value};

/// Dependency models must exist and expose the named properties.
pub(super) struct DatasetCheck;

impl Command for DatasetCheck {
    fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
        let store = inv.store();
        let namespace = inv.namespace();
        let dataset = store.dataset(namespace, inv.target().name().unwrap_or_default())?;

        for object in dataset.objects() {
            let Some(model) = object.dependency_model() else {
                continue;
            };
            let Ok(model) = store.model(namespace, model) else {
                return Err(inv.fail(format!(
                    "Object {:?} depends on unknown model {model:?}",
                    object.name()
                )));
            };
            for dependency in object.dependencies() {
                if dependency.property != ID_KEY
                    && model.property(&dependency.property).is_none()
                {
                    return Err(inv.fail(format!(
                        "Object {:?} depends on unknown property {:?} of model {:?}",
                        object.name(),
                        dependency.property,
                        model.name()
                    )));
                }
            }
        }
        Ok(None)
    }
}

/// Maps source rows of every sourced object to push records.
///
/// Arguments: `sources`, a mapping of source name to a list of rows, and
/// `models`, an optional list of object names to restrict the pull to.
/// Objects are pulled in declaration order; within one object a later row
/// with the same key replaces the earlier one.
pub(super) struct DatasetPull;

impl Command for DatasetPull {
    fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
        let store = inv.store();
        let namespace = inv.namespace();
        let dataset = store.dataset(namespace, inv.target().name().unwrap_or_default())?;

        let Some(sources) = inv.param("sources").and_then(Value::as_object) else {
            return Err(inv.fail(format!(
                "Pull of dataset {:?} needs a mapping of sources",
                dataset.name()
            )));
        };
        let only: Vec<&str> = inv
            .param("models")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut records = Vec::new();
        for object in dataset.objects() {
            if object.sources().is_empty() {
                continue;
            }
            if !only.is_empty() && !only.contains(&object.name()) {
                continue;
            }
            let pulled = pull_object(store, namespace, object, sources).map_err(|e| {
                TesseraError::Contextual {
                    context: format!(
                        "  in model {:?}\n  in dataset {:?}",
                        object.model(),
                        dataset.name()
                    ),
                    source: Box::new(e),
                }
            })?;
            tracing::debug!(model = object.model(), rows = pulled.len(), "object pulled");
            records.extend(pulled.into_iter().map(|(_, record)| record));
        }

        tracing::info!(dataset = dataset.name(), count = records.len(), "dataset pulled");
        Ok(Some(Output::Value(Value::Array(records))))
    }
}

fn pull_object(
    store: &Store,
    namespace: &str,
    object: &DatasetObject,
    sources: &Map<String, Value>,
) -> Result<Map<String, Value>, TesseraError> {
    let mut records = Map::new();
    for dependency in dependency_rows(store, namespace, object)? {
        for source in object.sources() {
            let rows = match sources.get(source) {
                Some(Value::Array(rows)) => rows,
                Some(_) => {
                    return Err(TesseraError::Handler(format!(
                        "Source {source:?} must be a list of rows"
                    )));
                }
                None => {
                    return Err(TesseraError::Handler(format!("Source {source:?} is missing")));
                }
            };
            for (index, row) in rows.iter().enumerate() {
                let Value::Object(row) = row else {
                    return Err(TesseraError::Handler(format!(
                        "Row #{index} of source {source:?} is not a mapping"
                    )));
                };
                let Some(record) = object.map_row(row, &dependency) else {
                    continue;
                };
                let key = record
                    .get(CORRELATION_KEY)
                    .map(Value::to_string)
                    .unwrap_or_default();
                records.insert(key, Value::Object(record));
            }
        }
    }
    Ok(records)
}

/// One mapping of alias to value per stored row of the dependency model,
/// or a single empty mapping when the object has no dependencies.
fn dependency_rows(
    store: &Store,
    namespace: &str,
    object: &DatasetObject,
) -> Result<Vec<Record>, TesseraError> {
    let Some(model_name) = object.dependency_model() else {
        return Ok(vec![Record::new()]);
    };
    let model = store.model(namespace, model_name)?;
    let rows = store.getall(model.name(), model.backend(), namespace)?;
    Ok(rows
        .iter()
        .map(|row| {
            object
                .dependencies()
                .iter()
                .map(|dep| {
                    let value = row.get(&dep.property).cloned().unwrap_or(Value::Null);
                    (dep.alias.clone(), value)
                })
                .collect()
        })
        .collect())
}

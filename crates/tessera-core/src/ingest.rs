//! # Batch Reference Resolution
//!
//! A record of a push batch may carry a correlation label under `<id>`.
//! Later records of the same batch point at it with a two-key placeholder:
//!
//! ```json
//! {"type": "report", "<id>": "r1", "status": "ok"}
//! {"type": "comment", "report": {"type": "report", "<id>": "r1"}}
//! ```
//!
//! Once the first record is stored, the placeholder in the second one is
//! replaced by the id the backend assigned. Only labels registered earlier
//! in the batch resolve.

use crate::model::Model;
use crate::primitives::{CORRELATION_KEY, ID_KEY, TYPE_KEY};
use crate::types::{Record, TesseraError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A correlation label. Numbers and strings never match each other, so
/// `1` and `"1"` are distinct labels.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Label {
    Text(String),
    /// Canonical JSON text of the number.
    Number(String),
}

impl Label {
    /// Read a label from a JSON value. Only strings and numbers qualify.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self::Text(text.clone())),
            Value::Number(n) => Some(Self::Number(n.to_string())),
            _ => None,
        }
    }

    /// The label as it appeared in the input.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Number(text) => text
                .parse::<serde_json::Number>()
                .map_or_else(|_| Value::String(text.clone()), Value::Number),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) | Self::Number(text) => f.write_str(text),
        }
    }
}

impl From<&str> for Label {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Batch-scoped map `(type, label) -> assigned id`.
#[derive(Debug, Default)]
pub struct ClientSuppliedIds {
    ids: BTreeMap<(String, Label), String>,
}

impl ClientSuppliedIds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the record's own label and substitute its placeholders.
    ///
    /// Only top-level values are inspected. Nothing is written, so a failure
    /// here happens before any backend call for the record.
    pub fn replace(&self, model: &Model, data: &mut Record) -> Result<Option<Label>, TesseraError> {
        let client_id = match data.shift_remove(CORRELATION_KEY) {
            None => None,
            Some(value) => match Label::from_value(&value) {
                Some(label) => Some(label),
                None => {
                    return Err(TesseraError::MalformedReference {
                        model: model.name().to_string(),
                        field: CORRELATION_KEY.to_string(),
                        value: value.to_string(),
                    });
                }
            },
        };

        if let Some(label) = &client_id {
            if self.contains(model.name(), label) {
                return Err(TesseraError::DuplicateReference {
                    type_name: model.name().to_string(),
                    correlation_id: label.to_string(),
                });
            }
        }

        for (field, value) in data.iter_mut() {
            let Value::Object(inner) = &*value else {
                continue;
            };
            if !inner.contains_key(CORRELATION_KEY) {
                continue;
            }

            let placeholder = match (inner.get(TYPE_KEY), inner.get(CORRELATION_KEY)) {
                (Some(Value::String(ty)), Some(label)) if inner.len() == 2 => {
                    Label::from_value(label).map(|label| (ty.clone(), label))
                }
                _ => None,
            };
            let Some(key) = placeholder else {
                return Err(TesseraError::MalformedReference {
                    model: model.name().to_string(),
                    field: field.clone(),
                    value: value.to_string(),
                });
            };

            match self.ids.get(&key) {
                Some(id) => *value = Value::String(id.clone()),
                None => {
                    return Err(TesseraError::UnresolvedReference {
                        model: model.name().to_string(),
                        field: field.clone(),
                        type_name: key.0,
                        correlation_id: key.1.to_string(),
                    });
                }
            }
        }

        Ok(client_id)
    }

    /// Register a stored record's label and echo it in the result.
    ///
    /// The label, when present, comes first in the returned record, in the
    /// form it was given.
    pub fn update(&mut self, client_id: Option<Label>, result: Record) -> Record {
        let Some(label) = client_id else {
            return result;
        };

        let field = |key: &str| {
            result
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let echoed_label = label.to_value();
        self.ids.insert((field(TYPE_KEY), label), field(ID_KEY));

        let mut echoed = Record::new();
        echoed.insert(CORRELATION_KEY.to_string(), echoed_label);
        echoed.extend(result);
        echoed
    }

    /// Whether `(type, label)` was registered earlier in the batch.
    #[must_use]
    pub fn contains(&self, type_name: &str, label: &Label) -> bool {
        self.ids.contains_key(&(type_name.to_string(), label.clone()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

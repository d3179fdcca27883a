//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the Tessera core:
//! - Raw record representation (`Record`)
//! - Handler output (`Output`)
//! - Error types (`TesseraError`)
//!
//! ## Error Taxonomy
//!
//! - Registration errors are startup-fatal: registries fail closed.
//! - Resolution errors are call-fatal unless the call was optional.
//! - Validation errors carry the offending fields and owning object.
//! - Ingestion errors abort the batch transaction and carry the position
//!   of the offending record.

use crate::object::Object;
use serde_json::{Map, Value};
use thiserror::Error;

// =============================================================================
// RECORDS
// =============================================================================

/// A flat key/value record as read from a batch or a raw manifest.
///
/// Key order is preserved so results echo fields in input order.
pub type Record = Map<String, Value>;

// =============================================================================
// HANDLER OUTPUT
// =============================================================================

/// The result a handler hands back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// A JSON value (serialized data, an assigned identifier, ...).
    Value(Value),
    /// A freshly built object (the product of `manifest.load`).
    Object(Object),
}

impl Output {
    /// Extract the JSON value, if this output carries one.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Object(_) => None,
        }
    }

    /// Extract the object, if this output carries one.
    #[must_use]
    pub fn into_object(self) -> Option<Object> {
        match self {
            Self::Object(object) => Some(object),
            Self::Value(_) => None,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Tessera system.
///
/// - No silent failures
/// - Use `Result<T, TesseraError>` for fallible operations
/// - The core never panics; every error is returned to the caller
#[derive(Debug, Error)]
pub enum TesseraError {
    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------
    /// Two type definitions claim the same logical name.
    #[error("Type {new} named {name:?} is already assigned to {existing}")]
    DuplicateTypeName {
        name: String,
        existing: String,
        new: String,
    },

    /// Base type declarations form a loop.
    #[error("Type {0:?} inherits from itself")]
    InheritanceCycle(String),

    /// A handler is registered for an operation outside the allow-list.
    #[error("Unknown command {operation:?} used by {used_by}")]
    UnknownOperation { operation: String, used_by: String },

    /// A definition references a type that is not registered.
    #[error("Unknown type {name:?} used by {used_by}")]
    UnknownType { name: String, used_by: String },

    /// A handler references a backend type that is not registered.
    #[error("Unknown backend {name:?} used by {used_by}")]
    UnknownBackend { name: String, used_by: String },

    /// Two handlers share the same (operation, type, backend) key.
    #[error(
        "Command {new} named {operation:?} with {type_name:?} type and {backend:?} backend is already assigned to {existing}"
    )]
    DuplicateHandler {
        operation: String,
        type_name: Option<String>,
        backend: Option<String>,
        existing: String,
        new: String,
    },

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------
    /// No handler answers any of the requested operations for the target.
    #[error("Command {operations:?} not found for {target}{}", .backend.as_ref().map(|b| format!(" and {b}")).unwrap_or_default())]
    NoHandler {
        operations: Vec<String>,
        target: String,
        backend: Option<String>,
    },

    /// Handler-triggered dispatch nested deeper than the allowed limit.
    #[error("Dispatch depth {depth} exceeds the maximum of {max}")]
    DispatchDepthExceeded { depth: usize, max: usize },

    /// A call names a backend that is not configured.
    #[error("Backend {0:?} is not configured")]
    BackendNotConfigured(String),

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------
    /// A required field has no value and no default.
    #[error("Parameter {field:?} is required for {object}")]
    MissingRequiredField { object: String, field: String },

    /// Input keys that the schema does not declare.
    #[error("{object} does not have following parameters: {}", quote_all(.fields))]
    UnknownField { object: String, fields: Vec<String> },

    /// A value does not have the declared shape.
    #[error("Expected {expected:?} type for {field:?} of {object}, got {found:?}")]
    TypeMismatch {
        object: String,
        field: String,
        expected: String,
        found: String,
    },

    /// Several validation problems found in one call.
    #[error("{object} is invalid:{}", list_all(.errors))]
    Invalid {
        object: String,
        errors: Vec<TesseraError>,
    },

    /// A model property declaration is malformed.
    #[error("Property {property:?} of model {model:?} is invalid: {reason}")]
    InvalidProperty {
        model: String,
        property: String,
        reason: String,
    },

    // -------------------------------------------------------------------------
    // Ingestion
    // -------------------------------------------------------------------------
    /// A placeholder points at a label not yet assigned in this batch.
    #[error("Can't find ID {correlation_id:?} of type {type_name:?} for {field} property of {model}")]
    UnresolvedReference {
        model: String,
        field: String,
        type_name: String,
        correlation_id: String,
    },

    /// A value looks like a placeholder but has the wrong shape.
    #[error("ID replacement works with {{type=x, <id>=y}}, but {field} property of {model} got {value}")]
    MalformedReference {
        model: String,
        field: String,
        value: String,
    },

    /// The same correlation label is used twice for one type in a batch.
    #[error("Correlation ID {correlation_id:?} of type {type_name:?} is used more than once")]
    DuplicateReference {
        type_name: String,
        correlation_id: String,
    },

    /// A record targets a model that the namespace does not define.
    #[error("Unknown model {name:?} in namespace {namespace:?}")]
    UnknownModel { namespace: String, name: String },

    /// A push batch holds more records than allowed.
    #[error("Batch of {len} records exceeds the maximum of {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// Failure while processing one record of a batch.
    #[error("Record #{index}: {source}")]
    Record {
        index: usize,
        #[source]
        source: Box<TesseraError>,
    },

    // -------------------------------------------------------------------------
    // Routing
    // -------------------------------------------------------------------------
    /// A domain error reported by a handler.
    #[error("{0}")]
    Handler(String),

    /// An error framed by an enclosing handler.
    #[error("{source}:\n{context}")]
    Contextual {
        context: String,
        #[source]
        source: Box<TesseraError>,
    },

    // -------------------------------------------------------------------------
    // Lifecycle & I/O
    // -------------------------------------------------------------------------
    /// The store has not been configured yet.
    #[error("Store is not configured")]
    NotConfigured,

    /// The store has already been configured.
    #[error("Store is already configured")]
    AlreadyConfigured,

    /// An operation needs a backend connection and none was passed.
    #[error("Operation {0:?} requires a backend connection")]
    MissingConnection(String),

    /// A backend storage error occurred.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// The configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TesseraError {
    /// Strip positional and contextual wrappers down to the original error.
    #[must_use]
    pub fn root_cause(&self) -> &TesseraError {
        match self {
            Self::Record { source, .. } | Self::Contextual { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether routing through the call stack must leave this error alone.
    pub(crate) fn is_routed(&self) -> bool {
        matches!(
            self,
            Self::Contextual { .. } | Self::DispatchDepthExceeded { .. }
        )
    }

    /// Collapse collected validation problems into one error.
    pub(crate) fn collect(object: String, mut errors: Vec<TesseraError>) -> Result<(), Self> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Invalid { object, errors }),
        }
    }
}

impl From<serde_json::Error> for TesseraError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

fn quote_all(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| format!("{f:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn list_all(errors: &[TesseraError]) -> String {
    errors.iter().map(|e| format!("\n  - {e}")).collect()
}

/// Name a JSON value's kind for error messages.
#[must_use]
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_cause_unwraps_record_and_context() {
        let err = TesseraError::Record {
            index: 3,
            source: Box::new(TesseraError::Contextual {
                context: "  in manifest 'default'".to_string(),
                source: Box::new(TesseraError::Handler("boom".to_string())),
            }),
        };

        assert!(matches!(err.root_cause(), TesseraError::Handler(msg) if msg == "boom"));
        assert!(err.to_string().starts_with("Record #3: boom"));
    }

    #[test]
    fn unknown_field_lists_every_key() {
        let err = TesseraError::UnknownField {
            object: "<model 'report'>".to_string(),
            fields: vec!["bogus".to_string(), "extra".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "<model 'report'> does not have following parameters: \"bogus\", \"extra\""
        );
    }

    #[test]
    fn collect_single_error_keeps_variant() {
        let result = TesseraError::collect(
            "x".to_string(),
            vec![TesseraError::MissingRequiredField {
                object: "x".to_string(),
                field: "name".to_string(),
            }],
        );
        assert!(matches!(
            result,
            Err(TesseraError::MissingRequiredField { .. })
        ));
        assert!(TesseraError::collect("x".to_string(), Vec::new()).is_ok());
    }

    #[test]
    fn no_handler_mentions_backend() {
        let err = TesseraError::NoHandler {
            operations: vec!["push".to_string()],
            target: "<model 'a'>".to_string(),
            backend: Some("default".to_string()),
        };
        assert!(err.to_string().ends_with("and default"));
    }

    #[test]
    fn kind_names() {
        assert_eq!(kind_of(&json!(1)), "integer");
        assert_eq!(kind_of(&json!(1.5)), "number");
        assert_eq!(kind_of(&json!({})), "object");
        assert_eq!(kind_of(&json!(null)), "null");
    }
}

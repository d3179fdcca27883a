//! # Manifest Loader
//!
//! Populates schema objects from raw mappings. Bound to the
//! `manifest.load` operation for every type.
//!
//! Rules, per declared field:
//! - a key present in the input wins, an explicit `null` included
//! - otherwise the default is materialized; required fields without a
//!   default are reported missing; anything else becomes null
//! - `path` fields turn strings into paths, `object` fields must be
//!   mappings or null
//!
//! Undeclared input keys are reported together. Every problem found in
//! one load is reported at once; nothing is assigned unless the whole
//! input is valid.

use crate::dispatch::{Command, Invocation};
use crate::object::{FieldValue, Object};
use crate::schema::{FieldKind, FieldSpec};
use crate::types::{Output, Record, TesseraError, kind_of};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Build a populated copy of `object` from `raw`.
pub fn load(object: &Object, raw: &Record) -> Result<Object, TesseraError> {
    let schema = object.schema();
    let label = match raw.get("name") {
        Some(Value::String(name)) => format!("<{} {:?}>", schema.name(), name),
        _ => object.to_string(),
    };

    let mut fields = BTreeMap::new();
    let mut problems = Vec::new();

    for spec in schema.fields() {
        let value = match (raw.get(spec.name), spec.default) {
            (Some(value), _) => value.clone(),
            (None, Some(default)) => default.materialize(),
            (None, None) if spec.required => {
                problems.push(TesseraError::MissingRequiredField {
                    object: label.clone(),
                    field: spec.name.to_string(),
                });
                continue;
            }
            (None, None) => Value::Null,
        };

        match coerce(spec, value) {
            Ok(value) => {
                fields.insert(spec.name.to_string(), value);
            }
            Err(found) => problems.push(TesseraError::TypeMismatch {
                object: label.clone(),
                field: spec.name.to_string(),
                expected: "object".to_string(),
                found: found.to_string(),
            }),
        }
    }

    let unknown: Vec<String> = raw
        .keys()
        .filter(|key| schema.field(key).is_none())
        .cloned()
        .collect();
    if !unknown.is_empty() {
        problems.push(TesseraError::UnknownField {
            object: label.clone(),
            fields: unknown,
        });
    }

    TesseraError::collect(label, problems)?;
    Ok(Object::with_fields(schema.clone(), fields))
}

fn coerce(spec: &FieldSpec, value: Value) -> Result<FieldValue, &'static str> {
    match (spec.kind, value) {
        (_, Value::Null) => Ok(FieldValue::Null),
        (FieldKind::Path, Value::String(path)) => Ok(FieldValue::Path(PathBuf::from(path))),
        (FieldKind::Object, value @ Value::Object(_)) => Ok(FieldValue::Value(value)),
        (FieldKind::Object, other) => Err(kind_of(&other)),
        (_, value) => Ok(FieldValue::Value(value)),
    }
}

/// Declared fields with a loaded value, as a JSON mapping.
#[must_use]
pub fn serialize(object: &Object) -> Value {
    let map: Map<String, Value> = object
        .fields()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), v.to_json())))
        .collect();
    Value::Object(map)
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `manifest.load`: expects `{"data": {...}}`, returns the loaded object.
pub struct ManifestLoad;

impl Command for ManifestLoad {
    fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
        let Some(Value::Object(raw)) = inv.param("data") else {
            return Err(inv.fail(format!(
                "Loading {} needs a mapping of parameters",
                inv.target()
            )));
        };
        load(inv.target(), raw).map(|object| Some(Output::Object(object)))
    }
}

/// `serialize`: every loaded field of the target.
pub struct Serialize;

impl Command for Serialize {
    fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
        Ok(Some(Output::Value(serialize(inv.target()))))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::schema::{DefaultValue, SchemaType};
    use serde_json::json;
    use std::sync::Arc;

    fn blank() -> Object {
        Object::new(Arc::new(SchemaType::new(
            "dataset",
            Vec::new(),
            vec![
                FieldSpec::new("name").required(),
                FieldSpec::new("count").default(DefaultValue::Int(0)),
                FieldSpec::new("path").kind(FieldKind::Path),
                FieldSpec::new("options")
                    .kind(FieldKind::Object)
                    .default(DefaultValue::EmptyObject),
            ],
        )))
    }

    fn raw(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    #[test]
    fn empty_input_misses_required_name() {
        let err = load(&blank(), &Record::new()).expect_err("missing name");
        assert!(matches!(
            err,
            TesseraError::MissingRequiredField { ref field, .. } if field == "name"
        ));
    }

    #[test]
    fn defaults_fill_absent_fields() {
        let loaded = load(&blank(), &raw(json!({ "name": "x" }))).expect("load");
        assert_eq!(loaded.str_field("name"), Some("x"));
        assert_eq!(loaded.get("count"), Some(&FieldValue::Value(json!(0))));
        assert_eq!(loaded.get("path"), Some(&FieldValue::Null));
        assert_eq!(loaded.object_field("options"), Some(&Map::new()));
        assert_eq!(
            serialize(&loaded),
            json!({ "name": "x", "count": 0, "path": null, "options": {} })
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = load(&blank(), &raw(json!({ "name": "x", "bogus": 1 }))).expect_err("bogus");
        match err {
            TesseraError::UnknownField { fields, object } => {
                assert_eq!(fields, vec!["bogus".to_string()]);
                assert_eq!(object, "<dataset \"x\">");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn explicit_null_counts_as_present() {
        let loaded = load(&blank(), &raw(json!({ "name": null }))).expect("load");
        assert_eq!(loaded.get("name"), Some(&FieldValue::Null));
    }

    #[test]
    fn coercions() {
        let loaded = load(
            &blank(),
            &raw(json!({ "name": "x", "path": "manifest", "options": { "a": 1 } })),
        )
        .expect("load");
        assert_eq!(
            loaded.path_field("path"),
            Some(PathBuf::from("manifest").as_path())
        );

        let err = load(&blank(), &raw(json!({ "name": "x", "options": [1] }))).expect_err("list");
        assert!(matches!(
            err,
            TesseraError::TypeMismatch { ref field, ref found, .. }
                if field == "options" && found == "array"
        ));
    }

    #[test]
    fn every_problem_is_reported() {
        let err = load(&blank(), &raw(json!({ "options": 3, "a": 1, "b": 2 })))
            .expect_err("invalid");
        match err {
            TesseraError::Invalid { errors, .. } => {
                assert_eq!(errors.len(), 3);
                assert!(matches!(errors[0], TesseraError::MissingRequiredField { .. }));
                assert!(matches!(errors[1], TesseraError::TypeMismatch { .. }));
                assert!(
                    matches!(errors[2], TesseraError::UnknownField { ref fields, .. } if fields.len() == 2)
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn source_object_is_untouched() {
        let object = blank();
        let _ = load(&object, &raw(json!({ "name": "x" }))).expect("load");
        assert_eq!(object.get("name"), None);
        assert_eq!(object.to_string(), "<dataset>");
    }
}

//! # Schema Objects
//!
//! An `Object` is an instance of a registered `SchemaType` together with
//! its loaded field values. Objects are the targets of every dispatch.

use crate::schema::SchemaType;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A loaded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent with no default.
    Null,
    /// A string coerced into a filesystem path.
    Path(PathBuf),
    /// Any other JSON value.
    Value(Value),
}

impl FieldValue {
    /// Convert to JSON for serialization.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Path(p) => Value::String(p.to_string_lossy().into_owned()),
            Self::Value(v) => v.clone(),
        }
    }
}

/// An instance of a schema type.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    schema: Arc<SchemaType>,
    fields: BTreeMap<String, FieldValue>,
}

impl Object {
    /// Create an empty (unloaded) object of the given type.
    #[must_use]
    pub fn new(schema: Arc<SchemaType>) -> Self {
        Self {
            schema,
            fields: BTreeMap::new(),
        }
    }

    /// Create an object from already validated fields.
    pub(crate) fn with_fields(
        schema: Arc<SchemaType>,
        fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Self { schema, fields }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<SchemaType> {
        &self.schema
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.schema.name()
    }

    /// The `name` field, if loaded and a string.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    #[must_use]
    pub fn str_field(&self, field: &str) -> Option<&str> {
        match self.fields.get(field) {
            Some(FieldValue::Value(Value::String(s))) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn path_field(&self, field: &str) -> Option<&Path> {
        match self.fields.get(field) {
            Some(FieldValue::Path(p)) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn object_field(&self, field: &str) -> Option<&Map<String, Value>> {
        match self.fields.get(field) {
            Some(FieldValue::Value(Value::Object(map))) => Some(map),
            _ => None,
        }
    }

    /// Declared fields in schema order with their loaded values.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, Option<&FieldValue>)> + '_ {
        self.schema
            .fields()
            .iter()
            .map(|spec| (spec.name, self.fields.get(spec.name)))
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "<{} {:?}>", self.type_name(), name),
            None => write!(f, "<{}>", self.type_name()),
        }
    }
}

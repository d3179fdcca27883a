//! # Models
//!
//! Typed view over a loaded `model` object. A model names a record type of
//! a namespace, the backend its records live on, and the ordered list of
//! properties a record may carry.
//!
//! ```toml
//! [manifests.default.models.report]
//! backend = "default"
//! properties = { status = { type = "string", required = true }, owner = { type = "ref", object = "user" } }
//! ```

use crate::object::Object;
use crate::primitives::{CORRELATION_KEY, DEFAULT_BACKEND, ID_KEY, TYPE_KEY};
use crate::types::{Record, TesseraError, kind_of};
use serde::Deserialize;
use serde_json::Value;

/// Value shape a property accepts. Null is accepted by every kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    #[default]
    Any,
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    /// Identifier of a record of another model.
    Ref,
}

impl PropertyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Ref => "ref",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String | Self::Ref => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PropertySpec {
    #[serde(rename = "type", default)]
    kind: PropertyKind,
    #[serde(default)]
    object: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: Option<String>,
}

/// One declared property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub kind: PropertyKind,
    /// Referenced model, for `ref` properties.
    pub object: Option<String>,
    pub required: bool,
    pub description: Option<String>,
}

/// A record schema of one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    name: String,
    backend: String,
    properties: Vec<Property>,
}

impl Model {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the configured backend holding this model's records.
    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Backend table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.name
    }

    /// Properties in declaration order.
    #[must_use]
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// `ref` properties with the model they point at.
    pub fn references(&self) -> impl Iterator<Item = (&Property, &str)> {
        self.properties
            .iter()
            .filter_map(|p| p.object.as_deref().map(|target| (p, target)))
    }

    fn label(&self) -> String {
        format!("<model {:?}>", self.name)
    }

    /// Validate a record (without `type`) against the declared properties.
    pub fn check(&self, record: &Record) -> Result<(), TesseraError> {
        let label = self.label();
        let mut problems = Vec::new();

        let unknown: Vec<String> = record
            .keys()
            .filter(|key| key.as_str() != ID_KEY && self.property(key).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            problems.push(TesseraError::UnknownField {
                object: label.clone(),
                fields: unknown,
            });
        }

        if let Some(id) = record.get(ID_KEY) {
            if !id.is_string() {
                problems.push(TesseraError::TypeMismatch {
                    object: label.clone(),
                    field: ID_KEY.to_string(),
                    expected: "string".to_string(),
                    found: kind_of(id).to_string(),
                });
            }
        }

        for property in &self.properties {
            match record.get(&property.name) {
                None | Some(Value::Null) => {
                    if property.required {
                        problems.push(TesseraError::MissingRequiredField {
                            object: label.clone(),
                            field: property.name.clone(),
                        });
                    }
                }
                Some(value) if !property.kind.accepts(value) => {
                    problems.push(TesseraError::TypeMismatch {
                        object: label.clone(),
                        field: property.name.clone(),
                        expected: property.kind.as_str().to_string(),
                        found: kind_of(value).to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        TesseraError::collect(label, problems)
    }

    /// The stored form of a record: every property in declaration order,
    /// absent ones as null.
    #[must_use]
    pub fn prepare(&self, record: &Record) -> Record {
        self.properties
            .iter()
            .map(|p| {
                let value = record.get(&p.name).cloned().unwrap_or(Value::Null);
                (p.name.clone(), value)
            })
            .collect()
    }
}

impl TryFrom<&Object> for Model {
    type Error = TesseraError;

    fn try_from(object: &Object) -> Result<Self, Self::Error> {
        let name = object
            .name()
            .ok_or_else(|| TesseraError::Config(format!("{object} has no name")))?
            .to_string();
        let backend = object
            .str_field("backend")
            .unwrap_or(DEFAULT_BACKEND)
            .to_string();

        let mut properties = Vec::new();
        let mut problems = Vec::new();
        if let Some(specs) = object.object_field("properties") {
            for (prop, spec) in specs {
                match parse_property(&name, prop, spec) {
                    Ok(property) => properties.push(property),
                    Err(e) => problems.push(e),
                }
            }
        }
        TesseraError::collect(object.to_string(), problems)?;

        Ok(Self {
            name,
            backend,
            properties,
        })
    }
}

fn parse_property(model: &str, name: &str, spec: &Value) -> Result<Property, TesseraError> {
    let invalid = |reason: String| TesseraError::InvalidProperty {
        model: model.to_string(),
        property: name.to_string(),
        reason,
    };

    if matches!(name, TYPE_KEY | ID_KEY | CORRELATION_KEY) {
        return Err(invalid("the name is reserved".to_string()));
    }

    let spec = PropertySpec::deserialize(spec).map_err(|e| invalid(e.to_string()))?;
    match (spec.kind, &spec.object) {
        (PropertyKind::Ref, None) => {
            return Err(invalid("a ref property needs an object".to_string()));
        }
        (kind, Some(_)) if kind != PropertyKind::Ref => {
            return Err(invalid(format!(
                "only ref properties name an object, not {}",
                kind.as_str()
            )));
        }
        _ => {}
    }

    Ok(Property {
        name: name.to_string(),
        kind: spec.kind,
        object: spec.object,
        required: spec.required,
        description: spec.description,
    })
}

//! # Datasets
//!
//! A dataset describes how rows of an external source map onto records.
//! Every object of a dataset becomes a model named
//! `{object}/:source/{dataset}` in the manifest's namespace, and a pull
//! turns source rows into push-ready records of that model.
//!
//! ```toml
//! [manifests.default.datasets.gov.objects.country]
//! source = "countries"
//! properties = { id = { source = "code" }, title = { source = "name", type = "string" } }
//!
//! [manifests.default.datasets.gov.objects.city]
//! source = "cities"
//! properties = { id = { source = "code" }, country = { source = "country", ref = "country" } }
//! ```
//!
//! ## Mapping
//!
//! - `id` is the row key. It becomes the record's `<id>` label; rows whose
//!   key is null, or a list holding a null, are dropped
//! - a property with a list of sources gets a list of values
//! - `ref` values become `{type, <id>}` placeholders, so the referenced row
//!   must come earlier in the same batch
//! - `dependency` properties read the current dependency row instead of
//!   the source row
//!
//! Dependencies name `model.property` columns of records already stored;
//! a pull runs once per stored row. Service calls as dependencies are not
//! supported, and rows are read from local data, never fetched.

use crate::model::PropertyKind;
use crate::object::Object;
use crate::primitives::{CORRELATION_KEY, ID_KEY, TYPE_KEY};
use crate::types::{Record, TesseraError};
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Separator between an object name and its dataset in model names.
pub const SOURCE_SEPARATOR: &str = "/:source/";

/// Model name of a dataset object.
#[must_use]
pub fn model_name(object: &str, dataset: &str) -> String {
    format!("{object}{SOURCE_SEPARATOR}{dataset}")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum Sources {
    One(String),
    Many(Vec<String>),
}

impl Sources {
    fn into_vec(self) -> (Vec<String>, bool) {
        match self {
            Self::One(name) => (vec![name], false),
            Self::Many(names) => (names, true),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ObjectSpec {
    #[serde(default)]
    source: Option<Sources>,
    #[serde(default)]
    dependencies: Map<String, Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourcePropertySpec {
    #[serde(rename = "type", default)]
    kind: PropertyKind,
    #[serde(default)]
    source: Option<Sources>,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default)]
    dependency: bool,
    #[serde(default)]
    description: Option<String>,
}

/// How one property is filled from a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceProperty {
    pub name: String,
    pub kind: PropertyKind,
    /// Columns read from the row (or the dependency row).
    pub sources: Vec<String>,
    /// Declared with a list of sources: the value is a list.
    pub many: bool,
    /// Model of the referenced dataset object.
    pub reference: Option<String>,
    /// Read from the dependency row instead of the source row.
    pub dependency: bool,
    pub description: Option<String>,
}

/// A dependency column: `alias = "model.property"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub alias: String,
    pub property: String,
}

/// One object of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetObject {
    name: String,
    model: String,
    sources: Vec<String>,
    dependency_model: Option<String>,
    dependencies: Vec<Dependency>,
    description: Option<String>,
    key: Option<SourceProperty>,
    properties: Vec<SourceProperty>,
}

impl DatasetObject {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the model the object's records belong to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Source tables the rows come from. Empty when the object is never
    /// pulled.
    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Stored model the dependency rows are read from.
    #[must_use]
    pub fn dependency_model(&self) -> Option<&str> {
        self.dependency_model.as_deref()
    }

    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Stored properties in declaration order, the key excluded.
    #[must_use]
    pub fn properties(&self) -> &[SourceProperty] {
        &self.properties
    }

    /// Raw `model` mapping for the object's model.
    #[must_use]
    pub fn model_spec(&self, backend: &str) -> Record {
        let mut properties = Map::new();
        for property in &self.properties {
            let mut spec = Map::new();
            match &property.reference {
                Some(target) => {
                    spec.insert("type".to_string(), json!(PropertyKind::Ref.as_str()));
                    spec.insert("object".to_string(), json!(target));
                }
                None => {
                    spec.insert("type".to_string(), json!(property.kind.as_str()));
                }
            }
            if let Some(description) = &property.description {
                spec.insert("description".to_string(), json!(description));
            }
            properties.insert(property.name.clone(), Value::Object(spec));
        }

        let mut spec = Record::new();
        spec.insert(TYPE_KEY.to_string(), json!("model"));
        spec.insert("name".to_string(), json!(self.model));
        spec.insert("backend".to_string(), json!(backend));
        if let Some(description) = &self.description {
            spec.insert("description".to_string(), json!(description));
        }
        spec.insert("properties".to_string(), Value::Object(properties));
        spec
    }

    /// Map one source row to a push record, or `None` when its key is
    /// missing.
    #[must_use]
    pub fn map_row(&self, row: &Record, dependency: &Record) -> Option<Record> {
        let key = self.key.as_ref()?;
        let label = label(&read(key, row, dependency))?;

        let mut record = Record::new();
        record.insert(TYPE_KEY.to_string(), json!(self.model));
        record.insert(CORRELATION_KEY.to_string(), label);
        for property in &self.properties {
            if property.sources.is_empty() {
                continue;
            }
            let value = read(property, row, dependency);
            let value = match &property.reference {
                Some(target) => placeholder(target, &value),
                None => value,
            };
            record.insert(property.name.clone(), value);
        }
        Some(record)
    }
}

fn read(property: &SourceProperty, row: &Record, dependency: &Record) -> Value {
    let from = if property.dependency { dependency } else { row };
    let mut values = property
        .sources
        .iter()
        .map(|source| from.get(source).cloned().unwrap_or(Value::Null));
    if property.many {
        Value::Array(values.collect())
    } else {
        values.next().unwrap_or(Value::Null)
    }
}

/// A loaded dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    name: String,
    backend: String,
    objects: Vec<DatasetObject>,
}

impl Dataset {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Objects in declaration order.
    #[must_use]
    pub fn objects(&self) -> &[DatasetObject] {
        &self.objects
    }

    #[must_use]
    pub fn object(&self, name: &str) -> Option<&DatasetObject> {
        self.objects.iter().find(|o| o.name == name)
    }
}

impl TryFrom<&Object> for Dataset {
    type Error = TesseraError;

    fn try_from(object: &Object) -> Result<Self, Self::Error> {
        let name = object
            .name()
            .ok_or_else(|| TesseraError::Config(format!("{object} has no name")))?
            .to_string();
        let backend = object
            .str_field("backend")
            .ok_or_else(|| TesseraError::Config(format!("{object} has no backend")))?
            .to_string();

        let specs = object.object_field("objects").cloned().unwrap_or_default();
        let mut objects = Vec::new();
        let mut problems = Vec::new();
        for (obj, spec) in &specs {
            match parse_object(&name, obj, spec, &specs) {
                Ok(parsed) => objects.push(parsed),
                Err(e) => problems.push(e),
            }
        }
        TesseraError::collect(object.to_string(), problems)?;

        Ok(Self {
            name,
            backend,
            objects,
        })
    }
}

fn parse_object(
    dataset: &str,
    name: &str,
    spec: &Value,
    siblings: &Map<String, Value>,
) -> Result<DatasetObject, TesseraError> {
    let model = model_name(name, dataset);
    let invalid = |property: &str, reason: String| TesseraError::InvalidProperty {
        model: model.clone(),
        property: property.to_string(),
        reason,
    };

    let spec = ObjectSpec::deserialize(spec)
        .map_err(|e| TesseraError::Config(format!("Object {name:?} of dataset {dataset:?}: {e}")))?;
    let (sources, _) = spec.source.map(Sources::into_vec).unwrap_or_default();

    let mut dependency_model: Option<String> = None;
    let mut dependencies = Vec::new();
    for (alias, dep) in &spec.dependencies {
        let Value::String(dep) = dep else {
            return Err(invalid(
                alias,
                format!("dependency must be in 'model.property' form, got {dep}; service calls are not supported"),
            ));
        };
        let Some((dep_model, property)) = dep.split_once('.') else {
            return Err(invalid(
                alias,
                format!("dependency must be in 'model.property' form, got {dep:?}"),
            ));
        };
        match &dependency_model {
            Some(existing) if existing != dep_model => {
                return Err(invalid(
                    alias,
                    format!(
                        "dependencies are allowed only from a single model, found {existing:?} and {dep_model:?}"
                    ),
                ));
            }
            _ => dependency_model = Some(dep_model.to_string()),
        }
        dependencies.push(Dependency {
            alias: alias.clone(),
            property: property.to_string(),
        });
    }

    let mut key = None;
    let mut properties = Vec::new();
    for (prop, raw) in &spec.properties {
        let parsed = SourcePropertySpec::deserialize(raw).map_err(|e| invalid(prop, e.to_string()))?;
        let reference = match parsed.reference {
            Some(target) if siblings.contains_key(&target) => Some(model_name(&target, dataset)),
            Some(target) => {
                return Err(invalid(
                    prop,
                    format!("{name}.{prop} referenced an unknown object {target:?}"),
                ));
            }
            None => None,
        };
        let (sources, many) = parsed.source.map(Sources::into_vec).unwrap_or_default();
        if parsed.dependency {
            if let Some(missing) = sources
                .iter()
                .find(|source| !dependencies.iter().any(|d| &d.alias == *source))
            {
                return Err(invalid(
                    prop,
                    format!("reads dependency {missing:?}, which is not declared"),
                ));
            }
        }
        let property = SourceProperty {
            name: prop.clone(),
            kind: parsed.kind,
            sources,
            many,
            reference,
            dependency: parsed.dependency,
            description: parsed.description,
        };
        if prop == ID_KEY {
            key = Some(property);
        } else {
            properties.push(property);
        }
    }

    if !sources.is_empty() && key.as_ref().is_none_or(|k| k.sources.is_empty()) {
        return Err(invalid(ID_KEY, "an object with a source needs a sourced id".to_string()));
    }

    Ok(DatasetObject {
        name: name.to_string(),
        model,
        sources,
        dependency_model,
        dependencies,
        description: spec.description,
        key,
        properties,
    })
}

/// A row key as a correlation label. Lists become their JSON text.
fn label(key: &Value) -> Option<Value> {
    match key {
        Value::Null => None,
        Value::String(_) | Value::Number(_) => Some(key.clone()),
        Value::Array(parts) if parts.iter().any(Value::is_null) => None,
        other => Some(Value::String(other.to_string())),
    }
}

fn placeholder(target: &str, value: &Value) -> Value {
    let Some(label) = label(value) else {
        return Value::Null;
    };
    let mut reference = Map::new();
    reference.insert(TYPE_KEY.to_string(), json!(target));
    reference.insert(CORRELATION_KEY.to_string(), label);
    Value::Object(reference)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::object::FieldValue;
    use crate::schema::SchemaType;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn dataset(objects: Value) -> Result<Dataset, TesseraError> {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::Value(json!("gov")));
        fields.insert("backend".to_string(), FieldValue::Value(json!("default")));
        fields.insert("objects".to_string(), FieldValue::Value(objects));
        let object = Object::with_fields(
            Arc::new(SchemaType::new("dataset", vec!["node"], Vec::new())),
            fields,
        );
        Dataset::try_from(&object)
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    fn gov() -> Dataset {
        dataset(json!({
            "country": {
                "source": "countries",
                "properties": {
                    "id": { "source": "code" },
                    "title": { "source": "name", "type": "string" },
                    "names": { "source": ["name", "alt"] },
                },
            },
            "city": {
                "source": ["cities", "towns"],
                "properties": {
                    "id": { "source": ["country", "code"] },
                    "country": { "source": "country", "ref": "country" },
                },
            },
            "note": {},
        }))
        .expect("dataset")
    }

    #[test]
    fn objects_become_source_models() {
        let gov = gov();
        let country = gov.object("country").expect("country");
        assert_eq!(country.model(), "country/:source/gov");
        assert_eq!(country.sources(), ["countries".to_string()]);
        assert_eq!(
            country.properties().iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["title", "names"]
        );
        assert!(gov.object("note").expect("note").sources().is_empty());

        let spec = gov.object("city").expect("city").model_spec("default");
        assert_eq!(
            Value::Object(spec),
            json!({
                "type": "model",
                "name": "city/:source/gov",
                "backend": "default",
                "properties": {
                    "country": { "type": "ref", "object": "country/:source/gov" },
                },
            })
        );
    }

    #[test]
    fn rows_map_to_labelled_records() {
        let gov = gov();
        let country = gov.object("country").expect("country");
        let row = record(json!({ "code": "lt", "name": "Lithuania", "extra": 1 }));
        let mapped = country.map_row(&row, &Record::new());
        assert_eq!(
            mapped.map(Value::Object),
            Some(json!({
                "type": "country/:source/gov",
                "<id>": "lt",
                "title": "Lithuania",
                "names": ["Lithuania", null],
            }))
        );
    }

    #[test]
    fn refs_become_placeholders() {
        let gov = gov();
        let city = gov.object("city").expect("city");
        let row = record(json!({ "code": "vno", "country": "lt" }));
        let mapped = city.map_row(&row, &Record::new()).expect("kept");
        assert_eq!(mapped["<id>"], json!("[\"lt\",\"vno\"]"));
        assert_eq!(
            mapped["country"],
            json!({ "type": "country/:source/gov", "<id>": "lt" })
        );

        let row = record(json!({ "code": "x", "country": null }));
        assert!(city.map_row(&row, &Record::new()).is_none());
    }

    #[test]
    fn rows_without_key_are_dropped() {
        let gov = gov();
        let country = gov.object("country").expect("country");
        let row = record(json!({ "code": null, "name": "Nowhere" }));
        assert!(country.map_row(&row, &Record::new()).is_none());
        let row = record(json!({ "name": "Nowhere" }));
        assert!(country.map_row(&row, &Record::new()).is_none());
    }

    #[test]
    fn dependency_properties_read_the_dependency_row() {
        let gov = dataset(json!({
            "report": {
                "source": "reports",
                "dependencies": { "country": "country/:source/gov.title" },
                "properties": {
                    "id": { "source": "id" },
                    "country": { "source": "country", "dependency": true },
                },
            },
        }))
        .expect("dataset");
        let report = gov.object("report").expect("report");
        assert_eq!(report.dependency_model(), Some("country/:source/gov"));
        assert_eq!(
            report.dependencies(),
            [Dependency {
                alias: "country".to_string(),
                property: "title".to_string(),
            }]
        );

        let mapped = report
            .map_row(
                &record(json!({ "id": 7, "country": "ignored" })),
                &record(json!({ "country": "Lithuania" })),
            )
            .expect("kept");
        assert_eq!(mapped["<id>"], json!(7));
        assert_eq!(mapped["country"], json!("Lithuania"));
    }

    #[test]
    fn malformed_objects_are_rejected() {
        let err = dataset(json!({
            "city": { "properties": { "country": { "source": "c", "ref": "nation" } } },
        }))
        .expect_err("unknown ref");
        assert!(err.to_string().contains("referenced an unknown object \"nation\""));

        let err = dataset(json!({
            "city": { "dependencies": { "x": { "service": "http" } } },
        }))
        .expect_err("service call");
        assert!(matches!(err, TesseraError::InvalidProperty { ref property, .. } if property == "x"));

        let err = dataset(json!({
            "city": { "dependencies": { "a": "one.x", "b": "two.y" } },
        }))
        .expect_err("two models");
        assert!(err.to_string().contains("single model"));

        let err = dataset(json!({
            "city": { "source": "cities", "properties": { "name": { "source": "n" } } },
        }))
        .expect_err("no key");
        assert!(matches!(err, TesseraError::InvalidProperty { ref property, .. } if property == "id"));

        let err = dataset(json!({
            "city": { "properties": { "country": { "source": "c", "dependency": true } } },
        }))
        .expect_err("undeclared dependency");
        assert!(err.to_string().contains("not declared"));
    }
}

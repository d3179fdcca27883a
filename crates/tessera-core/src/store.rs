//! # Store
//!
//! The facade tying registries, configured backends and loaded objects
//! together.
//!
//! ## Lifecycle
//!
//! 1. `Store::new` builds the type and command registries from module roots.
//! 2. `configure` loads the internal manifest, the configuration object,
//!    every backend, manifest and model, then checks every manifest.
//! 3. After that the store is read-only: `push`, `getall`, `migrate` and
//!    friends take `&self`, so a configured store can be shared between
//!    threads running independent batches.
//!
//! ## Namespaces
//!
//! Every manifest owns a namespace named after it. Models are looked up by
//! `(namespace, model name)`. Dataset objects add models named
//! `{object}/:source/{dataset}` to the same namespace. The configuration
//! object, the backend objects and the internal manifest live in the
//! `internal` namespace.

use crate::backend::{Backend, Connection, open_backend};
use crate::builtins;
use crate::dataset::Dataset;
use crate::dispatch::DispatchCall;
use crate::ingest::ClientSuppliedIds;
use crate::model::Model;
use crate::object::Object;
use crate::primitives::{
    DEFAULT_BACKEND, ID_KEY, INTERNAL_NAMESPACE, MAX_BATCH_LENGTH, OP_CHECK, OP_MANIFEST_CHECK,
    OP_MANIFEST_LOAD, OP_MIGRATE, OP_MIGRATE_INTERNAL, OP_PREPARE, OP_PREPARE_INTERNAL, OP_PULL,
    OP_PUSH, OP_SERIALIZE, TYPE_KEY,
};
use crate::registry::{CommandRegistry, Discovery, ModuleRoot, TypeRegistry};
use crate::types::{Output, Record, TesseraError, kind_of};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct Namespace {
    objects: BTreeMap<&'static str, BTreeMap<String, Object>>,
    models: BTreeMap<String, Model>,
    datasets: BTreeMap<String, Dataset>,
}

/// Registries, backends and loaded objects.
#[derive(Debug)]
pub struct Store {
    discovery: Discovery,
    types: TypeRegistry,
    commands: CommandRegistry,
    backends: BTreeMap<String, Box<dyn Backend>>,
    namespaces: BTreeMap<String, Namespace>,
    configured: bool,
}

impl Store {
    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    /// Build the registries from the given module roots.
    pub fn new(roots: &[&'static ModuleRoot]) -> Result<Self, TesseraError> {
        let discovery = Discovery::new(roots);
        let types = TypeRegistry::build(&discovery)?;
        let commands = CommandRegistry::build(&discovery, &types)?;
        Ok(Self {
            discovery,
            types,
            commands,
            backends: BTreeMap::new(),
            namespaces: BTreeMap::new(),
            configured: false,
        })
    }

    /// A store over the built-in types and backends.
    pub fn with_builtins() -> Result<Self, TesseraError> {
        Self::new(builtins::ROOTS)
    }

    #[must_use]
    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    #[must_use]
    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// An unloaded object of a registered type.
    pub fn instantiate(&self, type_name: &str) -> Result<Object, TesseraError> {
        self.types
            .get(type_name)
            .map(|schema| Object::new(schema.clone()))
            .ok_or_else(|| TesseraError::UnknownType {
                name: type_name.to_string(),
                used_by: "store".to_string(),
            })
    }

    /// Load an object from a raw mapping naming its type under `type`.
    pub fn load_object(&self, data: &Record, namespace: &str) -> Result<Object, TesseraError> {
        let mut raw = data.clone();
        let type_name = match raw.shift_remove(TYPE_KEY) {
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(TesseraError::TypeMismatch {
                    object: "<object>".to_string(),
                    field: TYPE_KEY.to_string(),
                    expected: "string".to_string(),
                    found: kind_of(&other).to_string(),
                });
            }
            None => {
                return Err(TesseraError::MissingRequiredField {
                    object: "<object>".to_string(),
                    field: TYPE_KEY.to_string(),
                });
            }
        };

        let blank = self.instantiate(&type_name)?;
        let call = DispatchCall::new(namespace).op(OP_MANIFEST_LOAD, json!({ "data": raw }));
        self.run(&blank, call, None)?
            .and_then(Output::into_object)
            .ok_or_else(|| TesseraError::Handler(format!("Loading {blank} produced no object")))
    }

    // =========================================================================
    // CONFIGURATION
    // =========================================================================

    /// Load configuration, backends and manifests, then check the manifests.
    ///
    /// On failure the store is left unconfigured and empty.
    pub fn configure(&mut self, raw: &Record) -> Result<(), TesseraError> {
        if self.configured {
            return Err(TesseraError::AlreadyConfigured);
        }
        match self.load_configuration(raw) {
            Ok(()) => {
                self.configured = true;
                tracing::info!(
                    backends = self.backends.len(),
                    namespaces = self.namespaces.len(),
                    "store configured"
                );
                Ok(())
            }
            Err(e) => {
                self.backends.clear();
                self.namespaces.clear();
                Err(e)
            }
        }
    }

    fn load_configuration(&mut self, raw: &Record) -> Result<(), TesseraError> {
        self.add_manifest(INTERNAL_NAMESPACE, &builtins::internal_manifest())?;

        let mut data = raw.clone();
        data.insert(TYPE_KEY.to_string(), json!("config"));
        data.entry("name").or_insert_with(|| json!("config"));
        let config = self.load_object(&data, INTERNAL_NAMESPACE)?;

        for (name, spec) in config.object_field("backends").into_iter().flatten() {
            self.add_backend(name, spec)?;
        }

        let manifests: Vec<(String, Value)> = config
            .object_field("manifests")
            .into_iter()
            .flatten()
            .map(|(name, spec)| (name.clone(), spec.clone()))
            .collect();
        self.insert_object(INTERNAL_NAMESPACE, config);

        for (name, spec) in &manifests {
            if name == INTERNAL_NAMESPACE {
                return Err(TesseraError::Config(format!(
                    "Manifest name {name:?} is reserved"
                )));
            }
            let Value::Object(spec) = spec else {
                return Err(mismatch("<config \"config\">", name, spec));
            };
            self.add_manifest(name, spec)?;
        }

        for name in std::iter::once(INTERNAL_NAMESPACE)
            .chain(manifests.iter().map(|(name, _)| name.as_str()))
        {
            let manifest = self.manifest(name)?;
            self.run(
                manifest,
                DispatchCall::new(name).op(OP_MANIFEST_CHECK, Value::Null),
                None,
            )?;
        }
        Ok(())
    }

    fn add_backend(&mut self, name: &str, spec: &Value) -> Result<(), TesseraError> {
        let Value::Object(spec) = spec else {
            return Err(mismatch("<config \"config\">", name, spec));
        };
        let mut data = spec.clone();
        data.insert("name".to_string(), json!(name));
        let object = self.load_object(&data, INTERNAL_NAMESPACE)?;
        if !self.types.is_backend_type(object.type_name()) {
            return Err(TesseraError::UnknownBackend {
                name: object.type_name().to_string(),
                used_by: format!("backend {name:?}"),
            });
        }

        let backend = open_backend(name, &object)?;
        tracing::info!(backend = name, kind = backend.type_name(), "backend opened");
        self.backends.insert(name.to_string(), backend);
        self.insert_object(INTERNAL_NAMESPACE, object);
        Ok(())
    }

    fn add_manifest(&mut self, namespace: &str, spec: &Record) -> Result<(), TesseraError> {
        let mut data = spec.clone();
        data.insert(TYPE_KEY.to_string(), json!("manifest"));
        data.insert("name".to_string(), json!(namespace));
        let manifest = self.load_object(&data, namespace)?;
        let backend = manifest
            .str_field("backend")
            .unwrap_or(DEFAULT_BACKEND)
            .to_string();

        let mut models = Vec::new();
        for (name, spec) in manifest.object_field("models").into_iter().flatten() {
            let Value::Object(spec) = spec else {
                return Err(mismatch(&manifest.to_string(), name, spec));
            };
            let mut data = spec.clone();
            data.insert(TYPE_KEY.to_string(), json!("model"));
            data.insert("name".to_string(), json!(name));
            data.entry("backend").or_insert_with(|| json!(backend));
            let object = self.load_object(&data, namespace)?;
            let model = Model::try_from(&object)?;
            models.push((object, model));
        }

        let mut datasets = Vec::new();
        for (name, spec) in manifest.object_field("datasets").into_iter().flatten() {
            let Value::Object(spec) = spec else {
                return Err(mismatch(&manifest.to_string(), name, spec));
            };
            let mut data = spec.clone();
            data.insert(TYPE_KEY.to_string(), json!("dataset"));
            data.insert("name".to_string(), json!(name));
            data.entry("backend").or_insert_with(|| json!(backend));
            let object = self.load_object(&data, namespace)?;
            let dataset = Dataset::try_from(&object)?;
            for source in dataset.objects() {
                let object = self.load_object(&source.model_spec(dataset.backend()), namespace)?;
                let model = Model::try_from(&object)?;
                models.push((object, model));
            }
            datasets.push((object, dataset));
        }

        let mut seen = std::collections::BTreeSet::new();
        for (_, model) in &models {
            if !seen.insert(model.name()) {
                return Err(TesseraError::Config(format!(
                    "Model {:?} is defined twice in manifest {namespace:?}",
                    model.name()
                )));
            }
        }

        tracing::debug!(
            namespace,
            models = models.len(),
            datasets = datasets.len(),
            "manifest loaded"
        );
        self.insert_object(namespace, manifest);
        for (object, model) in models {
            self.insert_object(namespace, object);
            self.namespaces
                .entry(namespace.to_string())
                .or_default()
                .models
                .insert(model.name().to_string(), model);
        }
        for (object, dataset) in datasets {
            self.insert_object(namespace, object);
            self.namespaces
                .entry(namespace.to_string())
                .or_default()
                .datasets
                .insert(dataset.name().to_string(), dataset);
        }
        Ok(())
    }

    fn insert_object(&mut self, namespace: &str, object: Object) {
        let name = object.name().unwrap_or_default().to_string();
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .objects
            .entry(object.type_name())
            .or_default()
            .insert(name, object);
    }

    fn ensure_configured(&self) -> Result<(), TesseraError> {
        if self.configured {
            Ok(())
        } else {
            Err(TesseraError::NotConfigured)
        }
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// A configured backend by name.
    pub fn backend(&self, name: &str) -> Result<&dyn Backend, TesseraError> {
        self.backends
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| TesseraError::BackendNotConfigured(name.to_string()))
    }

    /// Names of the configured backends.
    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// Namespace names, `internal` included.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// A loaded object by namespace, type and name.
    #[must_use]
    pub fn object(&self, namespace: &str, type_name: &str, name: &str) -> Option<&Object> {
        self.namespaces
            .get(namespace)?
            .objects
            .get(type_name)?
            .get(name)
    }

    /// The loaded configuration object.
    #[must_use]
    pub fn config(&self) -> Option<&Object> {
        self.object(INTERNAL_NAMESPACE, "config", "config")
    }

    /// The manifest owning a namespace.
    pub fn manifest(&self, namespace: &str) -> Result<&Object, TesseraError> {
        self.object(namespace, "manifest", namespace)
            .ok_or_else(|| TesseraError::Config(format!("Unknown manifest {namespace:?}")))
    }

    /// A model of a namespace.
    pub fn model(&self, namespace: &str, name: &str) -> Result<&Model, TesseraError> {
        self.namespaces
            .get(namespace)
            .and_then(|ns| ns.models.get(name))
            .ok_or_else(|| unknown_model(namespace, name))
    }

    /// The loaded `model` object behind a model, used as dispatch target.
    pub fn model_object(&self, namespace: &str, name: &str) -> Result<&Object, TesseraError> {
        self.object(namespace, "model", name)
            .ok_or_else(|| unknown_model(namespace, name))
    }

    /// A dataset of a namespace.
    pub fn dataset(&self, namespace: &str, name: &str) -> Result<&Dataset, TesseraError> {
        self.namespaces
            .get(namespace)
            .and_then(|ns| ns.datasets.get(name))
            .ok_or_else(|| unknown_dataset(namespace, name))
    }

    /// The loaded `dataset` object behind a dataset, used as dispatch target.
    pub fn dataset_object(&self, namespace: &str, name: &str) -> Result<&Object, TesseraError> {
        self.object(namespace, "dataset", name)
            .ok_or_else(|| unknown_dataset(namespace, name))
    }

    /// Datasets of a namespace in name order.
    pub fn datasets(&self, namespace: &str) -> impl Iterator<Item = &Dataset> {
        self.namespaces
            .get(namespace)
            .into_iter()
            .flat_map(|ns| ns.datasets.values())
    }

    /// Models of a namespace in name order.
    pub fn models(&self, namespace: &str) -> impl Iterator<Item = &Model> {
        self.namespaces
            .get(namespace)
            .into_iter()
            .flat_map(|ns| ns.models.values())
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Every loaded object as `namespace -> type -> name -> fields`.
    pub fn serialize(&self) -> Result<Value, TesseraError> {
        let mut tree = Map::new();
        for (namespace, ns) in &self.namespaces {
            let mut types = Map::new();
            for (type_name, objects) in &ns.objects {
                let mut named = Map::new();
                for (name, object) in objects {
                    let call = DispatchCall::new(namespace.as_str()).op(OP_SERIALIZE, Value::Null);
                    let value = self
                        .run(object, call, None)?
                        .and_then(Output::into_value)
                        .unwrap_or(Value::Null);
                    named.insert(name.clone(), value);
                }
                types.insert((*type_name).to_string(), Value::Object(named));
            }
            tree.insert(namespace.clone(), Value::Object(types));
        }
        Ok(Value::Object(tree))
    }

    /// Validate backend-specific constraints of every model.
    pub fn prepare(&self, internal: bool) -> Result<(), TesseraError> {
        self.over_manifests(internal, OP_PREPARE_INTERNAL, OP_PREPARE)
    }

    /// Create backend storage for every model.
    pub fn migrate(&self, internal: bool) -> Result<(), TesseraError> {
        self.over_manifests(internal, OP_MIGRATE_INTERNAL, OP_MIGRATE)
    }

    fn over_manifests(
        &self,
        internal: bool,
        internal_op: &'static str,
        op: &'static str,
    ) -> Result<(), TesseraError> {
        self.ensure_configured()?;
        if internal {
            let manifest = self.manifest(INTERNAL_NAMESPACE)?;
            let call = DispatchCall::new(INTERNAL_NAMESPACE)
                .op(internal_op, Value::Null)
                .backend(DEFAULT_BACKEND);
            self.run(manifest, call, None)?;
            return Ok(());
        }
        for namespace in self.namespaces.keys() {
            if namespace == INTERNAL_NAMESPACE {
                continue;
            }
            let manifest = self.manifest(namespace)?;
            self.run(manifest, DispatchCall::new(namespace.as_str()).op(op, Value::Null), None)?;
            tracing::info!(namespace = %namespace, operation = op, "manifest done");
        }
        Ok(())
    }

    /// Check and store a batch of records in one transaction.
    ///
    /// Records are processed in order. Each may carry a `<id>` label that
    /// later records reference through `{type, <id>}` placeholders. Nothing
    /// is committed unless every record succeeds; the error then names the
    /// failing record's position.
    pub fn push(
        &self,
        records: &[Record],
        backend: &str,
        namespace: &str,
    ) -> Result<Vec<Record>, TesseraError> {
        self.ensure_configured()?;
        if records.len() > MAX_BATCH_LENGTH {
            return Err(TesseraError::BatchTooLarge {
                len: records.len(),
                max: MAX_BATCH_LENGTH,
            });
        }

        let mut connection = self.backend(backend)?.begin()?;
        match self.push_records(records, backend, namespace, connection.as_mut()) {
            Ok(results) => {
                connection.commit()?;
                tracing::info!(count = results.len(), backend, namespace, "batch committed");
                Ok(results)
            }
            Err(e) => {
                if let Err(rollback) = connection.rollback() {
                    tracing::warn!(error = %rollback, backend, "rollback failed");
                }
                tracing::debug!(error = %e, backend, namespace, "batch rolled back");
                Err(e)
            }
        }
    }

    fn push_records(
        &self,
        records: &[Record],
        backend: &str,
        namespace: &str,
        connection: &mut (dyn Connection + 'static),
    ) -> Result<Vec<Record>, TesseraError> {
        let mut ids = ClientSuppliedIds::new();
        let mut results = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let result = self
                .push_record(record, backend, namespace, connection, &mut ids)
                .map_err(|e| TesseraError::Record {
                    index,
                    source: Box::new(e),
                })?;
            results.push(result);
        }
        Ok(results)
    }

    fn push_record(
        &self,
        record: &Record,
        backend: &str,
        namespace: &str,
        connection: &mut (dyn Connection + 'static),
        ids: &mut ClientSuppliedIds,
    ) -> Result<Record, TesseraError> {
        let mut data = record.clone();
        let type_name = match data.shift_remove(TYPE_KEY) {
            Some(Value::String(name)) => name,
            Some(other) => return Err(mismatch("<record>", TYPE_KEY, &other)),
            None => {
                return Err(TesseraError::MissingRequiredField {
                    object: "<record>".to_string(),
                    field: TYPE_KEY.to_string(),
                });
            }
        };
        let model = self.model(namespace, &type_name)?;
        let target = self.model_object(namespace, &type_name)?;

        let client_id = ids.replace(model, &mut data)?;
        let params = json!({ "data": data });

        let check = DispatchCall::new(namespace)
            .op(OP_CHECK, params.clone())
            .backend(backend)
            .connection(&mut *connection);
        self.run(target, check, None)?;

        let push = DispatchCall::new(namespace)
            .op(OP_PUSH, params)
            .backend(backend)
            .connection(&mut *connection);
        let id = self
            .run(target, push, None)?
            .and_then(Output::into_value)
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| TesseraError::Handler(format!("Push of {target} returned no id")))?;

        let mut result = Record::new();
        result.insert(TYPE_KEY.to_string(), json!(model.name()));
        result.insert(ID_KEY.to_string(), json!(id));
        result.extend(model.prepare(&data));
        Ok(ids.update(client_id, result))
    }

    /// Map local source rows of a dataset to push records.
    ///
    /// `sources` maps source names to lists of rows. `models` restricts the
    /// pull to the named objects; empty pulls every sourced object. The
    /// result is a batch for `push` on the same namespace.
    pub fn pull(
        &self,
        dataset: &str,
        sources: &Record,
        models: &[String],
        namespace: &str,
    ) -> Result<Vec<Record>, TesseraError> {
        self.ensure_configured()?;
        let target = self.dataset_object(namespace, dataset)?;
        let call = DispatchCall::new(namespace)
            .op(OP_PULL, json!({ "sources": sources, "models": models }));
        let rows = match self.run(target, call, None)?.and_then(Output::into_value) {
            Some(Value::Array(rows)) => rows,
            _ => {
                return Err(TesseraError::Handler(format!(
                    "Pull of {target} returned no records"
                )));
            }
        };
        Ok(rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    /// Every stored record of a model.
    pub fn getall(
        &self,
        model: &str,
        backend: &str,
        namespace: &str,
    ) -> Result<Vec<Record>, TesseraError> {
        self.ensure_configured()?;
        let model = self.model(namespace, model)?;
        let rows = self.backend(backend)?.list(model.table())?;
        Ok(rows
            .into_iter()
            .map(|(id, record)| stored(model, id, record))
            .collect())
    }

    /// One stored record of a model.
    pub fn getone(
        &self,
        model: &str,
        id: &str,
        backend: &str,
        namespace: &str,
    ) -> Result<Option<Record>, TesseraError> {
        self.ensure_configured()?;
        let model = self.model(namespace, model)?;
        let row = self.backend(backend)?.get(model.table(), id)?;
        Ok(row.map(|record| stored(model, id.to_string(), record)))
    }
}

fn stored(model: &Model, id: String, record: Record) -> Record {
    let mut result = Record::new();
    result.insert(TYPE_KEY.to_string(), json!(model.name()));
    result.insert(ID_KEY.to_string(), Value::String(id));
    result.extend(record);
    result
}

fn unknown_model(namespace: &str, name: &str) -> TesseraError {
    TesseraError::UnknownModel {
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

fn unknown_dataset(namespace: &str, name: &str) -> TesseraError {
    TesseraError::Config(format!("Unknown dataset {name:?} in namespace {namespace:?}"))
}

fn mismatch(object: &str, field: &str, value: &Value) -> TesseraError {
    TesseraError::TypeMismatch {
        object: object.to_string(),
        field: field.to_string(),
        expected: "object".to_string(),
        found: kind_of(value).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    fn configured() -> Store {
        let mut store = Store::with_builtins().expect("builtins");
        store
            .configure(&raw(json!({
                "backends": { "default": { "type": "memory" } },
                "manifests": {
                    "default": {
                        "models": {
                            "report": {
                                "properties": {
                                    "status": { "type": "string", "required": true },
                                    "count": { "type": "integer" },
                                },
                            },
                        },
                    },
                },
            })))
            .expect("configure");
        store
    }

    #[test]
    fn store_is_shareable() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<Store>();
    }

    #[test]
    fn builtin_roots_are_discovered() {
        let store = Store::with_builtins().expect("builtins");
        assert_eq!(
            store.discovery().root_names().collect::<Vec<_>>(),
            vec!["tessera.types", "tessera.backends"]
        );
    }

    #[test]
    fn configure_loads_everything() {
        let store = configured();
        assert!(store.is_configured());
        assert_eq!(store.backend_names().collect::<Vec<_>>(), vec!["default"]);
        assert_eq!(
            store.namespaces().collect::<Vec<_>>(),
            vec!["default", "internal"]
        );
        let model = store.model("default", "report").expect("report");
        assert_eq!(model.backend(), "default");
        assert!(store.config().is_some());
        assert!(store.model("internal", "transaction").is_ok());
    }

    #[test]
    fn configure_runs_once() {
        let mut store = configured();
        let err = store.configure(&Record::new()).expect_err("second configure");
        assert!(matches!(err, TesseraError::AlreadyConfigured));
    }

    #[test]
    fn operations_need_configuration() {
        let store = Store::with_builtins().expect("builtins");
        assert!(matches!(
            store.push(&[], "default", "default"),
            Err(TesseraError::NotConfigured)
        ));
        assert!(matches!(store.migrate(false), Err(TesseraError::NotConfigured)));
    }

    #[test]
    fn failed_configuration_leaves_store_empty() {
        let mut store = Store::with_builtins().expect("builtins");
        let err = store
            .configure(&raw(json!({
                "backends": { "default": { "type": "memory" } },
                "manifests": { "default": { "models": { "a": { "backend": "missing" } } } },
            })))
            .expect_err("unconfigured backend");
        assert!(err.to_string().contains("missing"));
        assert!(!store.is_configured());
        assert_eq!(store.namespaces().count(), 0);
        assert_eq!(store.backend_names().count(), 0);
    }

    #[test]
    fn load_object_requires_type() {
        let store = Store::with_builtins().expect("builtins");
        let err = store
            .load_object(&raw(json!({ "name": "x" })), "default")
            .expect_err("no type");
        assert!(matches!(err, TesseraError::MissingRequiredField { ref field, .. } if field == "type"));

        let object = store
            .load_object(&raw(json!({ "type": "node", "name": "x" })), "default")
            .expect("node");
        assert_eq!(object.to_string(), "<node \"x\">");
    }

    #[test]
    fn serialize_walks_every_namespace() {
        let store = configured();
        let tree = store.serialize().expect("serialize");
        assert_eq!(
            tree["default"]["model"]["report"]["backend"],
            json!("default")
        );
        assert_eq!(tree["internal"]["config"]["config"]["name"], json!("config"));
        assert_eq!(tree["internal"]["memory"]["default"]["name"], json!("default"));
    }

    #[test]
    fn push_then_read_back() {
        let store = configured();
        store.migrate(false).expect("migrate");
        let results = store
            .push(
                &[raw(json!({ "type": "report", "status": "ok" }))],
                "default",
                "default",
            )
            .expect("push");
        assert_eq!(
            Value::Object(results[0].clone()),
            json!({ "type": "report", "id": "1", "status": "ok", "count": null })
        );

        let all = store.getall("report", "default", "default").expect("getall");
        assert_eq!(all, results);
        let one = store
            .getone("report", "1", "default", "default")
            .expect("getone");
        assert_eq!(one.as_ref(), results.first());
    }

    #[test]
    fn records_with_id_update_in_place() {
        let store = configured();
        store
            .push(
                &[raw(json!({ "type": "report", "status": "draft" }))],
                "default",
                "default",
            )
            .expect("push");
        let updated = store
            .push(
                &[raw(json!({ "type": "report", "id": "1", "status": "final" }))],
                "default",
                "default",
            )
            .expect("update");
        assert_eq!(updated[0]["id"], json!("1"));

        let all = store.getall("report", "default", "default").expect("getall");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["status"], json!("final"));
    }

    #[test]
    fn concurrent_pushes_keep_every_record() {
        let store = configured();
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for n in 0..50 {
                        let record = raw(json!({
                            "type": "report",
                            "status": "ok",
                            "count": worker * 100 + n,
                        }));
                        store.push(&[record], "default", "default").expect("push");
                    }
                });
            }
        });

        let all = store.getall("report", "default", "default").expect("getall");
        assert_eq!(all.len(), 400);
        let ids: std::collections::BTreeSet<String> = all.iter().map(|r| r["id"].to_string()).collect();
        assert_eq!(ids.len(), 400);
        let counts: std::collections::BTreeSet<i64> =
            all.iter().filter_map(|r| r["count"].as_i64()).collect();
        assert_eq!(counts.len(), 400);
    }

    #[test]
    fn reads_see_only_committed_batches() {
        let store = configured();
        let err = store
            .push(
                &[
                    raw(json!({ "type": "report", "status": "ok" })),
                    raw(json!({ "type": "report" })),
                ],
                "default",
                "default",
            )
            .expect_err("missing status");
        assert!(matches!(err, TesseraError::Record { index: 1, .. }));
        assert!(store.getall("report", "default", "default").expect("getall").is_empty());
        assert!(store.getone("report", "1", "default", "default").expect("getone").is_none());
    }

    #[test]
    fn oversized_batches_are_rejected() {
        let store = configured();
        let records = vec![Record::new(); MAX_BATCH_LENGTH + 1];
        assert!(matches!(
            store.push(&records, "default", "default"),
            Err(TesseraError::BatchTooLarge { .. })
        ));
    }
}

//! Node types and their handlers.

use super::datasets::{DatasetCheck, DatasetPull};
use crate::dispatch::{Command, CommandDef, DispatchCall, Frame, Invocation};
use crate::manifest::{ManifestLoad, Serialize};
use crate::model::Model;
use crate::primitives::{OP_MANIFEST_CHECK, OP_MIGRATE, OP_PREPARE};
use crate::registry::ModuleRoot;
use crate::schema::{DefaultValue, FieldKind, FieldSpec, TypeDef};
use crate::types::{Output, TesseraError};
use serde_json::Value;
use std::collections::BTreeMap;

pub static TYPES: ModuleRoot = ModuleRoot {
    name: "tessera.types",
    types: &[
        TypeDef::new("node").fields(&[FieldSpec::new("name").required()]),
        TypeDef::new("config").bases(&["node"]).fields(&[
            FieldSpec::new("backends")
                .kind(FieldKind::Object)
                .default(DefaultValue::EmptyObject),
            FieldSpec::new("manifests")
                .kind(FieldKind::Object)
                .default(DefaultValue::EmptyObject),
        ]),
        TypeDef::new("manifest").bases(&["node"]).fields(&[
            FieldSpec::new("path").kind(FieldKind::Path),
            FieldSpec::new("backend").default(DefaultValue::Str("default")),
            FieldSpec::new("models")
                .kind(FieldKind::Object)
                .default(DefaultValue::EmptyObject),
            FieldSpec::new("datasets")
                .kind(FieldKind::Object)
                .default(DefaultValue::EmptyObject),
        ]),
        TypeDef::new("dataset").bases(&["node"]).fields(&[
            FieldSpec::new("description"),
            FieldSpec::new("backend"),
            FieldSpec::new("objects")
                .kind(FieldKind::Object)
                .default(DefaultValue::EmptyObject),
        ]),
        TypeDef::new("model").bases(&["node"]).fields(&[
            FieldSpec::new("description"),
            FieldSpec::new("backend"),
            FieldSpec::new("properties")
                .kind(FieldKind::Object)
                .default(DefaultValue::EmptyObject),
        ]),
    ],
    commands: &[
        CommandDef {
            name: "ManifestLoad",
            operation: "manifest.load",
            types: &[None],
            backend: None,
            handler: &ManifestLoad,
        },
        CommandDef {
            name: "Serialize",
            operation: "serialize",
            types: &[None],
            backend: None,
            handler: &Serialize,
        },
        CommandDef {
            name: "NodeCheck",
            operation: "manifest.check",
            types: &[Some("node")],
            backend: None,
            handler: &NodeCheck,
        },
        CommandDef {
            name: "ManifestCheck",
            operation: "manifest.check",
            types: &[Some("manifest")],
            backend: None,
            handler: &ManifestCheck,
        },
        CommandDef {
            name: "ModelCheck",
            operation: "manifest.check",
            types: &[Some("model")],
            backend: None,
            handler: &ModelCheck,
        },
        CommandDef {
            name: "DatasetCheck",
            operation: "manifest.check",
            types: &[Some("dataset")],
            backend: None,
            handler: &DatasetCheck,
        },
        CommandDef {
            name: "DatasetPull",
            operation: "pull",
            types: &[Some("dataset")],
            backend: None,
            handler: &DatasetPull,
        },
        CommandDef {
            name: "ManifestMigrate",
            operation: "backend.migrate",
            types: &[Some("manifest")],
            backend: None,
            handler: &FanOut::MIGRATE,
        },
        CommandDef {
            name: "ManifestPrepare",
            operation: "backend.prepare",
            types: &[Some("manifest")],
            backend: None,
            handler: &FanOut::PREPARE,
        },
    ],
};

// =============================================================================
// CHECKS
// =============================================================================

/// Nodes without checks of their own pass.
struct NodeCheck;

impl Command for NodeCheck {
    fn execute(&self, _inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
        Ok(None)
    }
}

/// Checks every model and dataset of the manifest's namespace.
struct ManifestCheck;

impl Command for ManifestCheck {
    fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
        let store = inv.store();
        let namespace = inv.namespace();
        for model in store.models(namespace) {
            let target = store.model_object(namespace, model.name())?;
            inv.dispatch(
                target,
                DispatchCall::new(namespace).op(OP_MANIFEST_CHECK, Value::Null),
            )?;
        }
        for dataset in store.datasets(namespace) {
            let target = store.dataset_object(namespace, dataset.name())?;
            inv.dispatch(
                target,
                DispatchCall::new(namespace).op(OP_MANIFEST_CHECK, Value::Null),
            )?;
        }
        Ok(None)
    }

    fn context(&self, frame: &Frame<'_>) -> Option<String> {
        Some(format!("  in manifest {:?}", frame.namespace()))
    }
}

/// Model references and backends must exist.
struct ModelCheck;

impl Command for ModelCheck {
    fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
        let store = inv.store();
        let namespace = inv.namespace();
        let model = store.model(namespace, inv.target().name().unwrap_or_default())?;

        for (property, target) in model.references() {
            if store.model(namespace, target).is_err() {
                return Err(inv.fail(format!(
                    "Property {:?} of model {:?} refers to unknown model {:?}",
                    property.name,
                    model.name(),
                    target
                )));
            }
        }

        if store.backend(model.backend()).is_err() {
            return Err(inv.fail(format!(
                "Model {:?} uses backend {:?}, which is not configured",
                model.name(),
                model.backend()
            )));
        }
        Ok(None)
    }
}

// =============================================================================
// FAN-OUT
// =============================================================================

/// Runs a per-model operation for every model of a manifest.
///
/// Models are grouped by backend; each group runs on one connection that is
/// committed once the whole group succeeded. When the manifest itself was
/// dispatched with a backend, every model runs on that backend.
pub(super) struct FanOut {
    per_model: &'static str,
    optional: bool,
}

impl FanOut {
    pub(super) const MIGRATE: Self = Self {
        per_model: OP_MIGRATE,
        optional: false,
    };

    /// Backends without a prepare step are skipped.
    pub(super) const PREPARE: Self = Self {
        per_model: OP_PREPARE,
        optional: true,
    };
}

impl Command for FanOut {
    fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
        let store = inv.store();
        let namespace = inv.namespace();
        let forced = inv.backend().map(|b| b.name());

        let mut groups: BTreeMap<&str, Vec<&Model>> = BTreeMap::new();
        for model in store.models(namespace) {
            let backend = forced.unwrap_or(model.backend());
            groups.entry(backend).or_default().push(model);
        }

        for (backend, models) in groups {
            let mut connection = store.backend(backend)?.begin()?;
            for model in models {
                let target = store.model_object(namespace, model.name())?;
                let mut call = DispatchCall::new(namespace)
                    .op(self.per_model, Value::Null)
                    .backend(backend)
                    .connection(connection.as_mut());
                if self.optional {
                    call = call.optional();
                }
                inv.dispatch(target, call)?;
            }
            connection.commit()?;
            tracing::debug!(namespace, backend, operation = self.per_model, "models done");
        }
        Ok(None)
    }

    fn context(&self, frame: &Frame<'_>) -> Option<String> {
        Some(format!("  in manifest {:?}", frame.namespace()))
    }
}

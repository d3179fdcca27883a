//! Backend types and per-model storage handlers.

use super::nodes::FanOut;
use crate::backend::RedbBackend;
use crate::dispatch::{Command, CommandDef, Invocation};
use crate::model::Model;
use crate::primitives::ID_KEY;
use crate::registry::ModuleRoot;
use crate::schema::{FieldKind, FieldSpec, TypeDef};
use crate::types::{Output, Record, TesseraError};
use serde_json::Value;

pub static BACKENDS: ModuleRoot = ModuleRoot {
    name: "tessera.backends",
    types: &[
        TypeDef::new("backend").bases(&["node"]),
        TypeDef::new("memory").bases(&["backend"]),
        TypeDef::new("redb")
            .bases(&["backend"])
            .fields(&[FieldSpec::new("path").kind(FieldKind::Path).required()]),
    ],
    commands: &[
        // internal manifest
        CommandDef {
            name: "MemoryMigrateInternal",
            operation: "backend.migrate.internal",
            types: &[Some("manifest")],
            backend: Some("memory"),
            handler: &FanOut::MIGRATE,
        },
        CommandDef {
            name: "RedbMigrateInternal",
            operation: "backend.migrate.internal",
            types: &[Some("manifest")],
            backend: Some("redb"),
            handler: &FanOut::MIGRATE,
        },
        CommandDef {
            name: "MemoryPrepareInternal",
            operation: "backend.prepare.internal",
            types: &[Some("manifest")],
            backend: Some("memory"),
            handler: &FanOut::PREPARE,
        },
        CommandDef {
            name: "RedbPrepareInternal",
            operation: "backend.prepare.internal",
            types: &[Some("manifest")],
            backend: Some("redb"),
            handler: &FanOut::PREPARE,
        },
        // models
        CommandDef {
            name: "MemoryMigrate",
            operation: "backend.migrate",
            types: &[Some("model")],
            backend: Some("memory"),
            handler: &CreateTable,
        },
        CommandDef {
            name: "RedbMigrate",
            operation: "backend.migrate",
            types: &[Some("model")],
            backend: Some("redb"),
            handler: &CreateTable,
        },
        CommandDef {
            name: "RedbPrepare",
            operation: "backend.prepare",
            types: &[Some("model")],
            backend: Some("redb"),
            handler: &RedbPrepare,
        },
        CommandDef {
            name: "MemoryCheck",
            operation: "check",
            types: &[Some("model")],
            backend: Some("memory"),
            handler: &CheckRecord,
        },
        CommandDef {
            name: "RedbCheck",
            operation: "check",
            types: &[Some("model")],
            backend: Some("redb"),
            handler: &CheckRecord,
        },
        CommandDef {
            name: "MemoryPush",
            operation: "push",
            types: &[Some("model")],
            backend: Some("memory"),
            handler: &PushRecord,
        },
        CommandDef {
            name: "RedbPush",
            operation: "push",
            types: &[Some("model")],
            backend: Some("redb"),
            handler: &PushRecord,
        },
    ],
};

fn target_model<'a>(inv: &Invocation<'a>) -> Result<&'a Model, TesseraError> {
    let name = inv.target().name().unwrap_or_default();
    inv.store().model(inv.namespace(), name)
}

fn record_param<'i>(inv: &'i Invocation<'_>) -> Result<&'i Record, TesseraError> {
    match inv.param("data") {
        Some(Value::Object(record)) => Ok(record),
        _ => Err(inv.fail(format!("{} expects a record under \"data\"", inv.target()))),
    }
}

/// One table per model.
struct CreateTable;

impl Command for CreateTable {
    fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
        let model = target_model(inv)?;
        inv.connection()?.create_table(model.table())?;
        tracing::debug!(table = model.table(), "table created");
        Ok(None)
    }
}

struct RedbPrepare;

impl Command for RedbPrepare {
    fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
        let model = target_model(inv)?;
        RedbBackend::check_table_name(model.table())?;
        Ok(None)
    }
}

struct CheckRecord;

impl Command for CheckRecord {
    fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
        let model = target_model(inv)?;
        model.check(record_param(inv)?)?;
        Ok(None)
    }
}

/// Stores the prepared record and returns its id.
struct PushRecord;

impl Command for PushRecord {
    fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
        let model = target_model(inv)?;
        let (id, prepared) = {
            let data = record_param(inv)?;
            let id = data.get(ID_KEY).and_then(Value::as_str).map(str::to_string);
            (id, model.prepare(data))
        };
        let id = inv
            .connection()?
            .insert(model.table(), id.as_deref(), &prepared)?;
        Ok(Some(Output::Value(Value::String(id))))
    }
}

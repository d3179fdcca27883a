//! # Built-in Module Roots
//!
//! - `tessera.types`: the node hierarchy (`config`, `manifest`, `dataset`,
//!   `model`) with loading, serialization, manifest checks, fan-out and
//!   dataset pull handlers
//! - `tessera.backends`: the `backend` base type, the `memory` and `redb`
//!   backend types, and their per-model handlers
//!
//! Extra roots can be added next to these with `Store::new`.

mod backends;
mod datasets;
mod nodes;

use crate::primitives::INTERNAL_NAMESPACE;
use crate::registry::ModuleRoot;
use crate::types::Record;
use serde_json::{Value, json};

pub use backends::BACKENDS;
pub use nodes::TYPES;

/// Every built-in root.
pub static ROOTS: &[&ModuleRoot] = &[&TYPES, &BACKENDS];

/// Raw form of the manifest owning the `internal` namespace.
///
/// Its `transaction` model records pushes made by clients; it lives on the
/// `default` backend and is migrated with `migrate --internal`.
#[must_use]
pub fn internal_manifest() -> Record {
    let manifest = json!({
        "name": INTERNAL_NAMESPACE,
        "backend": "default",
        "models": {
            "transaction": {
                "description": "Push batches applied to the store",
                "properties": {
                    "datetime": { "type": "string", "required": true },
                    "client_type": { "type": "string" },
                    "client_id": { "type": "string" },
                    "errors": { "type": "integer" },
                },
            },
        },
    });
    match manifest {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

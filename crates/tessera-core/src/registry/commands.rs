//! Command registry construction and lookup.

use super::{Discovery, TypeRegistry};
use crate::dispatch::CommandDef;
use crate::primitives::is_known_operation;
use crate::types::TesseraError;
use std::collections::BTreeMap;

/// Dispatch table key: (operation, type or none, backend type or none).
pub type CommandKey = (&'static str, Option<&'static str>, Option<&'static str>);

#[derive(Debug, Clone, Copy)]
struct Entry {
    root: &'static str,
    def: &'static CommandDef,
}

impl Entry {
    fn label(&self) -> String {
        format!("{}.{}", self.root, self.def.name)
    }
}

/// The immutable dispatch table.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    table: BTreeMap<CommandKey, Entry>,
}

impl CommandRegistry {
    /// Validate and index every command under the discovery roots.
    ///
    /// Requires a built type registry: declared types and backends are
    /// checked against it.
    pub fn build(discovery: &Discovery, types: &TypeRegistry) -> Result<Self, TesseraError> {
        let mut table: BTreeMap<CommandKey, Entry> = BTreeMap::new();

        for (root, def) in discovery.commands() {
            let entry = Entry { root, def };

            if !is_known_operation(def.operation) {
                return Err(TesseraError::UnknownOperation {
                    operation: def.operation.to_string(),
                    used_by: entry.label(),
                });
            }

            if let Some(backend) = def.backend {
                if !types.is_backend_type(backend) {
                    return Err(TesseraError::UnknownBackend {
                        name: backend.to_string(),
                        used_by: entry.label(),
                    });
                }
            }

            for type_name in def.types {
                if let Some(name) = type_name {
                    if !types.contains(name) {
                        return Err(TesseraError::UnknownType {
                            name: (*name).to_string(),
                            used_by: entry.label(),
                        });
                    }
                }

                let key = (def.operation, *type_name, def.backend);
                if let Some(existing) = table.get(&key) {
                    return Err(TesseraError::DuplicateHandler {
                        operation: def.operation.to_string(),
                        type_name: type_name.map(str::to_string),
                        backend: def.backend.map(str::to_string),
                        existing: existing.label(),
                        new: entry.label(),
                    });
                }
                table.insert(key, entry);
            }
        }

        tracing::debug!(count = table.len(), "command registry built");
        Ok(Self { table })
    }

    /// Find the first handler for the candidate keys.
    ///
    /// Operations are tried in caller order; within each operation the
    /// type chain is tried in order. Returns the index of the matching
    /// operation together with its handler.
    #[must_use]
    pub fn resolve(
        &self,
        operations: &[&str],
        chain: &[Option<&str>],
        backend_type: Option<&str>,
    ) -> Option<(usize, &'static CommandDef)> {
        for (index, operation) in operations.iter().enumerate() {
            for type_name in chain {
                if let Some(def) = self.get(operation, *type_name, backend_type) {
                    return Some((index, def));
                }
            }
        }
        None
    }

    /// Exact lookup of one key.
    #[must_use]
    pub fn get(
        &self,
        operation: &str,
        type_name: Option<&str>,
        backend_type: Option<&str>,
    ) -> Option<&'static CommandDef> {
        self.table
            .get(&(operation, type_name, backend_type))
            .map(|entry| entry.def)
    }

    /// Every key with the root and handler name that owns it.
    pub fn iter(&self) -> impl Iterator<Item = (CommandKey, String)> + '_ {
        self.table.iter().map(|(key, entry)| (*key, entry.label()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

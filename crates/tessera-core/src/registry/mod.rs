//! # Registry Module
//!
//! Discovery of type and command definitions, and the two immutable
//! registries built from them at startup.
//!
//! - `Discovery`: the configured set of module roots
//! - `TypeRegistry`: logical name → `SchemaType`
//! - `CommandRegistry`: (operation, type, backend) → `CommandDef`
//!
//! Definitions are registered statically: every module exposes a
//! `ModuleRoot` listing its definitions, and a store is built from a list
//! of roots. Both registries fail closed; a store never runs with a
//! partially valid dispatch table.

mod commands;
mod types;

pub use commands::{CommandKey, CommandRegistry};
pub use types::TypeRegistry;

use crate::dispatch::CommandDef;
use crate::schema::TypeDef;

/// A discovery root: every definition a module contributes.
#[derive(Debug)]
pub struct ModuleRoot {
    /// Root name used in configuration and error messages.
    pub name: &'static str,
    pub types: &'static [TypeDef],
    pub commands: &'static [CommandDef],
}

/// The configured set of module roots.
///
/// A root listed more than once is discovered once.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    roots: Vec<&'static ModuleRoot>,
}

impl Discovery {
    /// Build a discovery set from the given roots, in order.
    #[must_use]
    pub fn new(roots: &[&'static ModuleRoot]) -> Self {
        let mut discovery = Self::default();
        for root in roots {
            discovery.add(root);
        }
        discovery
    }

    /// Add a root unless one with the same name is already present.
    pub fn add(&mut self, root: &'static ModuleRoot) {
        if !self.roots.iter().any(|r| r.name == root.name) {
            self.roots.push(root);
        }
    }

    /// Names of the configured roots.
    pub fn root_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.roots.iter().map(|r| r.name)
    }

    /// Every type definition, with the root it came from.
    pub fn types(&self) -> impl Iterator<Item = (&'static str, &'static TypeDef)> + '_ {
        self.roots
            .iter()
            .flat_map(|root| root.types.iter().map(move |def| (root.name, def)))
    }

    /// Every command definition, with the root it came from.
    pub fn commands(&self) -> impl Iterator<Item = (&'static str, &'static CommandDef)> + '_ {
        self.roots
            .iter()
            .flat_map(|root| root.commands.iter().map(move |def| (root.name, def)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static EMPTY: ModuleRoot = ModuleRoot {
        name: "tests.empty",
        types: &[TypeDef::new("thing")],
        commands: &[],
    };

    #[test]
    fn repeated_root_is_discovered_once() {
        let discovery = Discovery::new(&[&EMPTY, &EMPTY]);
        assert_eq!(discovery.root_names().count(), 1);
        assert_eq!(discovery.types().count(), 1);
    }
}

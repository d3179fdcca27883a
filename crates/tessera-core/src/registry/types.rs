//! Type registry construction.

use super::Discovery;
use crate::primitives::BACKEND_BASE_TYPE;
use crate::schema::{FieldSpec, SchemaType, TypeDef};
use crate::types::TesseraError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registered schema types keyed by logical name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<&'static str, Arc<SchemaType>>,
}

impl TypeRegistry {
    /// Collect every type under the discovery roots.
    ///
    /// Fails on duplicate names, unknown base types and inheritance cycles.
    pub fn build(discovery: &Discovery) -> Result<Self, TesseraError> {
        let mut defs: BTreeMap<&'static str, (&'static str, &'static TypeDef)> = BTreeMap::new();
        for (root, def) in discovery.types() {
            if let Some((existing_root, _)) = defs.get(def.name) {
                return Err(TesseraError::DuplicateTypeName {
                    name: def.name.to_string(),
                    existing: format!("{}.{}", existing_root, def.name),
                    new: format!("{}.{}", root, def.name),
                });
            }
            defs.insert(def.name, (root, def));
        }

        let mut chains = BTreeMap::new();
        let mut types = BTreeMap::new();
        for name in defs.keys().copied() {
            let ancestors = linearize(name, &defs, &mut chains, &mut Vec::new())?;
            let fields = merge_fields(name, &ancestors, &defs);
            types.insert(name, Arc::new(SchemaType::new(name, ancestors, fields)));
        }

        tracing::debug!(count = types.len(), "type registry built");
        Ok(Self { types })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<SchemaType>> {
        self.types.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// True if `name` is the backend base type or one of its descendants.
    #[must_use]
    pub fn is_backend_type(&self, name: &str) -> bool {
        self.types
            .get(name)
            .is_some_and(|ty| ty.is_a(BACKEND_BASE_TYPE))
    }

    /// All registered types in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SchemaType>> {
        self.types.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Depth-first ancestor order over declared bases; first occurrence wins.
fn linearize(
    name: &'static str,
    defs: &BTreeMap<&'static str, (&'static str, &'static TypeDef)>,
    chains: &mut BTreeMap<&'static str, Vec<&'static str>>,
    visiting: &mut Vec<&'static str>,
) -> Result<Vec<&'static str>, TesseraError> {
    if let Some(done) = chains.get(name) {
        return Ok(done.clone());
    }
    if visiting.contains(&name) {
        return Err(TesseraError::InheritanceCycle(name.to_string()));
    }
    let Some((root, def)) = defs.get(name) else {
        return Ok(Vec::new());
    };

    visiting.push(name);
    let mut chain: Vec<&'static str> = Vec::new();
    for base in def.bases {
        if !defs.contains_key(base) {
            return Err(TesseraError::UnknownType {
                name: (*base).to_string(),
                used_by: format!("{}.{}", root, def.name),
            });
        }
        let inherited = linearize(*base, defs, chains, visiting)?;
        for ancestor in std::iter::once(*base).chain(inherited) {
            if !chain.contains(&ancestor) {
                chain.push(ancestor);
            }
        }
    }
    visiting.pop();

    chains.insert(name, chain.clone());
    Ok(chain)
}

fn merge_fields(
    name: &'static str,
    ancestors: &[&'static str],
    defs: &BTreeMap<&'static str, (&'static str, &'static TypeDef)>,
) -> Vec<FieldSpec> {
    let mut fields: Vec<FieldSpec> = Vec::new();
    let lineage = ancestors.iter().rev().chain(std::iter::once(&name));
    for ty in lineage {
        let Some((_, def)) = defs.get(ty) else {
            continue;
        };
        for spec in def.fields {
            match fields.iter_mut().find(|f| f.name == spec.name) {
                Some(slot) => *slot = *spec,
                None => fields.push(*spec),
            }
        }
    }
    fields
}

//! # Schema Definitions
//!
//! Static type definitions (`TypeDef`) and their registered form
//! (`SchemaType`).
//!
//! A `TypeDef` is a declarative table: a logical name, the direct base
//! types, and a list of field descriptors. Registration turns it into a
//! `SchemaType` carrying the full ancestor chain and the merged field table,
//! both computed once and never recomputed at dispatch time.

use serde_json::{Map, Value};

// =============================================================================
// FIELD DESCRIPTORS
// =============================================================================

/// Coercion applied to a field value while loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any JSON value, stored as given.
    Any,
    /// A string becomes a filesystem path.
    Path,
    /// The value must be a mapping (or null).
    Object,
}

/// Default for a field that is absent from the raw input.
///
/// Defaults are materialized on every load, so composite defaults are
/// never shared between objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Str(&'static str),
    EmptyObject,
    EmptyArray,
}

impl DefaultValue {
    /// Build a fresh JSON value for this default.
    #[must_use]
    pub fn materialize(&self) -> Value {
        match *self {
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::from(i),
            Self::Str(s) => Value::String(s.to_string()),
            Self::EmptyObject => Value::Object(Map::new()),
            Self::EmptyArray => Value::Array(Vec::new()),
        }
    }
}

/// One entry of a type's field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<DefaultValue>,
}

impl FieldSpec {
    /// An optional field of kind `Any` with no default.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Any,
            required: false,
            default: None,
        }
    }

    #[must_use]
    pub const fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

// =============================================================================
// TYPE DEFINITIONS
// =============================================================================

/// A schema type as declared in a module root.
#[derive(Debug, Clone, Copy)]
pub struct TypeDef {
    /// Unique logical name.
    pub name: &'static str,
    /// Direct base types, in priority order.
    pub bases: &'static [&'static str],
    /// Fields declared by this type (inherited ones are merged in later).
    pub fields: &'static [FieldSpec],
}

impl TypeDef {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            bases: &[],
            fields: &[],
        }
    }

    #[must_use]
    pub const fn bases(mut self, bases: &'static [&'static str]) -> Self {
        self.bases = bases;
        self
    }

    #[must_use]
    pub const fn fields(mut self, fields: &'static [FieldSpec]) -> Self {
        self.fields = fields;
        self
    }
}

// =============================================================================
// REGISTERED TYPE
// =============================================================================

/// A registered schema type.
///
/// Immutable after registration. Shared between objects through `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaType {
    name: &'static str,
    ancestors: Vec<&'static str>,
    fields: Vec<FieldSpec>,
}

impl SchemaType {
    /// Assemble a registered type from its precomputed parts.
    pub(crate) fn new(
        name: &'static str,
        ancestors: Vec<&'static str>,
        fields: Vec<FieldSpec>,
    ) -> Self {
        Self {
            name,
            ancestors,
            fields,
        }
    }

    /// The logical name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// All ancestors, nearest first.
    #[must_use]
    pub fn ancestors(&self) -> &[&'static str] {
        &self.ancestors
    }

    /// The merged field table: inherited fields first, overridden in place.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a declared field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// True if this type is `name` or descends from it.
    #[must_use]
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name || self.ancestors.contains(&name)
    }

    /// The dispatch fallback order: own name, ancestors, then "no type".
    #[must_use]
    pub fn dispatch_chain(&self) -> Vec<Option<&'static str>> {
        std::iter::once(self.name)
            .chain(self.ancestors.iter().copied())
            .map(Some)
            .chain(std::iter::once(None))
            .collect()
    }
}

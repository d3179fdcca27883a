//! # tessera-core
//!
//! The command-dispatch and data-synchronization engine for Tessera.
//!
//! Objects are described by typed schemas. Operations on them (loading,
//! checking, serialization, persistence) are resolved at runtime to
//! handlers keyed by operation name, object type and backend type. A push
//! pipeline applies those operations to a batch of records inside a single
//! backend transaction, resolving cross-record references on the way.
//!
//! ## Architecture
//!
//! - `registry`: static module roots, type and command registries
//! - `dispatch`: resolution with base-type fallback, nested calls, error routing
//! - `manifest`: field loading for schema objects
//! - `model`, `ingest`: record schemas and batch reference resolution
//! - `dataset`: source-to-record mapping for pulls
//! - `backend`: memory and redb adapters
//! - `store`: configuration and the push pipeline
//!
//! ## Architectural Constraints
//!
//! - Registries are built once and frozen; a store never runs with a
//!   partially valid dispatch table
//! - Handler nesting is bounded by `MAX_DISPATCH_DEPTH`
//! - No async, no network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod backend;
pub mod builtins;
pub mod dataset;
pub mod dispatch;
pub mod ingest;
pub mod manifest;
pub mod model;
pub mod object;
pub mod primitives;
pub mod registry;
pub mod schema;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Output, Record, TesseraError};

// =============================================================================
// RE-EXPORTS: Schema & Registries
// =============================================================================

pub use object::{FieldValue, Object};
pub use registry::{CommandRegistry, Discovery, ModuleRoot, TypeRegistry};
pub use schema::{DefaultValue, FieldKind, FieldSpec, SchemaType, TypeDef};

// =============================================================================
// RE-EXPORTS: Dispatch & Ingestion
// =============================================================================

pub use backend::{Backend, Connection, MemoryBackend, RedbBackend};
pub use dispatch::{Command, CommandDef, DispatchCall, Frame, Invocation};
pub use dataset::{Dataset, DatasetObject};
pub use ingest::{ClientSuppliedIds, Label};
pub use model::{Model, Property, PropertyKind};
pub use store::Store;

//! # Backends
//!
//! Named persistence endpoints. A `Backend` is opened once from its
//! configuration object and shared read-only; every unit of work runs on a
//! `Connection` obtained from `begin()`. Reads of committed data go through
//! the backend itself and never wait for a writer.
//!
//! ## Connection contract
//!
//! - `commit` and `rollback` consume the connection.
//! - Dropping a connection without committing discards its writes.
//! - Records are stored per table (one table per model) under string ids
//!   assigned by the backend.

mod memory;
mod redb_store;

pub use memory::MemoryBackend;
pub use redb_store::{METADATA_TABLE, RedbBackend};

use crate::object::Object;
use crate::types::{Record, TesseraError};
use std::fmt;

/// A configured persistence endpoint.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Configured name (`default`, ...).
    fn name(&self) -> &str;

    /// Logical backend type, used as the dispatch key.
    fn type_name(&self) -> &'static str;

    /// Open a connection scoped to one unit of work.
    fn begin(&self) -> Result<Box<dyn Connection>, TesseraError>;

    /// Read one committed record.
    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, TesseraError>;

    /// Read every committed record of a table, ordered by id.
    fn list(&self, table: &str) -> Result<Vec<(String, Record)>, TesseraError>;
}

/// One unit of work against a backend.
pub trait Connection {
    /// Create a table if it does not exist yet.
    fn create_table(&mut self, table: &str) -> Result<(), TesseraError>;

    /// Store a record.
    ///
    /// Without `id` a new id is assigned; with `id` the existing record is
    /// replaced. Returns the record's id.
    fn insert(
        &mut self,
        table: &str,
        id: Option<&str>,
        record: &Record,
    ) -> Result<String, TesseraError>;

    fn commit(self: Box<Self>) -> Result<(), TesseraError>;

    fn rollback(self: Box<Self>) -> Result<(), TesseraError>;
}

/// Open the backend described by a loaded configuration object.
///
/// The object's type selects the adapter; it must descend from `backend`.
pub fn open_backend(name: &str, config: &Object) -> Result<Box<dyn Backend>, TesseraError> {
    let schema = config.schema();
    if schema.is_a("redb") {
        let path = config.path_field("path").ok_or_else(|| {
            TesseraError::Config(format!("Backend {name:?} of type \"redb\" needs a path"))
        })?;
        return Ok(Box::new(RedbBackend::open(name, path)?));
    }
    if schema.is_a("memory") {
        return Ok(Box::new(MemoryBackend::new(name)));
    }
    Err(TesseraError::Config(format!(
        "Backend {name:?} has unsupported type {:?}",
        schema.name()
    )))
}

/// Parse a backend id into its numeric key.
pub(crate) fn parse_id(table: &str, id: &str) -> Result<u64, TesseraError> {
    id.parse()
        .map_err(|_| TesseraError::Storage(format!("Invalid id {id:?} for table {table:?}")))
}

pub(crate) fn not_found(table: &str, id: &str) -> TesseraError {
    TesseraError::Storage(format!("No record with id {id:?} in table {table:?}"))
}

//! # redb Backend
//!
//! A disk-backed backend using the redb embedded database.
//!
//! - One table per model: id (`u64`) -> record as JSON bytes
//! - A metadata table holding the id counter
//! - One `WriteTransaction` per connection; commit or abort
//! - Reads of committed data use a `ReadTransaction`
//!
//! redb allows a single writer at a time, so a second `begin()` blocks
//! until the first connection is committed, rolled back or dropped.

use super::{Backend, Connection, not_found, parse_id};
use crate::types::{Record, TesseraError};
use redb::{
    Database, ReadOnlyTable, ReadableDatabase, ReadableTable, TableDefinition, TableError,
    WriteTransaction,
};
use std::path::Path;
use std::sync::Arc;

/// Name of the table holding backend metadata. Models may not use it.
pub const METADATA_TABLE: &str = "tessera_metadata";

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new(METADATA_TABLE);

const NEXT_ID: &str = "next_id";

fn records(table: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(table)
}

fn storage(e: impl std::fmt::Display) -> TesseraError {
    TesseraError::Storage(e.to_string())
}

/// A redb database file.
#[derive(Clone)]
pub struct RedbBackend {
    name: String,
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open or create a database at the given path.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, TesseraError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| TesseraError::IoError(e.to_string()))?;

        // Initialize the metadata table if it doesn't exist
        {
            let write_txn = db.begin_write().map_err(storage)?;
            let _ = write_txn.open_table(METADATA).map_err(storage)?;
            write_txn.commit().map_err(storage)?;
        }

        Ok(Self {
            name: name.into(),
            db: Arc::new(db),
        })
    }

    /// Open a model table for reading. A table never written to reads as
    /// missing.
    fn read_table(
        &self,
        table: &str,
    ) -> Result<Option<ReadOnlyTable<u64, &'static [u8]>>, TesseraError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        match read_txn.open_table(records(table)) {
            Ok(rows) => Ok(Some(rows)),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(storage(e)),
        }
    }

    /// Reject table names the backend keeps for itself.
    pub fn check_table_name(table: &str) -> Result<(), TesseraError> {
        if table == METADATA_TABLE {
            return Err(TesseraError::Storage(format!(
                "Table name {table:?} is reserved by the redb backend"
            )));
        }
        Ok(())
    }
}

impl Backend for RedbBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &'static str {
        "redb"
    }

    fn begin(&self) -> Result<Box<dyn Connection>, TesseraError> {
        let txn = self.db.begin_write().map_err(storage)?;
        Ok(Box::new(RedbConnection { txn }))
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, TesseraError> {
        let Ok(key) = id.parse::<u64>() else {
            return Ok(None);
        };
        let Some(rows) = self.read_table(table)? else {
            return Ok(None);
        };
        let Some(data) = rows.get(key).map_err(storage)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(data.value())?))
    }

    fn list(&self, table: &str) -> Result<Vec<(String, Record)>, TesseraError> {
        let Some(rows) = self.read_table(table)? else {
            return Ok(Vec::new());
        };
        let mut result = Vec::new();
        for entry in rows.iter().map_err(storage)? {
            let (key, value) = entry.map_err(storage)?;
            let record: Record = serde_json::from_slice(value.value())?;
            result.push((key.value().to_string(), record));
        }
        Ok(result)
    }
}

struct RedbConnection {
    txn: WriteTransaction,
}

impl Connection for RedbConnection {
    fn create_table(&mut self, table: &str) -> Result<(), TesseraError> {
        RedbBackend::check_table_name(table)?;
        let _ = self.txn.open_table(records(table)).map_err(storage)?;
        Ok(())
    }

    fn insert(
        &mut self,
        table: &str,
        id: Option<&str>,
        record: &Record,
    ) -> Result<String, TesseraError> {
        RedbBackend::check_table_name(table)?;
        let bytes = serde_json::to_vec(record)?;

        let mut rows = self.txn.open_table(records(table)).map_err(storage)?;
        let key = match id {
            Some(id) => {
                let key = parse_id(table, id)?;
                if rows.get(key).map_err(storage)?.is_none() {
                    return Err(not_found(table, id));
                }
                key
            }
            None => {
                let mut meta = self.txn.open_table(METADATA).map_err(storage)?;
                let next = meta
                    .get(NEXT_ID)
                    .map_err(storage)?
                    .map(|v| v.value())
                    .unwrap_or(0)
                    .saturating_add(1);
                meta.insert(NEXT_ID, next).map_err(storage)?;
                next
            }
        };
        rows.insert(key, bytes.as_slice()).map_err(storage)?;
        Ok(key.to_string())
    }

    fn commit(self: Box<Self>) -> Result<(), TesseraError> {
        self.txn.commit().map_err(storage)
    }

    fn rollback(self: Box<Self>) -> Result<(), TesseraError> {
        self.txn.abort().map_err(storage)
    }
}

//! In-memory backend.
//!
//! Each connection stages its own writes; `commit` merges them into the
//! shared state under the lock. Ids come from the shared counter, so
//! concurrent connections never hand out the same id. An id reserved by a
//! rolled back connection is not reused.

use super::{Backend, Connection, not_found, parse_id};
use crate::types::{Record, TesseraError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

type Tables = BTreeMap<String, BTreeMap<u64, Record>>;

#[derive(Debug, Default)]
struct MemoryState {
    tables: Tables,
    next_id: u64,
}

/// Process-local backend, mostly for tests and dry runs.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    name: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }
}

fn lock(state: &Mutex<MemoryState>) -> Result<MutexGuard<'_, MemoryState>, TesseraError> {
    state
        .lock()
        .map_err(|_| TesseraError::Storage("memory backend lock poisoned".to_string()))
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &'static str {
        "memory"
    }

    fn begin(&self) -> Result<Box<dyn Connection>, TesseraError> {
        Ok(Box::new(MemoryConnection {
            staged: Tables::new(),
            shared: Arc::clone(&self.state),
        }))
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, TesseraError> {
        let Ok(key) = id.parse::<u64>() else {
            return Ok(None);
        };
        Ok(lock(&self.state)?
            .tables
            .get(table)
            .and_then(|rows| rows.get(&key))
            .cloned())
    }

    fn list(&self, table: &str) -> Result<Vec<(String, Record)>, TesseraError> {
        Ok(lock(&self.state)?
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(key, record)| (key.to_string(), record.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

struct MemoryConnection {
    staged: Tables,
    shared: Arc<Mutex<MemoryState>>,
}

impl MemoryConnection {
    fn exists(&self, table: &str, key: u64) -> Result<bool, TesseraError> {
        if self
            .staged
            .get(table)
            .is_some_and(|rows| rows.contains_key(&key))
        {
            return Ok(true);
        }
        Ok(lock(&self.shared)?
            .tables
            .get(table)
            .is_some_and(|rows| rows.contains_key(&key)))
    }
}

impl Connection for MemoryConnection {
    fn create_table(&mut self, table: &str) -> Result<(), TesseraError> {
        self.staged.entry(table.to_string()).or_default();
        Ok(())
    }

    fn insert(
        &mut self,
        table: &str,
        id: Option<&str>,
        record: &Record,
    ) -> Result<String, TesseraError> {
        let key = match id {
            Some(id) => {
                let key = parse_id(table, id)?;
                if !self.exists(table, key)? {
                    return Err(not_found(table, id));
                }
                key
            }
            None => {
                let mut shared = lock(&self.shared)?;
                shared.next_id = shared.next_id.saturating_add(1);
                shared.next_id
            }
        };
        self.staged
            .entry(table.to_string())
            .or_default()
            .insert(key, record.clone());
        Ok(key.to_string())
    }

    fn commit(self: Box<Self>) -> Result<(), TesseraError> {
        let this = *self;
        let mut shared = lock(&this.shared)?;
        for (table, rows) in this.staged {
            shared.tables.entry(table).or_default().extend(rows);
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), TesseraError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    #[test]
    fn commit_publishes_staged_writes() {
        let backend = MemoryBackend::new("default");
        let mut conn = backend.begin().expect("begin");
        let id = conn
            .insert("report", None, &record(json!({ "status": "ok" })))
            .expect("insert");
        assert_eq!(id, "1");
        assert!(backend.get("report", &id).expect("get").is_none());

        conn.commit().expect("commit");
        assert_eq!(
            backend.get("report", &id).expect("get"),
            Some(record(json!({ "status": "ok" })))
        );
    }

    #[test]
    fn dropped_connection_discards_writes() {
        let backend = MemoryBackend::new("default");
        {
            let mut conn = backend.begin().expect("begin");
            conn.insert("report", None, &Record::new()).expect("insert");
        }
        assert!(backend.list("report").expect("list").is_empty());
    }

    #[test]
    fn overlapping_connections_keep_both_commits() {
        let backend = MemoryBackend::new("default");
        let mut first = backend.begin().expect("begin");
        let mut second = backend.begin().expect("begin");

        let a = first
            .insert("report", None, &record(json!({ "n": 1 })))
            .expect("insert");
        let b = second
            .insert("report", None, &record(json!({ "n": 2 })))
            .expect("insert");
        assert_ne!(a, b);

        first.commit().expect("commit");
        second.commit().expect("commit");

        let ids: Vec<String> = backend
            .list("report")
            .expect("list")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn update_requires_existing_record() {
        let backend = MemoryBackend::new("default");
        let mut conn = backend.begin().expect("begin");
        let err = conn
            .insert("report", Some("7"), &Record::new())
            .expect_err("missing");
        assert!(matches!(err, TesseraError::Storage(_)));

        let id = conn.insert("report", None, &Record::new()).expect("insert");
        let updated = record(json!({ "status": "done" }));
        assert_eq!(
            conn.insert("report", Some(&id), &updated).expect("update"),
            id
        );
        conn.commit().expect("commit");
        assert_eq!(backend.list("report").expect("list"), vec![(id.clone(), updated)]);

        let mut conn = backend.begin().expect("begin");
        conn.insert("report", Some(&id), &Record::new())
            .expect("committed record updates");
    }
}

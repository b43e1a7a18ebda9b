//! In-memory reference implementation of the backing store.
//!
//! `MemoryStore` keeps rows in a map keyed by (kind, id) and allocates ids
//! from a monotonic counter. Every `get` builds a brand-new `Record` from a
//! clone of the stored fields, so fetched instances never alias each other
//! or the stored state.

use pristine_proto::{Error, FieldMap, ObjectStore, Record, RecordId, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-memory object store for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<(String, RecordId), FieldMap>>,
    next_id: Mutex<u64>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored rows.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Returns true if the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<(String, RecordId), FieldMap>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_id(&self) -> RecordId {
        let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
        *next += 1;
        RecordId::new(*next)
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, kind: &str, id: RecordId) -> Result<Record> {
        let table = self.table();
        let fields = table
            .get(&(kind.to_string(), id))
            .ok_or_else(|| Error::RecordNotFound {
                kind: kind.to_string(),
                id,
            })?;
        Ok(Record {
            kind: kind.to_string(),
            id: Some(id),
            fields: fields.clone(),
        })
    }

    fn update(&self, kind: &str, id: RecordId, fields: &FieldMap) -> Result<()> {
        let mut table = self.table();
        let row = table
            .get_mut(&(kind.to_string(), id))
            .ok_or_else(|| Error::RecordNotFound {
                kind: kind.to_string(),
                id,
            })?;
        for (name, value) in fields {
            row.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    fn insert(&self, record: &Record) -> Result<RecordId> {
        let id = self.allocate_id();
        self.table()
            .insert((record.kind.clone(), id), record.fields.clone());
        Ok(id)
    }
}

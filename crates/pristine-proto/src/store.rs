//! Backing store contract.
//!
//! The persistent store is an external collaborator: an opaque key-addressed
//! object store. Pristine only requires fetching a fresh representation of an
//! entity by identity, writing fields by identity, and inserting new records.

use crate::{FieldMap, Record, RecordId, Result};

/// Opaque key-addressed object store.
///
/// Implementations must return a fresh, independent `Record` from `get`:
/// no aliasing with previously fetched instances, so that store-side state
/// and in-memory state can diverge and be compared.
pub trait ObjectStore: Send + Sync {
    /// Fetches the current stored state of a record.
    fn get(&self, kind: &str, id: RecordId) -> Result<Record>;

    /// Writes fields to the stored record, leaving other fields untouched.
    fn update(&self, kind: &str, id: RecordId, fields: &FieldMap) -> Result<()>;

    /// Inserts a record and returns its newly assigned identity.
    ///
    /// The caller's record is not mutated; the returned id must be applied
    /// by the caller if it wants a saved in-memory instance.
    fn insert(&self, record: &Record) -> Result<RecordId>;
}

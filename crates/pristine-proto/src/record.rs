//! Record and fixture value types.
//!
//! A `Record` is an entity the way the backing store sees it: an entity kind,
//! an optional persistent identity, and a map of field values. A `Fixture` is
//! whatever a test class binds to a class attribute slot - a persisted record
//! or a plain computed value. Both are deep-copied by `Clone`: the value tree
//! is acyclic by construction, so copies are always independent and finite.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Ordered map of field names to values.
///
/// Ordered so that serialized forms and mismatch diagnostics are
/// deterministic.
pub type FieldMap = BTreeMap<String, Value>;

/// Persistent identity of a stored record.
///
/// Distinct from in-memory identity: two independent `Record` values may
/// share a `RecordId` when they represent the same durable row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    /// Creates a record id from a raw key.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw key value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An entity instance backed by the object store.
///
/// `id` is `None` until the record has been inserted; `kind` names the entity
/// type and scopes the persistent identity (ids are unique per kind, not
/// globally).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Entity kind, e.g. `"project"`.
    pub kind: String,

    /// Persistent identity, assigned by the store on insert.
    pub id: Option<RecordId>,

    /// Field values.
    #[serde(default)]
    pub fields: FieldMap,
}

impl Record {
    /// Creates an unsaved record of the given kind with no fields.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            fields: FieldMap::new(),
        }
    }

    /// Adds a field value, builder style.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns a field value, if present.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns a field as a string slice, if present and a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Sets a field value in memory.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Returns true once the record has a persistent identity.
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    /// Returns the persistent identity as a (kind, id) pair, if saved.
    pub fn identity(&self) -> Option<(&str, RecordId)> {
        self.id.map(|id| (self.kind.as_str(), id))
    }
}

/// A value bound to a class attribute slot.
///
/// Fixtures created in one-time setup may be persisted entities or plain
/// values (strings, numbers, collections); both are captured, snapshotted,
/// and restored uniformly.
#[derive(Debug, Clone, PartialEq)]
pub enum Fixture {
    /// A persisted entity.
    Record(Record),
    /// A plain value with no persistent identity.
    Value(Value),
}

impl Fixture {
    /// Returns the inner record, if this fixture is one.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            Self::Value(_) => None,
        }
    }

    /// Returns the inner record mutably, if this fixture is one.
    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Self::Record(record) => Some(record),
            Self::Value(_) => None,
        }
    }

    /// Returns the inner plain value, if this fixture is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Record(_) => None,
            Self::Value(value) => Some(value),
        }
    }
}

impl From<Record> for Fixture {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<Value> for Fixture {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Fixture {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<String> for Fixture {
    fn from(value: String) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i32> for Fixture {
    fn from(value: i32) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i64> for Fixture {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<bool> for Fixture {
    fn from(value: bool) -> Self {
        Self::Value(Value::from(value))
    }
}

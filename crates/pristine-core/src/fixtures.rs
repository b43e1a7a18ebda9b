//! Fixture snapshot and restore.
//!
//! Fixtures are created once per test class by a one-time setup routine, for
//! performance, but must look freshly constructed to every test, for
//! correctness. The engine diffs the class attribute slots around the setup
//! call, deep-copies every added or changed value into a snapshot, and
//! rebinds fresh copies before each test. Capture is diff-based rather than
//! assignment-intercepting, so it is agnostic to what was assigned:
//! persisted records, plain values, and collections are all handled
//! uniformly, and only the final value of each slot matters.
//!
//! # Example
//!
//! ```
//! use pristine_core::{ClassState, FixtureSet, Record};
//!
//! let mut fixtures = FixtureSet::new();
//! let mut state = ClassState::new();
//!
//! fixtures
//!     .run_one_time_setup(&mut state, |state| {
//!         state.set("project", Record::new("project").with_field("name", "initial"));
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! // A test mutates the live slot...
//! state.record_mut("project").unwrap().set_field("name", "changed");
//!
//! // ...and the next test's setup sees the pristine value again.
//! fixtures.restore(&mut state);
//! assert_eq!(state.record("project").unwrap().str_field("name"), Some("initial"));
//! ```

use pristine_proto::{Error, FieldMap, Fixture, ObjectStore, Record, RecordId, Result};
use serde_json::Value;
use tracing::{debug, trace};

/// Live class attribute slots observed by test bodies.
///
/// Slots preserve insertion order so capture and restore iterate
/// deterministically. Lookups are linear; fixture tables are small.
#[derive(Debug, Clone, Default)]
pub struct ClassState {
    slots: Vec<(String, Fixture)>,
}

impl ClassState {
    /// Creates an empty slot table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a slot, replacing any existing value and keeping its position.
    pub fn set(&mut self, name: impl Into<String>, fixture: impl Into<Fixture>) {
        let name = name.into();
        let fixture = fixture.into();
        match self.slots.iter_mut().find(|(slot, _)| *slot == name) {
            Some((_, value)) => *value = fixture,
            None => self.slots.push((name, fixture)),
        }
    }

    /// Returns a slot value, if bound.
    pub fn get(&self, name: &str) -> Option<&Fixture> {
        self.slots
            .iter()
            .find(|(slot, _)| slot == name)
            .map(|(_, value)| value)
    }

    /// Returns a slot value mutably, if bound.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Fixture> {
        self.slots
            .iter_mut()
            .find(|(slot, _)| slot == name)
            .map(|(_, value)| value)
    }

    /// Returns the record bound to a slot, if it is one.
    pub fn record(&self, name: &str) -> Option<&Record> {
        self.get(name).and_then(Fixture::as_record)
    }

    /// Returns the record bound to a slot mutably, if it is one.
    pub fn record_mut(&mut self, name: &str) -> Option<&mut Record> {
        self.get_mut(name).and_then(Fixture::as_record_mut)
    }

    /// Returns slot names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the number of bound slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no slots are bound.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn entries(&self) -> &[(String, Fixture)] {
        &self.slots
    }
}

/// Per-class fixture registry: snapshots captured after one-time setup.
///
/// The stored values are the restoration source of truth for the life of the
/// test class. They are never handed out by reference; every restore installs
/// a fresh deep copy, so no test can corrupt the snapshot through the live
/// slots.
#[derive(Debug, Default)]
pub struct FixtureSet {
    snapshots: Vec<(String, Fixture)>,
}

impl FixtureSet {
    /// Creates an empty fixture set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the one-time setup routine and captures the fixtures it created.
    ///
    /// Clones the slot table before the call, runs `setup`, then diffs: every
    /// slot that was added or changed is deep-copied into the snapshot.
    /// Capture merges by key, so layered setup routines (a subclass calling
    /// its base) and accidental double wrapping never double-capture. Setup
    /// errors propagate before anything is captured.
    pub fn run_one_time_setup(
        &mut self,
        state: &mut ClassState,
        setup: impl FnOnce(&mut ClassState) -> Result<()>,
    ) -> Result<()> {
        let before = state.clone();
        setup(state)?;
        self.capture_changes(&before, state);
        Ok(())
    }

    /// Rebinds every snapshotted slot to a fresh deep copy.
    ///
    /// Invoked before each test method. The rebound value is structurally
    /// equal to the snapshot but shares no storage with it or with the
    /// previous test's live value.
    pub fn restore(&self, state: &mut ClassState) {
        for (name, snapshot) in &self.snapshots {
            trace!(fixture = %name, "Restoring fixture");
            state.set(name.clone(), snapshot.clone());
        }
    }

    /// Removes the snapshot entry matching `probe`, excluding it from all
    /// future restores.
    ///
    /// Records match by persistent identity: same kind and same id when the
    /// probe is saved, same kind and structurally equal fields when it is
    /// not. Plain values match structurally. Returns the removed slot name
    /// for diagnostics; a probe matching nothing is a harmless no-op.
    pub fn forget(&mut self, probe: &Fixture) -> Option<String> {
        let index = self
            .snapshots
            .iter()
            .position(|(_, snapshot)| fixtures_match(snapshot, probe))?;
        let (name, _) = self.snapshots.remove(index);
        debug!(fixture = %name, "Forgot fixture");
        Some(name)
    }

    /// `forget` for a record probe.
    pub fn forget_record(&mut self, probe: &Record) -> Option<String> {
        self.forget(&Fixture::Record(probe.clone()))
    }

    /// Returns true if a snapshot exists for the slot name.
    pub fn contains(&self, name: &str) -> bool {
        self.snapshots.iter().any(|(slot, _)| slot == name)
    }

    /// Returns snapshotted slot names in first-capture order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.snapshots.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the number of snapshotted fixtures.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    fn capture_changes(&mut self, before: &ClassState, after: &ClassState) {
        let mut captured = 0usize;
        for (name, value) in after.entries() {
            if before.get(name) != Some(value) {
                trace!(fixture = %name, "Capturing fixture");
                self.put(name.clone(), value.clone());
                captured += 1;
            }
        }
        debug!(captured, total = self.snapshots.len(), "Captured fixtures after one-time setup");
    }

    fn put(&mut self, name: String, fixture: Fixture) {
        match self.snapshots.iter_mut().find(|(slot, _)| *slot == name) {
            Some((_, value)) => *value = fixture,
            None => self.snapshots.push((name, fixture)),
        }
    }
}

fn fixtures_match(snapshot: &Fixture, probe: &Fixture) -> bool {
    match (snapshot, probe) {
        (Fixture::Record(snapshot), Fixture::Record(probe)) => {
            if snapshot.kind != probe.kind {
                return false;
            }
            match probe.id {
                Some(id) => snapshot.id == Some(id),
                // Unsaved records have no persistent identity; structural
                // equality is the closest analogue in a value model.
                None => snapshot.id.is_none() && snapshot.fields == probe.fields,
            }
        }
        (Fixture::Value(snapshot), Fixture::Value(probe)) => snapshot == probe,
        _ => false,
    }
}

/// Clones a record into a new, independent store entry.
///
/// Deep-copies `record`, clears its persistent identity, applies `overrides`,
/// inserts the copy, and returns it carrying its fresh id. The original is
/// unmodified in memory and in the store.
pub fn clone_record(
    store: &dyn ObjectStore,
    record: &Record,
    overrides: FieldMap,
) -> Result<Record> {
    let mut copy = record.clone();
    copy.id = None;
    for (name, value) in overrides {
        copy.fields.insert(name, value);
    }
    let id = store.insert(&copy)?;
    copy.id = Some(id);
    debug!(kind = %copy.kind, id = %id, "Cloned record");
    Ok(copy)
}

/// Writes fields to the store entry behind `record`, bypassing the in-memory
/// object.
///
/// Used to simulate out-of-band mutation: the in-memory record keeps its
/// stale values until explicitly reloaded.
pub fn update_record(store: &dyn ObjectStore, record: &Record, fields: &FieldMap) -> Result<()> {
    let (kind, id) = saved_identity(record)?;
    store.update(kind, id, fields)
}

/// Fetches a fresh in-memory record from the store's current state.
///
/// Does not mutate `record`; the caller decides what to do with the fresh
/// instance.
pub fn reload(store: &dyn ObjectStore, record: &Record) -> Result<Record> {
    let (kind, id) = saved_identity(record)?;
    store.get(kind, id)
}

/// Asserts that the stored state of `record` matches the expected fields.
///
/// Reloads from the store first when the record is saved, then checks each
/// expected field; the first divergence fails with the field name, expected
/// value, and actual value.
pub fn assert_record_fields(
    store: &dyn ObjectStore,
    record: &Record,
    expected: &FieldMap,
) -> Result<()> {
    let current = if record.is_saved() {
        reload(store, record)?
    } else {
        record.clone()
    };
    for (field, expected_value) in expected {
        let actual = current.field(field).cloned().unwrap_or(Value::Null);
        if &actual != expected_value {
            return Err(Error::FieldMismatch {
                field: field.clone(),
                expected: expected_value.clone(),
                actual,
            });
        }
    }
    Ok(())
}

fn saved_identity(record: &Record) -> Result<(&str, RecordId)> {
    record.identity().ok_or_else(|| Error::MissingId {
        kind: record.kind.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use serde_json::json;

    fn setup_state(store: &MemoryStore) -> (FixtureSet, ClassState) {
        let mut fixtures = FixtureSet::new();
        let mut state = ClassState::new();
        fixtures
            .run_one_time_setup(&mut state, |state| {
                let mut project = Record::new("project").with_field("name", "initial");
                project.id = Some(store.insert(&project).unwrap());
                state.set("project", project);
                state.set("attr", "a");
                Ok(())
            })
            .unwrap();
        (fixtures, state)
    }

    #[test]
    fn test_capture_diffs_added_slots() {
        let store = MemoryStore::new();
        let (fixtures, _state) = setup_state(&store);

        assert_eq!(fixtures.len(), 2);
        let names: Vec<_> = fixtures.names().collect();
        assert_eq!(names, vec!["project", "attr"]);
    }

    #[test]
    fn test_capture_diffs_changed_slots_only() {
        let mut fixtures = FixtureSet::new();
        let mut state = ClassState::new();
        state.set("kept", "same");
        state.set("replaced", "old");

        fixtures
            .run_one_time_setup(&mut state, |state| {
                state.set("replaced", "new");
                state.set("added", 1);
                Ok(())
            })
            .unwrap();

        // "kept" was present before setup and untouched, so it is not a fixture
        assert!(!fixtures.contains("kept"));
        assert!(fixtures.contains("replaced"));
        assert!(fixtures.contains("added"));
    }

    #[test]
    fn test_double_capture_merges_by_key() {
        let mut fixtures = FixtureSet::new();
        let mut state = ClassState::new();

        fixtures
            .run_one_time_setup(&mut state, |state| {
                state.set("project", Record::new("project").with_field("name", "base"));
                Ok(())
            })
            .unwrap();
        // Layered setup: runs again, overwrites one slot, adds another
        fixtures
            .run_one_time_setup(&mut state, |state| {
                state.set("project", Record::new("project").with_field("name", "derived"));
                state.set("task", Record::new("task"));
                Ok(())
            })
            .unwrap();

        assert_eq!(fixtures.len(), 2);
        let mut restored = ClassState::new();
        fixtures.restore(&mut restored);
        assert_eq!(
            restored.record("project").unwrap().str_field("name"),
            Some("derived")
        );
    }

    #[test]
    fn test_setup_error_captures_nothing() {
        let mut fixtures = FixtureSet::new();
        let mut state = ClassState::new();

        let err = fixtures
            .run_one_time_setup(&mut state, |state| {
                state.set("orphan", 1);
                Err(Error::Store("setup failed".to_string()))
            })
            .unwrap_err();

        assert!(matches!(err, Error::Store(_)));
        assert!(fixtures.is_empty());
    }

    #[test]
    fn test_restore_rebinds_fresh_copies() {
        let store = MemoryStore::new();
        let (fixtures, mut state) = setup_state(&store);

        state.record_mut("project").unwrap().set_field("name", "changed");
        state.set("attr", "b");

        fixtures.restore(&mut state);

        assert_eq!(state.record("project").unwrap().str_field("name"), Some("initial"));
        assert_eq!(state.get("attr").unwrap().as_value(), Some(&json!("a")));
    }

    #[test]
    fn test_restore_does_not_alias_snapshot() {
        let store = MemoryStore::new();
        let (fixtures, mut state) = setup_state(&store);

        // Two consecutive restores hand out independent copies
        fixtures.restore(&mut state);
        state.record_mut("project").unwrap().set_field("name", "first pass");
        fixtures.restore(&mut state);

        assert_eq!(state.record("project").unwrap().str_field("name"), Some("initial"));
    }

    #[test]
    fn test_forget_by_persistent_identity() {
        let store = MemoryStore::new();
        let (mut fixtures, mut state) = setup_state(&store);

        let probe = state.record("project").unwrap().clone();
        let removed = fixtures.forget_record(&probe);
        assert_eq!(removed.as_deref(), Some("project"));

        // Forgotten slots are never restored again
        state.record_mut("project").unwrap().set_field("name", "mine now");
        fixtures.restore(&mut state);
        assert_eq!(state.record("project").unwrap().str_field("name"), Some("mine now"));
    }

    #[test]
    fn test_forget_unknown_is_noop() {
        let store = MemoryStore::new();
        let (mut fixtures, _state) = setup_state(&store);

        let mut stranger = Record::new("project").with_field("name", "other");
        stranger.id = Some(RecordId::new(999));
        assert_eq!(fixtures.forget_record(&stranger), None);
        assert_eq!(fixtures.len(), 2);

        // Forgetting twice is equally harmless
        let probe = Record::new("project");
        let _ = fixtures.forget_record(&probe);
    }

    #[test]
    fn test_forget_unsaved_matches_structurally() {
        let mut fixtures = FixtureSet::new();
        let mut state = ClassState::new();
        fixtures
            .run_one_time_setup(&mut state, |state| {
                state.set("draft", Record::new("task").with_field("name", "draft"));
                Ok(())
            })
            .unwrap();

        let probe = Record::new("task").with_field("name", "draft");
        assert_eq!(fixtures.forget_record(&probe).as_deref(), Some("draft"));
    }

    #[test]
    fn test_clone_record_independence() {
        let store = MemoryStore::new();
        let mut task = Record::new("task")
            .with_field("name", "initial")
            .with_field("visible", false);
        task.id = Some(store.insert(&task).unwrap());

        let cloned = clone_record(
            &store,
            &task,
            FieldMap::from([("name".to_string(), json!("unique name"))]),
        )
        .unwrap();

        assert_ne!(cloned.id, task.id);
        assert_eq!(cloned.str_field("name"), Some("unique name"));
        assert_eq!(cloned.field("visible"), task.field("visible"));
        // Original untouched in memory and in the store
        assert_eq!(task.str_field("name"), Some("initial"));
        assert_eq!(reload(&store, &task).unwrap().str_field("name"), Some("initial"));
    }

    #[test]
    fn test_update_record_store_only() {
        let store = MemoryStore::new();
        let mut project = Record::new("project").with_field("name", "initial");
        project.id = Some(store.insert(&project).unwrap());

        update_record(
            &store,
            &project,
            &FieldMap::from([("name".to_string(), json!("modified"))]),
        )
        .unwrap();

        // In-memory value unchanged until an explicit reload
        assert_eq!(project.str_field("name"), Some("initial"));
        let fresh = reload(&store, &project).unwrap();
        assert_eq!(fresh.str_field("name"), Some("modified"));
    }

    #[test]
    fn test_update_unsaved_record_fails() {
        let store = MemoryStore::new();
        let draft = Record::new("project");
        let err = update_record(&store, &draft, &FieldMap::new()).unwrap_err();
        assert!(matches!(err, Error::MissingId { .. }));
    }

    #[test]
    fn test_assert_record_fields_reloads_first() {
        let store = MemoryStore::new();
        let mut project = Record::new("project").with_field("name", "initial");
        project.id = Some(store.insert(&project).unwrap());

        update_record(
            &store,
            &project,
            &FieldMap::from([("name".to_string(), json!("modified"))]),
        )
        .unwrap();

        // Asserting against the stale in-memory name fails...
        let err = assert_record_fields(
            &store,
            &project,
            &FieldMap::from([("name".to_string(), json!("initial"))]),
        )
        .unwrap_err();
        match err {
            Error::FieldMismatch { field, expected, actual } => {
                assert_eq!(field, "name");
                assert_eq!(expected, json!("initial"));
                assert_eq!(actual, json!("modified"));
            }
            other => panic!("Unexpected error: {other}"),
        }

        // ...and the stored value passes
        assert_record_fields(
            &store,
            &project,
            &FieldMap::from([("name".to_string(), json!("modified"))]),
        )
        .unwrap();
    }

    #[test]
    fn test_assert_record_fields_unsaved_checks_memory() {
        let store = MemoryStore::new();
        let draft = Record::new("project").with_field("name", "draft");

        assert_record_fields(
            &store,
            &draft,
            &FieldMap::from([("name".to_string(), json!("draft"))]),
        )
        .unwrap();

        let err = assert_record_fields(
            &store,
            &draft,
            &FieldMap::from([("missing".to_string(), json!(1))]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::FieldMismatch { .. }));
    }
}

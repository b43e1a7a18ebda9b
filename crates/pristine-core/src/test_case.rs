//! Test case composition.
//!
//! `IsolatedCase` wires the fixture engine and the virtual clock into the
//! standard test lifecycle. The host harness calls `one_time_setup` once per
//! class, `setup` before each test method, and `teardown` after each test
//! method regardless of outcome. Test bodies go through the pass-through
//! surface for fixture access, time travel, and store helpers.
//!
//! # Example
//!
//! ```
//! use pristine_core::testing::MemoryStore;
//! use pristine_core::{IsolatedCase, Record};
//! use std::sync::Arc;
//!
//! let mut case = IsolatedCase::new(Arc::new(MemoryStore::new()));
//! case.one_time_setup(|state, store| {
//!     let mut project = Record::new("project").with_field("name", "initial");
//!     project.id = Some(store.insert(&project)?);
//!     state.set("project", project);
//!     Ok(())
//! })
//! .unwrap();
//!
//! // First test mutates the fixture
//! case.setup().unwrap();
//! case.record_mut("project").unwrap().set_field("name", "changed");
//! case.teardown().unwrap();
//!
//! // Second test sees the pristine state
//! case.setup().unwrap();
//! assert_eq!(case.record("project").unwrap().str_field("name"), Some("initial"));
//! case.teardown().unwrap();
//! ```

use crate::clock::{self, ActiveClock, VirtualClock};
use crate::fixtures::{self, ClassState, FixtureSet};
use crate::patch::PatchRegistry;
use chrono::{DateTime, Duration, Utc};
use pristine_proto::{Error, FieldMap, Fixture, ObjectStore, Record, Result, TargetPath};
use std::sync::Arc;
use tracing::debug;

/// A test class with snapshot-isolated fixtures and a virtual clock.
pub struct IsolatedCase {
    state: ClassState,
    fixtures: FixtureSet,
    patches: Arc<PatchRegistry>,
    store: Arc<dyn ObjectStore>,
    clock: Option<ActiveClock>,
}

impl IsolatedCase {
    /// Creates a case with its own patch registry.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_registry(store, PatchRegistry::shared())
    }

    /// Creates a case sharing an existing patch registry.
    ///
    /// The registry is passed in rather than taken from ambient state so
    /// independent test classes stay independent.
    pub fn with_registry(store: Arc<dyn ObjectStore>, patches: Arc<PatchRegistry>) -> Self {
        Self {
            state: ClassState::new(),
            fixtures: FixtureSet::new(),
            patches,
            store,
            clock: None,
        }
    }

    /// Runs the class-level setup routine and captures the fixtures it
    /// created.
    ///
    /// Invoked once per class, before any test method. Errors fail the whole
    /// class.
    pub fn one_time_setup(
        &mut self,
        setup: impl FnOnce(&mut ClassState, &dyn ObjectStore) -> Result<()>,
    ) -> Result<()> {
        let store = Arc::clone(&self.store);
        self.fixtures
            .run_one_time_setup(&mut self.state, |state| setup(state, store.as_ref()))
    }

    /// Per-test setup hook: restores fixtures, then starts a fresh virtual
    /// clock seeded with the real current instant.
    ///
    /// Clock activation failure fails the test here, at setup - a
    /// time-dependent test must never silently run against real time.
    pub fn setup(&mut self) -> Result<()> {
        self.fixtures.restore(&mut self.state);
        let clock = VirtualClock::new().activate(Arc::clone(&self.patches))?;
        self.clock = Some(clock);
        debug!("Test setup complete");
        Ok(())
    }

    /// Per-test teardown hook: stops the virtual clock.
    ///
    /// Must run after every test method regardless of outcome.
    pub fn teardown(&mut self) -> Result<()> {
        if let Some(clock) = self.clock.take() {
            clock.deactivate()?;
        }
        debug!("Test teardown complete");
        Ok(())
    }

    /// Returns the live class attribute slots.
    pub fn state(&self) -> &ClassState {
        &self.state
    }

    /// Returns the live class attribute slots mutably.
    pub fn state_mut(&mut self) -> &mut ClassState {
        &mut self.state
    }

    /// Returns the record bound to a slot, if it is one.
    pub fn record(&self, name: &str) -> Option<&Record> {
        self.state.record(name)
    }

    /// Returns the record bound to a slot mutably, if it is one.
    pub fn record_mut(&mut self, name: &str) -> Option<&mut Record> {
        self.state.record_mut(name)
    }

    /// Returns the shared patch registry.
    pub fn patches(&self) -> &Arc<PatchRegistry> {
        &self.patches
    }

    /// Returns the backing store.
    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    // ── Clock surface ────────────────────────────────────────────────────

    /// Returns the virtual clock's current instant.
    pub fn now(&self) -> Result<DateTime<Utc>> {
        Ok(self.active_clock()?.now())
    }

    /// Sets the virtual clock to a specific instant.
    pub fn set_now(&self, instant: DateTime<Utc>) -> Result<()> {
        self.active_clock()?.set(instant);
        Ok(())
    }

    /// Moves the virtual clock by a delta.
    pub fn advance(&self, delta: Duration) -> Result<()> {
        self.active_clock()?.advance(delta);
        Ok(())
    }

    /// Runs `work` against real time, with the clock patches suspended.
    pub fn suspend_clock<T>(&mut self, work: impl FnOnce() -> Result<T>) -> Result<T> {
        let clock = self
            .clock
            .as_mut()
            .ok_or_else(|| Error::PatchNotActive(TargetPath::new(clock::NOW_TARGET)))?;
        clock.suspend(work)
    }

    fn active_clock(&self) -> Result<&ActiveClock> {
        self.clock
            .as_ref()
            .ok_or_else(|| Error::PatchNotActive(TargetPath::new(clock::NOW_TARGET)))
    }

    // ── Fixture surface ──────────────────────────────────────────────────

    /// Excludes the matching fixture from all future restores.
    ///
    /// Returns the removed slot name; `None` means nothing matched, which is
    /// harmless.
    pub fn forget(&mut self, probe: &Fixture) -> Option<String> {
        self.fixtures.forget(probe)
    }

    /// `forget` for a record probe.
    pub fn forget_record(&mut self, probe: &Record) -> Option<String> {
        self.fixtures.forget_record(probe)
    }

    /// Clones a record into a new, independent store entry.
    pub fn clone_record(&self, record: &Record, overrides: FieldMap) -> Result<Record> {
        fixtures::clone_record(self.store.as_ref(), record, overrides)
    }

    /// Writes fields to the store only, leaving the in-memory record stale.
    pub fn update_record(&self, record: &Record, fields: &FieldMap) -> Result<()> {
        fixtures::update_record(self.store.as_ref(), record, fields)
    }

    /// Fetches a fresh record from the store's current state.
    pub fn reload(&self, record: &Record) -> Result<Record> {
        fixtures::reload(self.store.as_ref(), record)
    }

    /// Asserts stored fields match, reloading first when the record is saved.
    pub fn assert_record_fields(&self, record: &Record, expected: &FieldMap) -> Result<()> {
        fixtures::assert_record_fields(self.store.as_ref(), record, expected)
    }
}

impl std::fmt::Debug for IsolatedCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedCase")
            .field("fixtures", &self.fixtures)
            .field("clock_active", &self.clock.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use serde_json::json;

    fn new_case() -> IsolatedCase {
        let mut case = IsolatedCase::new(Arc::new(MemoryStore::new()));
        case.one_time_setup(|state, store| {
            let mut project = Record::new("project").with_field("name", "initial");
            project.id = Some(store.insert(&project)?);
            state.set("project", project);
            state.set("attr", "a");
            Ok(())
        })
        .unwrap();
        case
    }

    #[test]
    fn test_setup_restores_and_starts_clock() {
        let mut case = new_case();
        case.setup().unwrap();

        assert_eq!(case.patches().active_count(), 2);
        let first = case.now().unwrap();
        let second = case.now().unwrap();
        assert_eq!(first, second);

        case.teardown().unwrap();
        assert_eq!(case.patches().active_count(), 0);
    }

    #[test]
    fn test_clock_unavailable_outside_test() {
        let case = new_case();
        assert!(matches!(case.now(), Err(Error::PatchNotActive(_))));
        assert!(matches!(
            case.set_now(Utc::now()),
            Err(Error::PatchNotActive(_))
        ));
    }

    #[test]
    fn test_mutations_reset_between_tests() {
        let mut case = new_case();

        case.setup().unwrap();
        case.record_mut("project").unwrap().set_field("name", "changed");
        case.state_mut().set("attr", "b");
        case.teardown().unwrap();

        case.setup().unwrap();
        assert_eq!(case.record("project").unwrap().str_field("name"), Some("initial"));
        assert_eq!(case.state().get("attr").unwrap().as_value(), Some(&json!("a")));
        case.teardown().unwrap();
    }

    #[test]
    fn test_each_test_gets_fresh_clock() {
        let mut case = new_case();

        case.setup().unwrap();
        let frozen = case.now().unwrap();
        case.advance(Duration::days(30)).unwrap();
        assert_eq!(case.now().unwrap(), frozen + Duration::days(30));
        case.teardown().unwrap();

        // Next test starts from real time again, not 30 days ahead
        case.setup().unwrap();
        assert!(case.now().unwrap() < frozen + Duration::days(29));
        case.teardown().unwrap();
    }

    #[test]
    fn test_teardown_without_setup_is_harmless() {
        let mut case = new_case();
        case.teardown().unwrap();
    }
}

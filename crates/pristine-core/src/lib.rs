//! # pristine-core
//!
//! Test-isolation engine for the Pristine toolkit.
//!
//! This crate provides:
//! - Diff-based fixture capture and per-test snapshot restore
//! - A virtual clock substituting a controllable time source during tests
//! - Patch lifecycle management with scoped suspension
//! - Namespaced settings overrides built on patches
//! - `IsolatedCase`, the thin composition wiring it all into test hooks

pub mod clock;
pub mod fixtures;
mod patch;
pub mod settings;
mod suspend;
mod test_case;
pub mod testing;

pub use clock::{ActiveClock, VirtualClock};
pub use fixtures::{ClassState, FixtureSet};
pub use patch::{Patch, PatchRegistry, Replacement};
pub use settings::{OverrideGuard, SettingsOverride};
pub use suspend::{Suspension, with_suspended};
pub use test_case::IsolatedCase;

// Re-exported so test code can depend on pristine-core alone.
pub use pristine_proto::{
    Error, FieldMap, Fixture, ObjectStore, Record, RecordId, Result, TargetPath,
};

//! Patch lifecycle management.
//!
//! A `Patch` is a single global substitution: a target path, a replacement,
//! and an active flag. The `PatchRegistry` owns the set of currently active
//! substitutions for one test class; read points (see `clock` and `settings`)
//! consult the registry instead of the real symbol.
//!
//! The registry is an explicit object passed by reference into setup and
//! teardown hooks, never an ambient singleton, so independent test classes
//! can each own one.

use chrono::{DateTime, Utc};
use pristine_proto::{Error, Result, TargetPath};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Provider closure for the current instant.
type InstantFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What a patch installs in place of the original behavior.
#[derive(Clone)]
pub enum Replacement {
    /// A plain replacement value, as used by settings overrides.
    Value(Value),
    /// A provider consulted for the current instant, as used by the clock.
    Instant(InstantFn),
}

impl Replacement {
    /// Creates an instant replacement from a provider closure.
    pub fn instant_fn<F>(provider: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self::Instant(Arc::new(provider))
    }
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Instant(_) => f.debug_tuple("Instant").field(&"<provider>").finish(),
        }
    }
}

/// Registry of active substitutions, keyed by target path.
///
/// At most one replacement may be active per target. The registry has
/// interior mutability so it can be shared by `Arc` between the test case,
/// the clock, and any override guards without requiring `&mut` plumbing.
#[derive(Debug, Default)]
pub struct PatchRegistry {
    active: Mutex<HashMap<TargetPath, Replacement>>,
}

impl PatchRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new registry already wrapped for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns true if a replacement is active for the target.
    pub fn is_active(&self, target: &TargetPath) -> bool {
        self.table().contains_key(target)
    }

    /// Returns the number of active substitutions.
    pub fn active_count(&self) -> usize {
        self.table().len()
    }

    /// Looks up an active value replacement.
    pub fn value(&self, target: &TargetPath) -> Option<Value> {
        match self.table().get(target) {
            Some(Replacement::Value(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Looks up an active instant replacement and queries its provider.
    pub fn instant(&self, target: &TargetPath) -> Option<DateTime<Utc>> {
        let provider = match self.table().get(target) {
            Some(Replacement::Instant(provider)) => Arc::clone(provider),
            _ => return None,
        };
        // Call outside the table lock; providers take their own locks.
        Some(provider())
    }

    fn install(&self, target: &TargetPath, replacement: Replacement) -> Result<()> {
        let mut table = self.table();
        if table.contains_key(target) {
            return Err(Error::PatchAlreadyActive(target.clone()));
        }
        table.insert(target.clone(), replacement);
        Ok(())
    }

    fn remove(&self, target: &TargetPath) -> Result<()> {
        self.table()
            .remove(target)
            .map(|_| ())
            .ok_or_else(|| Error::PatchNotActive(target.clone()))
    }

    fn table(&self) -> MutexGuard<'_, HashMap<TargetPath, Replacement>> {
        // Execution is single-threaded per class; a poisoned lock can only
        // mean a panic mid-operation, and the table is still coherent.
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A single reversible global substitution.
///
/// Lifecycle: created inactive, `start` makes the substitution visible
/// through the registry, `stop` restores the original behavior. Starting an
/// active patch or stopping an inactive one is a test-authoring defect and
/// fails immediately.
#[derive(Debug)]
pub struct Patch {
    target: TargetPath,
    replacement: Replacement,
    active: bool,
}

impl Patch {
    /// Creates an inactive patch.
    pub fn new(target: impl Into<TargetPath>, replacement: Replacement) -> Self {
        Self {
            target: target.into(),
            replacement,
            active: false,
        }
    }

    /// Creates an inactive patch replacing the target with a plain value.
    pub fn value(target: impl Into<TargetPath>, value: impl Into<Value>) -> Self {
        Self::new(target, Replacement::Value(value.into()))
    }

    /// Returns the substitution target.
    pub fn target(&self) -> &TargetPath {
        &self.target
    }

    /// Returns true while the patch is active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Activates the substitution.
    ///
    /// Fails with `PatchAlreadyActive` if this patch is already active or
    /// another patch occupies the same target.
    pub fn start(&mut self, registry: &PatchRegistry) -> Result<()> {
        if self.active {
            return Err(Error::PatchAlreadyActive(self.target.clone()));
        }
        registry.install(&self.target, self.replacement.clone())?;
        self.active = true;
        debug!(patch = %self.target, "Started patch");
        Ok(())
    }

    /// Deactivates the substitution, restoring original behavior.
    ///
    /// Fails with `PatchNotActive` if the patch is not active.
    pub fn stop(&mut self, registry: &PatchRegistry) -> Result<()> {
        if !self.active {
            return Err(Error::PatchNotActive(self.target.clone()));
        }
        registry.remove(&self.target)?;
        self.active = false;
        debug!(patch = %self.target, "Stopped patch");
        Ok(())
    }
}

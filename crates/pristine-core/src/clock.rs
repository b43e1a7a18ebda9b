//! Clock virtualization.
//!
//! Substitutes a single controllable time source for all time-sensitive code
//! during a test's lifetime. Code under test reads time through the read
//! points in this module; while a virtual clock is active both read points
//! derive from one mutable instant, otherwise they fall back to the real
//! system clock.
//!
//! Activation is all-or-nothing: if either patch cannot be installed the
//! test fails fast at setup. A time-dependent test accidentally passing
//! against real wall-clock time is a correctness hazard, not an acceptable
//! degradation.
//!
//! # Example
//!
//! ```
//! use pristine_core::{PatchRegistry, VirtualClock, clock};
//! use chrono::Duration;
//!
//! let registry = PatchRegistry::shared();
//! let active = VirtualClock::new().activate(registry.clone()).unwrap();
//!
//! let before = clock::now(&registry);
//! active.advance(Duration::hours(2));
//! assert_eq!(clock::now(&registry), before + Duration::hours(2));
//!
//! active.deactivate().unwrap();
//! ```

use crate::patch::{Patch, PatchRegistry, Replacement};
use crate::suspend::with_suspended;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use pristine_proto::{Result, TargetPath};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

/// Substitution target for the current-instant read path.
pub const NOW_TARGET: &str = "time.now";

/// Substitution target for the naive-UTC construction path.
pub const UTCNOW_TARGET: &str = "time.utcnow";

/// Returns the current instant, virtualized when a clock patch is active.
pub fn now(registry: &PatchRegistry) -> DateTime<Utc> {
    registry
        .instant(&TargetPath::new(NOW_TARGET))
        .unwrap_or_else(Utc::now)
}

/// Constructs a naive UTC timestamp for "now", virtualized when a clock
/// patch is active.
///
/// This is the construction path used by code that builds timestamp values
/// rather than reading an instant, e.g. created-at defaults.
pub fn utcnow(registry: &PatchRegistry) -> NaiveDateTime {
    registry
        .instant(&TargetPath::new(UTCNOW_TARGET))
        .map(|instant| instant.naive_utc())
        .unwrap_or_else(|| Utc::now().naive_utc())
}

/// A controllable time source, not yet installed into a registry.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl VirtualClock {
    /// Creates a clock seeded with the real current instant.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Creates a clock seeded with a specific instant.
    pub fn starting_at(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(Mutex::new(instant)),
        }
    }

    /// Installs the clock, redirecting both time read paths to its instant.
    ///
    /// Installs two patches bound to the same mutable instant. If the second
    /// install fails the first is rolled back before the error propagates, so
    /// the registry is never left half-virtualized.
    pub fn activate(self, registry: Arc<PatchRegistry>) -> Result<ActiveClock> {
        let mut now_patch = Patch::new(NOW_TARGET, self.provider());
        let mut utcnow_patch = Patch::new(UTCNOW_TARGET, self.provider());

        now_patch.start(&registry)?;
        if let Err(err) = utcnow_patch.start(&registry) {
            if let Err(stop_err) = now_patch.stop(&registry) {
                error!(%stop_err, "Failed to roll back clock patch after activation failure");
            }
            return Err(err);
        }

        debug!(instant = %self.read(), "Activated virtual clock");
        Ok(ActiveClock {
            instant: self.instant,
            registry,
            patches: [now_patch, utcnow_patch],
        })
    }

    fn provider(&self) -> Replacement {
        let instant = Arc::clone(&self.instant);
        Replacement::instant_fn(move || {
            *instant.lock().unwrap_or_else(PoisonError::into_inner)
        })
    }

    fn read(&self) -> DateTime<Utc> {
        *self.instant.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

/// An installed virtual clock; one per test instance.
///
/// The instant is directly settable by test bodies; all reads through the
/// virtualized paths observe the updated value immediately, with no caching.
/// `deactivate` stops both patches; `Drop` is the teardown backstop for
/// tests that end early.
pub struct ActiveClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
    registry: Arc<PatchRegistry>,
    patches: [Patch; 2],
}

impl ActiveClock {
    /// Returns the clock's current instant.
    pub fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }

    /// Sets the clock to a specific instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.lock() = instant;
    }

    /// Moves the clock forward (or backward, with a negative delta).
    pub fn advance(&self, delta: Duration) {
        let mut instant = self.lock();
        *instant += delta;
    }

    /// Runs `work` with the clock patches suspended, i.e. against real time.
    ///
    /// The patches are restarted in order on every exit path; the virtual
    /// instant itself is untouched.
    pub fn suspend<T>(&mut self, work: impl FnOnce() -> Result<T>) -> Result<T> {
        let registry = Arc::clone(&self.registry);
        with_suspended(&registry, &mut self.patches, work)
    }

    /// Stops both clock patches, ending virtualization for this test.
    pub fn deactivate(mut self) -> Result<()> {
        for patch in &mut self.patches {
            patch.stop(&self.registry)?;
        }
        debug!("Deactivated virtual clock");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.instant.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ActiveClock {
    fn drop(&mut self) {
        for patch in &mut self.patches {
            if patch.is_active() {
                if let Err(err) = patch.stop(&self.registry) {
                    error!(patch = %patch.target(), %err, "Failed to stop clock patch on drop");
                }
            }
        }
    }
}

impl std::fmt::Debug for ActiveClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveClock")
            .field("instant", &self.now())
            .finish_non_exhaustive()
    }
}

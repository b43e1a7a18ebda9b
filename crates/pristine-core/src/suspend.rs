//! Scoped suspension of active patches.
//!
//! Suspension stops an ordered sequence of active patches, runs
//! caller-supplied work against the original behavior, then restarts the
//! patches in the same order on every exit path - normal return, error, or
//! panic. The work's own error, if any, propagates only after the patches
//! are back in place.

use crate::patch::{Patch, PatchRegistry};
use pristine_proto::Result;
use tracing::error;

/// Runs `work` with the given patches suspended.
///
/// Stops each patch in order, invokes `work`, then restarts the patches in
/// the same order. If stopping patch `k` fails, patches `0..k` are restarted
/// before the error surfaces, so the caller never observes a half-suspended
/// set. Restart is guaranteed even if `work` panics.
pub fn with_suspended<T>(
    registry: &PatchRegistry,
    patches: &mut [Patch],
    work: impl FnOnce() -> Result<T>,
) -> Result<T> {
    for idx in 0..patches.len() {
        if let Err(err) = patches[idx].stop(registry) {
            restart_all(registry, &mut patches[..idx]);
            return Err(err);
        }
    }

    // The guard restarts on unwind; the normal path defuses it so restart
    // errors can propagate instead of being swallowed.
    let guard = scopeguard::guard(&mut *patches, |patches| {
        restart_all(registry, patches);
    });
    let outcome = work();
    let patches = scopeguard::ScopeGuard::into_inner(guard);
    for patch in patches.iter_mut() {
        patch.start(registry)?;
    }
    outcome
}

/// Explicit scoped-block form of patch suspension.
///
/// `Suspension::new` stops the patches; dropping the suspension restarts
/// them. Prefer `resume` over plain drop where possible: `Drop` can only log
/// restart failures, while `resume` reports them.
pub struct Suspension<'a> {
    registry: &'a PatchRegistry,
    patches: &'a mut [Patch],
    resumed: bool,
}

impl<'a> Suspension<'a> {
    /// Suspends the given active patches, in order.
    ///
    /// On failure the already-stopped prefix is restarted before the error
    /// is returned; no suspension is left behind.
    pub fn new(registry: &'a PatchRegistry, patches: &'a mut [Patch]) -> Result<Self> {
        for idx in 0..patches.len() {
            if let Err(err) = patches[idx].stop(registry) {
                restart_all(registry, &mut patches[..idx]);
                return Err(err);
            }
        }
        Ok(Self {
            registry,
            patches,
            resumed: false,
        })
    }

    /// Restarts the suspended patches in their original order.
    ///
    /// Attempts every patch even after a failure, so one bad restart cannot
    /// leave the rest suspended; the first failure is returned.
    pub fn resume(mut self) -> Result<()> {
        self.resumed = true;
        let mut first_err = None;
        for patch in self.patches.iter_mut() {
            if let Err(err) = patch.start(self.registry) {
                if first_err.is_none() {
                    first_err = Some(err);
                } else {
                    error!(patch = %patch.target(), %err, "Failed to restart suspended patch");
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for Suspension<'_> {
    fn drop(&mut self) {
        if !self.resumed {
            restart_all(self.registry, self.patches);
        }
    }
}

fn restart_all(registry: &PatchRegistry, patches: &mut [Patch]) {
    for patch in patches.iter_mut() {
        if let Err(err) = patch.start(registry) {
            // Drop and unwind paths cannot propagate; the defect is logged
            // and the remaining patches are still restarted.
            error!(patch = %patch.target(), %err, "Failed to restart suspended patch");
        }
    }
}

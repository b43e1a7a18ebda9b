//! Namespaced settings overrides.
//!
//! A convenience consumer of the patch lifecycle: given a namespace and a
//! table of setting overrides, one patch is created per entry targeting
//! `<namespace>.defaults.<name>`. Usable as a wrapper around a unit of work
//! or as a scoped guard. Enabling is all-or-nothing: either every override
//! is active or none is.
//!
//! # Example
//!
//! ```
//! use pristine_core::{PatchRegistry, SettingsOverride, settings};
//!
//! let registry = PatchRegistry::new();
//! SettingsOverride::new("billing")
//!     .set("grace_days", 14)
//!     .with(&registry, || {
//!         let value = settings::setting(&registry, "billing", "grace_days");
//!         assert_eq!(value, Some(14.into()));
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(settings::setting(&registry, "billing", "grace_days"), None);
//! ```

use crate::patch::{Patch, PatchRegistry};
use pristine_proto::{FieldMap, Result, TargetPath};
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

/// Looks up an overridden default, if one is active.
///
/// Code under test consults this read point for its configurable defaults;
/// `None` means no override is active and the compiled-in default applies.
pub fn setting(registry: &PatchRegistry, namespace: &str, name: &str) -> Option<Value> {
    registry.value(&target_for(namespace, name))
}

fn target_for(namespace: &str, name: &str) -> TargetPath {
    TargetPath::new(format!("{}.defaults.{}", namespace, name))
}

/// Overrides default values in a settings namespace.
#[derive(Debug)]
pub struct SettingsOverride {
    namespace: String,
    patches: Vec<Patch>,
}

impl SettingsOverride {
    /// Creates an empty override for a namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            patches: Vec::new(),
        }
    }

    /// Adds a setting override, builder style.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        let target = target_for(&self.namespace, name);
        self.patches.push(Patch::value(target, value));
        self
    }

    /// Creates an override from a table of settings.
    pub fn from_map(namespace: impl Into<String>, overrides: FieldMap) -> Self {
        let mut this = Self::new(namespace);
        for (name, value) in overrides {
            this = this.set(&name, value);
        }
        this
    }

    /// Returns the namespace this override targets.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the number of overridden settings.
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Returns true if no settings are overridden.
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Starts every override patch.
    ///
    /// All-or-nothing: if any start fails, the patches already started in
    /// this call are rolled back before the error propagates, so the caller
    /// never observes a partially applied override set.
    pub fn enable(&mut self, registry: &PatchRegistry) -> Result<()> {
        for idx in 0..self.patches.len() {
            if let Err(err) = self.patches[idx].start(registry) {
                for patch in self.patches[..idx].iter_mut().rev() {
                    if let Err(stop_err) = patch.stop(registry) {
                        error!(patch = %patch.target(), %stop_err, "Failed to roll back override patch");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Stops every override patch.
    pub fn disable(&mut self, registry: &PatchRegistry) -> Result<()> {
        for patch in &mut self.patches {
            patch.stop(registry)?;
        }
        Ok(())
    }

    /// Runs `work` with the overrides enabled.
    ///
    /// Disables on every exit path; `work`'s error propagates after the
    /// overrides are gone.
    pub fn with<T>(
        mut self,
        registry: &PatchRegistry,
        work: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        self.enable(registry)?;
        let guard = scopeguard::guard(&mut self, |overrides| {
            if let Err(err) = overrides.disable(registry) {
                error!(namespace = %overrides.namespace, %err, "Failed to disable settings override during unwind");
            }
        });
        let outcome = work();
        let overrides = scopeguard::ScopeGuard::into_inner(guard);
        overrides.disable(registry)?;
        outcome
    }

    /// Enables the overrides and returns a guard that disables them on drop.
    pub fn guard(mut self, registry: Arc<PatchRegistry>) -> Result<OverrideGuard> {
        self.enable(&registry)?;
        Ok(OverrideGuard {
            overrides: self,
            registry,
            disabled: false,
        })
    }
}

/// Scoped form of an enabled settings override.
///
/// Dropping the guard disables the overrides; `disable` does the same but
/// reports failures instead of logging them.
#[derive(Debug)]
pub struct OverrideGuard {
    overrides: SettingsOverride,
    registry: Arc<PatchRegistry>,
    disabled: bool,
}

impl OverrideGuard {
    /// Disables the overrides, consuming the guard.
    pub fn disable(mut self) -> Result<()> {
        self.disabled = true;
        self.overrides.disable(&self.registry)
    }
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        if self.disabled {
            return;
        }
        if let Err(err) = self.overrides.disable(&self.registry) {
            error!(namespace = %self.overrides.namespace, %err, "Failed to disable settings override on drop");
        }
    }
}

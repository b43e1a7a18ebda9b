//! Common error types shared across the Pristine crates.
//!
//! Lifecycle errors (double start, stopping an inactive patch) are defects in
//! test authoring and surface immediately. Store failures propagate to the
//! caller unmodified and are never retried.

use crate::{RecordId, TargetPath};
use serde_json::Value;

/// Result alias used throughout the Pristine crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by patch lifecycle, fixture, and store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Starting a patch that is already active, or whose target is already
    /// occupied by another patch.
    #[error("Patch target `{0}` is already active")]
    PatchAlreadyActive(TargetPath),

    /// Stopping a patch that is not active.
    #[error("Patch target `{0}` is not active")]
    PatchNotActive(TargetPath),

    /// A stored field diverged from its expected value.
    #[error("Field `{field}` mismatch: expected {expected}, got {actual}")]
    FieldMismatch {
        /// Name of the diverging field.
        field: String,
        /// The value the caller expected.
        expected: Value,
        /// The value actually found.
        actual: Value,
    },

    /// No record with the given identity exists in the store.
    #[error("No stored record `{kind}` with id {id}")]
    RecordNotFound {
        /// Entity kind of the missing record.
        kind: String,
        /// Requested persistent identity.
        id: RecordId,
    },

    /// A store-side operation was attempted on an unsaved record.
    #[error("Record `{kind}` has no persistent identity")]
    MissingId {
        /// Entity kind of the unsaved record.
        kind: String,
    },

    /// The backing store failed. Propagated unmodified, never retried.
    #[error("Store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PatchAlreadyActive(TargetPath::new("time.now"));
        assert_eq!(err.to_string(), "Patch target `time.now` is already active");

        let err = Error::FieldMismatch {
            field: "name".to_string(),
            expected: Value::from("initial"),
            actual: Value::from("modified"),
        };
        let msg = err.to_string();
        assert!(msg.contains("name"));
        assert!(msg.contains("initial"));
        assert!(msg.contains("modified"));
    }

    #[test]
    fn test_record_not_found_display() {
        let err = Error::RecordNotFound {
            kind: "project".to_string(),
            id: RecordId::new(7),
        };
        assert_eq!(err.to_string(), "No stored record `project` with id 7");
    }
}

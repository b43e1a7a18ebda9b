//! # pristine-proto
//!
//! Shared types, error definitions, and the backing-store contract for the
//! Pristine test-isolation toolkit.
//!
//! This crate provides the foundational abstractions used across all Pristine
//! crates, including:
//! - Record and Fixture types for fixture state
//! - TargetPath for naming patch substitution targets
//! - The ObjectStore trait consumed by fixture helpers
//! - Common error types

mod error;
mod record;
mod store;
mod target;

pub use error::{Error, Result};
pub use record::{FieldMap, Fixture, Record, RecordId};
pub use store::ObjectStore;
pub use target::TargetPath;

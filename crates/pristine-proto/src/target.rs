//! Target paths for patch substitution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully-qualified path naming a substitution target.
///
/// A target path identifies the symbol whose behavior a patch replaces, in
/// dotted form (e.g. `billing.defaults.grace_period` or `time.now`). Paths
/// are opaque keys: the registry enforces at most one active replacement per
/// path, and read points consult the registry by path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetPath(String);

impl TargetPath {
    /// Creates a target path from a dotted string.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for TargetPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_path_display() {
        let target = TargetPath::new("app.defaults.timeout");
        assert_eq!(target.to_string(), "app.defaults.timeout");
        assert_eq!(target.as_str(), "app.defaults.timeout");
    }

    #[test]
    fn test_target_path_equality() {
        assert_eq!(TargetPath::from("time.now"), TargetPath::new("time.now"));
        assert_ne!(TargetPath::new("time.now"), TargetPath::new("time.utcnow"));
    }
}

//! Caller identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sidecar::SIDECAR_PREFIX;

/// An opaque caller identity resolved from the transport credential.
///
/// A principal carries no permissions of its own; everything is derived
/// from its claims record at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Create a principal from a user name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The user name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// The name as a home-directory segment.
    ///
    /// Only names that are a single, ordinary path segment qualify: names
    /// that are empty, contain a slash, backslash or NUL, are `.`/`..` or
    /// look like a sidecar get no home directory.
    pub fn home_segment(&self) -> Option<&str> {
        let name = self.0.as_str();
        let usable = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.starts_with(SIDECAR_PREFIX)
            && !name.contains(['/', '\\', '\0']);
        usable.then_some(name)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_segment() {
        assert_eq!(Principal::new("rob").home_segment(), Some("rob"));
        assert_eq!(Principal::new("").home_segment(), None);
        assert_eq!(Principal::new("..").home_segment(), None);
        assert_eq!(Principal::new("a/b").home_segment(), None);
        assert_eq!(Principal::new(".__claims.json").home_segment(), None);
    }
}

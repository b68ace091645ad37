//! Principal claims.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named, multi-valued attributes describing a principal.
///
/// Stored as `{"groups": {"username": ["rob"], "age": ["adult"]}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Attribute groups, keyed by attribute name.
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

impl Claims {
    /// Claims with no attributes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a value to an attribute group.
    pub fn with(mut self, group: impl Into<String>, value: impl Into<String>) -> Self {
        self.groups.entry(group.into()).or_default().push(value.into());
        self
    }

    /// Look up the values of a dotted claim name such as `groups.username`.
    ///
    /// Unknown claim names have no values.
    pub fn values(&self, claim: &str) -> &[String] {
        claim
            .strip_prefix("groups.")
            .and_then(|group| self.groups.get(group))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Check whether a dotted claim contains a value.
    pub fn contains(&self, claim: &str, value: &str) -> bool {
        self.values(claim).iter().any(|v| v == value)
    }

    /// Check whether there are no attributes at all.
    pub fn is_empty(&self) -> bool {
        self.groups.values().all(Vec::is_empty)
    }
}

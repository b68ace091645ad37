//! Typed policy decisions.
//!
//! An evaluator answers with a loosely typed map. [`Decision`] keeps only
//! what is well typed: booleans under permission names and strings under
//! any other name. Everything else is treated as unset, and unset is a
//! denial.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Raw evaluator output: named boolean/string outcomes.
pub type DecisionMap = serde_json::Map<String, Value>;

/// A permission the filesystem asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    /// Create a child in a directory
    Create,
    /// Read content or list children
    Read,
    /// Modify content or properties
    Write,
    /// Remove the resource
    Delete,
    /// See that the resource exists
    Stat,
}

impl Permission {
    /// Every permission, in declaration order.
    pub const ALL: [Permission; 5] = [
        Permission::Create,
        Permission::Read,
        Permission::Write,
        Permission::Delete,
        Permission::Stat,
    ];

    /// The key used in decision maps.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Read => "Read",
            Self::Write => "Write",
            Self::Delete => "Delete",
            Self::Stat => "Stat",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown permission: {}", s))
    }
}

/// A per-call access decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Create permission, if the policy produced a boolean for it.
    pub create: Option<bool>,

    /// Read permission, if the policy produced a boolean for it.
    pub read: Option<bool>,

    /// Write permission, if the policy produced a boolean for it.
    pub write: Option<bool>,

    /// Delete permission, if the policy produced a boolean for it.
    pub delete: Option<bool>,

    /// Stat permission, if the policy produced a boolean for it.
    pub stat: Option<bool>,

    /// Presentation hints such as `Banner`.
    pub hints: BTreeMap<String, String>,
}

impl Decision {
    /// Build a decision from raw evaluator output.
    ///
    /// Permission keys keep their value only when it is a boolean; other
    /// keys are kept as hints only when they are strings. Anything else is
    /// dropped.
    pub fn from_map(map: &DecisionMap) -> Self {
        let mut decision = Self::default();
        for (key, value) in map {
            match key.parse::<Permission>() {
                Ok(permission) if key == permission.as_str() => {
                    if let Value::Bool(granted) = value {
                        decision.set(permission, *granted);
                    }
                }
                _ => {
                    if let Value::String(hint) = value {
                        decision.hints.insert(key.clone(), hint.clone());
                    }
                }
            }
        }
        decision
    }

    /// The fallback decision used when no policy document applies.
    pub fn deny_all() -> Self {
        let mut decision = Self::default();
        for permission in Permission::ALL {
            decision.set(permission, false);
        }
        decision.hints.insert("Banner".to_string(), "error".to_string());
        decision
            .hints
            .insert("BannerForeground".to_string(), "white".to_string());
        decision
            .hints
            .insert("BannerBackground".to_string(), "black".to_string());
        decision
    }

    /// The raw value for a permission; `None` when unset.
    pub fn get(&self, permission: Permission) -> Option<bool> {
        match permission {
            Permission::Create => self.create,
            Permission::Read => self.read,
            Permission::Write => self.write,
            Permission::Delete => self.delete,
            Permission::Stat => self.stat,
        }
    }

    /// Record a value for a permission.
    pub fn set(&mut self, permission: Permission, granted: bool) {
        let slot = match permission {
            Permission::Create => &mut self.create,
            Permission::Read => &mut self.read,
            Permission::Write => &mut self.write,
            Permission::Delete => &mut self.delete,
            Permission::Stat => &mut self.stat,
        };
        *slot = Some(granted);
    }

    /// The gate: whether a permission is granted. Unset means denied.
    pub fn allows(&self, permission: Permission) -> bool {
        self.get(permission).unwrap_or(false)
    }

    /// A presentation hint by name.
    pub fn hint(&self, name: &str) -> Option<&str> {
        self.hints.get(name).map(String::as_str)
    }
}

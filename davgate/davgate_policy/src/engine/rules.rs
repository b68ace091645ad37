//! Built-in rule evaluator.
//!
//! Policy documents for this evaluator are JSON objects mapping decision
//! keys to rules. A rule is a boolean, a string hint, or a condition:
//!
//! ```json
//! {
//!     "Stat": true,
//!     "Read": true,
//!     "Write": {"claim": "groups.username", "contains": "rob"},
//!     "Create": {"all": [{"owner": true}, {"path_prefix": "/rob"}]},
//!     "Delete": {"not": {"action": ["Read"]}},
//!     "Banner": "PRIVATE"
//! }
//! ```

use davgate_core::{PolicyError, ResourcePath};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::evaluator::PolicyEvaluator;
use crate::model::{DecisionMap, Permission, PolicyInput};

/// Claim holding the caller's user names.
const USERNAME_CLAIM: &str = "groups.username";

/// The right-hand side of a decision key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    /// A constant outcome.
    Constant(bool),
    /// A presentation hint.
    Hint(String),
    /// An outcome computed from the input.
    Condition(Condition),
}

/// A predicate over the evaluation input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// A claim contains a value.
    Claim {
        /// Dotted claim name, e.g. `groups.username`.
        claim: String,
        /// The value looked for.
        contains: String,
    },
    /// Every nested condition holds.
    All {
        /// Nested conditions.
        all: Vec<Condition>,
    },
    /// At least one nested condition holds.
    Any {
        /// Nested conditions.
        any: Vec<Condition>,
    },
    /// The nested condition does not hold.
    Not {
        /// Nested condition.
        not: Box<Condition>,
    },
    /// The attempted verb is one of the listed ones.
    Action {
        /// Accepted verbs.
        action: Vec<Permission>,
    },
    /// The action's path lies at or below a prefix.
    PathPrefix {
        /// The prefix path.
        path_prefix: String,
    },
    /// Whether the top-level segment of the action's path is one of the
    /// caller's user names.
    Owner {
        /// Expected ownership.
        owner: bool,
    },
}

impl Condition {
    /// Check whether the condition holds for an input.
    pub fn holds(&self, input: &PolicyInput) -> bool {
        match self {
            Self::Claim { claim, contains } => input.claims.contains(claim, contains),
            Self::All { all } => all.iter().all(|c| c.holds(input)),
            Self::Any { any } => any.iter().any(|c| c.holds(input)),
            Self::Not { not } => !not.holds(input),
            Self::Action { action } => action.contains(&input.action.action),
            Self::PathPrefix { path_prefix } => {
                match (
                    ResourcePath::parse(&input.action.name),
                    ResourcePath::parse(path_prefix),
                ) {
                    (Ok(name), Ok(prefix)) => name.is_within(&prefix),
                    _ => false,
                }
            }
            Self::Owner { owner } => {
                let is_owner = ResourcePath::parse(&input.action.name)
                    .ok()
                    .and_then(|name| {
                        name.top_segment()
                            .map(|top| input.claims.contains(USERNAME_CLAIM, top))
                    })
                    .unwrap_or(false);
                is_owner == *owner
            }
        }
    }
}

/// A parsed policy document.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: BTreeMap<String, Rule>,
}

impl RuleSet {
    /// Parse a policy document.
    pub fn parse(source: &str) -> Result<Self, PolicyError> {
        let rules = serde_json::from_str(source)
            .map_err(|e| PolicyError::DocumentParse(e.to_string()))?;
        Ok(Self { rules })
    }

    /// Evaluate every rule against an input.
    pub fn evaluate(&self, input: &PolicyInput) -> DecisionMap {
        self.rules
            .iter()
            .map(|(key, rule)| {
                let value = match rule {
                    Rule::Constant(value) => Value::Bool(*value),
                    Rule::Hint(hint) => Value::String(hint.clone()),
                    Rule::Condition(condition) => Value::Bool(condition.holds(input)),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// Evaluator for JSON rule documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    /// Create a new rule evaluator.
    pub fn new() -> Self {
        Self
    }
}

impl PolicyEvaluator for RuleEvaluator {
    fn evaluate(&self, source: &str, input: &PolicyInput) -> Result<DecisionMap, PolicyError> {
        Ok(RuleSet::parse(source)?.evaluate(input))
    }
}

//! Evaluation input.

use davgate_core::ResourcePath;
use serde::{Deserialize, Serialize};

use super::claims::Claims;
use super::decision::Permission;

/// What is being attempted, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// The verb.
    pub action: Permission,

    /// The normalized path the verb applies to.
    pub name: String,
}

/// The document handed to a policy evaluator.
///
/// Serializes as
/// `{"claims": {"groups": {...}}, "action": {"action": "Write", "name": "/rob/cat.jpg"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyInput {
    /// The caller's claims.
    pub claims: Claims,

    /// The attempted action.
    pub action: Action,
}

impl PolicyInput {
    /// Combine claims with an action on a path.
    pub fn new(claims: Claims, permission: Permission, target: &ResourcePath) -> Self {
        Self {
            claims,
            action: Action {
                action: permission,
                name: target.as_str().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_shape() {
        let input = PolicyInput::new(
            Claims::empty().with("username", "rob"),
            Permission::Write,
            &ResourcePath::parse("/rob/cat.jpg").unwrap(),
        );
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({
                "claims": {"groups": {"username": ["rob"]}},
                "action": {"action": "Write", "name": "/rob/cat.jpg"},
            })
        );
    }
}

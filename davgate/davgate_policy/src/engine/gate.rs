//! The decision gate.

use davgate_core::{Principal, ResourcePath};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::evaluator::PolicyEvaluator;
use crate::model::{Decision, Permission, PolicyInput};
use crate::store::{resolve_claims, resolve_policy, PolicyDocument};

/// Produces a fresh [`Decision`] for every filesystem operation.
///
/// Nothing is cached: claims and policy documents are re-read on each
/// call, since either may change between operations.
pub struct PolicyEngine<E> {
    /// The native storage root.
    root: PathBuf,

    /// The evaluator.
    evaluator: E,
}

impl<E> PolicyEngine<E>
where
    E: PolicyEvaluator,
{
    /// Create a new policy engine.
    ///
    /// # Arguments
    ///
    /// * `root` - The native storage root holding claims and policies.
    /// * `evaluator` - The policy evaluator.
    pub fn new(root: impl Into<PathBuf>, evaluator: E) -> Self {
        Self {
            root: root.into(),
            evaluator,
        }
    }

    /// The native storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The evaluator.
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Decide what a principal may do.
    ///
    /// # Arguments
    ///
    /// * `principal` - The caller.
    /// * `permission` - The verb being attempted; passed to the evaluator
    ///   as the action.
    /// * `target` - The path the verb applies to; passed to the evaluator
    ///   as the action's name.
    /// * `governing` - The path whose policy document applies. This is the
    ///   target itself, except for creates, which are governed by the
    ///   parent directory.
    ///
    /// # Returns
    ///
    /// The decision. Evaluation failures produce an empty decision, and a
    /// missing policy produces [`Decision::deny_all`].
    pub fn decide(
        &self,
        principal: &Principal,
        permission: Permission,
        target: &ResourcePath,
        governing: &ResourcePath,
    ) -> Decision {
        let document = resolve_policy(&self.root, governing);
        let source = match &document {
            PolicyDocument::Sidecar { source, .. } => source,
            PolicyDocument::DenyAll => {
                debug!(principal = %principal, action = %permission, resource = %target, "deny-all policy");
                return Decision::deny_all();
            }
        };

        let claims = resolve_claims(&self.root, principal);
        let input = PolicyInput::new(claims, permission, target);

        let decision = match self.evaluator.evaluate(source, &input) {
            Ok(map) => Decision::from_map(&map),
            Err(e) => {
                warn!(
                    policy = ?document.path().map(ResourcePath::as_str),
                    error = %e,
                    "policy evaluation failed"
                );
                Decision::default()
            }
        };

        debug!(
            principal = %principal,
            action = %permission,
            resource = %target,
            stat = decision.allows(Permission::Stat),
            granted = decision.allows(permission),
            "policy decision"
        );

        decision
    }
}

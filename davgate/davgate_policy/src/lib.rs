//! # davgate Policy
//!
//! `davgate_policy` decides what a principal may do with a resource.
//!
//! Key concepts:
//!
//! 1. **Claims**: Named, multi-valued attributes of a principal, read from
//!    the principal's home directory.
//!
//! 2. **Policy Document**: A rule set stored next to a file or inside a
//!    directory, inherited downward until overridden.
//!
//! 3. **Evaluator**: A pure function from document and input to a decision
//!    map.
//!
//! 4. **Decision**: The typed, fail-closed answer. Anything the evaluator
//!    did not clearly grant is denied.

pub mod engine;
pub mod model;
pub mod store;

// Re-export key types and traits for convenience
pub use engine::{PolicyEngine, PolicyEvaluator, RuleEvaluator};
pub use model::{Action, Claims, Decision, DecisionMap, Permission, PolicyInput};
pub use store::{resolve_claims, resolve_policy, PolicyDocument};

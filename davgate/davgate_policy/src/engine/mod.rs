//! Policy evaluation engine.
//!
//! This module provides the evaluator boundary, the built-in rule
//! evaluator and the per-call decision gate.

mod evaluator;
mod gate;
mod rules;

pub use evaluator::PolicyEvaluator;
pub use gate::PolicyEngine;
pub use rules::{Condition, Rule, RuleEvaluator, RuleSet};

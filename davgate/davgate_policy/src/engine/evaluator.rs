//! The evaluator boundary.

use davgate_core::PolicyError;

use crate::model::{DecisionMap, PolicyInput};

/// Trait for policy evaluators.
///
/// An evaluator is a pure function from a policy document and an input
/// document to a decision map. It may be called concurrently and must not
/// keep state between calls.
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluate a policy document.
    ///
    /// # Arguments
    ///
    /// * `source` - The policy document text.
    /// * `input` - Claims and the attempted action.
    ///
    /// # Returns
    ///
    /// * `Ok(DecisionMap)` - Named boolean/string outcomes.
    /// * `Err(PolicyError)` - If the document could not be parsed or evaluated.
    fn evaluate(&self, source: &str, input: &PolicyInput) -> Result<DecisionMap, PolicyError>;
}

impl<F> PolicyEvaluator for F
where
    F: Fn(&str, &PolicyInput) -> Result<DecisionMap, PolicyError> + Send + Sync,
{
    fn evaluate(&self, source: &str, input: &PolicyInput) -> Result<DecisionMap, PolicyError> {
        self(source, input)
    }
}

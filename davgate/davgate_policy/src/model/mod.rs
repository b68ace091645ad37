//! Policy models.
//!
//! This module defines claims, evaluation input and typed decisions.

pub mod claims;
pub mod decision;
pub mod input;

pub use claims::Claims;
pub use decision::{Decision, DecisionMap, Permission};
pub use input::{Action, PolicyInput};

//! Policy storage.
//!
//! Claims records and policy documents are sidecars in the native store.
//! Lookups never fail: every failure resolves to the most restrictive
//! answer.

mod claims;
mod document;

pub use claims::resolve_claims;
pub use document::{resolve_policy, PolicyDocument};

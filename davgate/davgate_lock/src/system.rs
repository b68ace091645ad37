//! The lock manager interface.

use chrono::{DateTime, Utc};
use davgate_core::{LockError, Principal};
use std::time::Duration;

use crate::model::{Condition, LockDetails, Release};

/// Resource-scoped write locks.
///
/// Every operation takes the current time so that expiry is deterministic
/// and testable; expired locks are collected before the operation runs.
pub trait LockSystem: Send + Sync {
    /// Claim the locks covering `name0` and `name1` for the duration of a
    /// mutation. Either name may be empty, meaning no resource.
    ///
    /// # Arguments
    ///
    /// * `now` - The current time
    /// * `name0` - The first resource, or `""`
    /// * `name1` - The second resource, or `""`
    /// * `conditions` - Tokens and ETags presented by the client
    ///
    /// # Returns
    ///
    /// * `Ok(Release)` - The claimed locks are held until the guard is
    ///   released or dropped
    /// * `Err(LockError::ConfirmationFailed)` - No presented token covers a
    ///   named resource, or its lock is already held
    fn confirm(
        &self,
        now: DateTime<Utc>,
        name0: &str,
        name1: &str,
        conditions: &[Condition],
    ) -> Result<Release, LockError>;

    /// Grant a new lock and return its token.
    fn create(&self, now: DateTime<Utc>, details: LockDetails) -> Result<String, LockError>;

    /// Reset a lock's timeout.
    fn refresh(
        &self,
        now: DateTime<Utc>,
        token: &str,
        timeout: Option<Duration>,
    ) -> Result<LockDetails, LockError>;

    /// Remove a lock. Only the principal that created it may do so.
    fn unlock(&self, now: DateTime<Utc>, token: &str, principal: &Principal)
        -> Result<(), LockError>;

    /// The unexpired locks.
    fn list(&self, now: DateTime<Utc>) -> Result<Vec<(String, LockDetails)>, LockError>;
}

//! In-process lock manager.

use chrono::{DateTime, Utc};
use davgate_core::{LockError, Principal};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::model::{Condition, LockDetails, Release};
use crate::system::LockSystem;
use crate::table::LockTable;

/// A [`LockSystem`] whose state lives in memory.
///
/// Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct MemLockSystem {
    table: Arc<Mutex<LockTable>>,
}

impl MemLockSystem {
    /// Create an empty lock manager.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockSystem for MemLockSystem {
    fn confirm(
        &self,
        now: DateTime<Utc>,
        name0: &str,
        name1: &str,
        conditions: &[Condition],
    ) -> Result<Release, LockError> {
        let held = self.table.lock().confirm(now, name0, name1, conditions)?;
        if held.is_empty() {
            return Ok(Release::noop());
        }

        let table = Arc::clone(&self.table);
        Ok(Release::new(move || table.lock().release(&held)))
    }

    fn create(&self, now: DateTime<Utc>, details: LockDetails) -> Result<String, LockError> {
        self.table.lock().create(now, details)
    }

    fn refresh(
        &self,
        now: DateTime<Utc>,
        token: &str,
        timeout: Option<Duration>,
    ) -> Result<LockDetails, LockError> {
        self.table.lock().refresh(now, token, timeout)
    }

    fn unlock(
        &self,
        now: DateTime<Utc>,
        token: &str,
        principal: &Principal,
    ) -> Result<(), LockError> {
        self.table.lock().unlock(now, token, principal)
    }

    fn list(&self, now: DateTime<Utc>) -> Result<Vec<(String, LockDetails)>, LockError> {
        let mut table = self.table.lock();
        table.collect_expired(now);
        Ok(table
            .locks()
            .map(|lock| (lock.token.clone(), lock.details.clone()))
            .collect())
    }
}

//! Lock manager persisted to a JSON file.
//!
//! Several server processes sharing a storage root can share one lock
//! table. Each operation takes a PID lock next to the table file, loads the
//! table, applies the change, and writes it back atomically.
//!
//! A confirmed lock stays held in the file until its holder releases it.
//! Holds left by a process that died first are released on load, once the
//! process is gone or the hold is older than [`DEFAULT_MAX_HOLD`].

use chrono::{DateTime, TimeDelta, Utc};
use davgate_core::{LockError, Principal};
use parking_lot::Mutex;
use pidlock::Pidlock;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::model::{Condition, LockDetails, Release};
use crate::system::LockSystem;
use crate::table::LockTable;

/// File name of the persisted lock table.
pub const TABLE_FILE: &str = "locks.json";

/// File name of the PID lock guarding the table.
pub const PIDLOCK_FILE: &str = "locks.pid";

/// How long a confirmation may hold a lock before it is presumed dead.
pub const DEFAULT_MAX_HOLD: TimeDelta = TimeDelta::minutes(10);

const ACQUIRE_ATTEMPTS: usize = 400;
const ACQUIRE_BACKOFF: Duration = Duration::from_millis(5);

/// Holds a PID lock until dropped.
struct PidlockGuard(Pidlock);

impl PidlockGuard {
    /// Acquire the PID lock at `path`, waiting while another owner holds it.
    ///
    /// Locks left behind by dead processes are cleared and retried.
    fn acquire(path: &Path) -> Result<Self, LockError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| LockError::Backend("lock path is not valid UTF-8".to_string()))?;

        let mut lock = Pidlock::new(path_str);
        for _ in 0..ACQUIRE_ATTEMPTS {
            match lock.acquire() {
                Ok(()) => return Ok(Self(lock)),
                Err(pidlock::PidlockError::LockExists) => {
                    // get_owner() clears stale locks
                    if let Some(pid) = lock.get_owner() {
                        debug!(pid, "lock table busy");
                        thread::sleep(ACQUIRE_BACKOFF);
                    }
                }
                Err(e) => {
                    return Err(LockError::Backend(format!(
                        "failed to acquire lock table: {e:?}"
                    )));
                }
            }
        }

        Err(LockError::Backend(format!(
            "timed out waiting for {}",
            path.display()
        )))
    }
}

impl Drop for PidlockGuard {
    fn drop(&mut self) {
        let _ = self.0.release();
    }
}

/// Check whether a process is still running.
#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// Check whether a process is still running.
///
/// Elsewhere every holder is presumed alive, and only the age bound
/// applies.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[derive(Debug)]
struct Shared {
    table_path: PathBuf,
    pidlock_path: PathBuf,
    max_hold: TimeDelta,
    // Serializes threads of this process; the PID lock cannot tell them apart.
    local: Mutex<()>,
}

impl Shared {
    fn load(&self) -> Result<LockTable, LockError> {
        match fs::read_to_string(&self.table_path) {
            Ok(text) if text.trim().is_empty() => Ok(LockTable::new()),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| LockError::Backend(format!("corrupt lock table: {e}"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LockTable::new()),
            Err(e) => Err(LockError::Backend(e.to_string())),
        }
    }

    fn save(&self, table: &LockTable) -> Result<(), LockError> {
        let dir = self
            .table_path
            .parent()
            .ok_or_else(|| LockError::Backend("lock table has no directory".to_string()))?;
        let json = serde_json::to_vec_pretty(table)
            .map_err(|e| LockError::Backend(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| LockError::Backend(e.to_string()))?;
        tmp.write_all(&json)
            .map_err(|e| LockError::Backend(e.to_string()))?;
        tmp.persist(&self.table_path)
            .map_err(|e| LockError::Backend(e.error.to_string()))?;
        Ok(())
    }

    /// Run `f` against the table under both locks, saving it afterwards.
    ///
    /// Stale holds are released before `f` runs. The table is saved even if
    /// `f` fails, since expired locks may have been collected.
    fn with_table<T>(
        &self,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut LockTable) -> Result<T, LockError>,
    ) -> Result<T, LockError> {
        let _local = self.local.lock();
        let _guard = PidlockGuard::acquire(&self.pidlock_path)?;

        let mut table = self.load()?;
        table.clear_stale_holds(now, self.max_hold, process_alive);
        let result = f(&mut table);
        self.save(&table)?;
        result
    }
}

/// A [`LockSystem`] persisted under a directory.
///
/// Clones, and other instances opened on the same directory, share state.
#[derive(Debug, Clone)]
pub struct FileLockSystem {
    shared: Arc<Shared>,
}

impl FileLockSystem {
    /// Open a lock table in `dir`, creating the directory if needed.
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory holding the table and its PID lock
    ///
    /// # Returns
    ///
    /// * `Ok(FileLockSystem)` - The lock manager
    /// * `Err(LockError::Backend)` - If the directory cannot be created
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, LockError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| LockError::Backend(e.to_string()))?;

        Ok(Self {
            shared: Arc::new(Shared {
                table_path: dir.join(TABLE_FILE),
                pidlock_path: dir.join(PIDLOCK_FILE),
                max_hold: DEFAULT_MAX_HOLD,
                local: Mutex::new(()),
            }),
        })
    }

    /// Set how long a hold may last before it is presumed dead.
    ///
    /// Must be called before the lock system is cloned.
    pub fn with_max_hold(mut self, max_hold: TimeDelta) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.max_hold = max_hold;
        }
        self
    }

    /// Path of the persisted table.
    pub fn table_path(&self) -> &Path {
        &self.shared.table_path
    }
}

impl LockSystem for FileLockSystem {
    fn confirm(
        &self,
        now: DateTime<Utc>,
        name0: &str,
        name1: &str,
        conditions: &[Condition],
    ) -> Result<Release, LockError> {
        let held = self
            .shared
            .with_table(now, |table| table.confirm(now, name0, name1, conditions))?;
        if held.is_empty() {
            return Ok(Release::noop());
        }

        let shared = Arc::clone(&self.shared);
        Ok(Release::new(move || {
            let result = shared.with_table(Utc::now(), |table| {
                table.release(&held);
                Ok(())
            });
            if let Err(e) = result {
                warn!(error = %e, tokens = ?held, "failed to release held locks");
            }
        }))
    }

    fn create(&self, now: DateTime<Utc>, details: LockDetails) -> Result<String, LockError> {
        self.shared.with_table(now, |table| table.create(now, details))
    }

    fn refresh(
        &self,
        now: DateTime<Utc>,
        token: &str,
        timeout: Option<Duration>,
    ) -> Result<LockDetails, LockError> {
        self.shared
            .with_table(now, |table| table.refresh(now, token, timeout))
    }

    fn unlock(
        &self,
        now: DateTime<Utc>,
        token: &str,
        principal: &Principal,
    ) -> Result<(), LockError> {
        self.shared
            .with_table(now, |table| table.unlock(now, token, principal))
    }

    fn list(&self, now: DateTime<Utc>) -> Result<Vec<(String, LockDetails)>, LockError> {
        self.shared.with_table(now, |table| {
            table.collect_expired(now);
            Ok(table
                .locks()
                .map(|lock| (lock.token.clone(), lock.details.clone()))
                .collect())
        })
    }
}

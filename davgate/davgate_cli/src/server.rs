//! The server object wiring configuration to the filesystem and locks.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use davgate_core::config::LockBackend;
use davgate_core::{Depth, LockOperation, Principal, ServerConfig};
use davgate_fs::{AuthorizedFs, RecursionGuard};
use davgate_lock::{Condition, FileLockSystem, LockDetails, LockSystem, MemLockSystem, Release};
use davgate_policy::RuleEvaluator;
use std::fs;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a front end needs to serve requests.
pub struct DavServer {
    config: ServerConfig,
    fs: AuthorizedFs<RuleEvaluator>,
    locks: Arc<dyn LockSystem>,
}

impl DavServer {
    /// Build a server from configuration.
    ///
    /// The storage root is created if it does not exist.
    pub fn new(config: ServerConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)
            .with_context(|| format!("cannot create storage root {}", config.root.display()))?;

        let locks: Arc<dyn LockSystem> = match config.locks.backend {
            LockBackend::Memory => Arc::new(MemLockSystem::new()),
            LockBackend::File => {
                let dir = config
                    .locks
                    .directory
                    .as_ref()
                    .ok_or_else(|| anyhow!("file lock backend needs a directory"))?;
                Arc::new(
                    FileLockSystem::open(dir)
                        .map_err(|e| anyhow!("cannot open lock table: {e}"))?,
                )
            }
        };

        info!(root = %config.root.display(), backend = ?config.locks.backend, "server ready");
        Ok(Self {
            fs: AuthorizedFs::new(config.root.clone(), RuleEvaluator::new()),
            locks,
            config,
        })
    }

    /// The authorized filesystem.
    pub fn fs(&self) -> &AuthorizedFs<RuleEvaluator> {
        &self.fs
    }

    /// The lock manager.
    pub fn locks(&self) -> &dyn LockSystem {
        self.locks.as_ref()
    }

    /// A recursion guard sized from configuration.
    pub fn recursion_guard(&self) -> RecursionGuard {
        RecursionGuard::new(self.config.transfer.max_copy_recursion)
    }

    /// Confirm the locks a mutation of `name0` and `name1` needs.
    ///
    /// With a token, the mutation must be covered by that lock. Without
    /// one, each named resource is locked at depth zero until the returned
    /// guard is dropped, so the mutation fails while someone else holds a
    /// lock over it.
    pub fn guard_mutation(
        &self,
        principal: &Principal,
        name0: &str,
        name1: &str,
        token: Option<&str>,
    ) -> Result<MutationGuard> {
        let now = Utc::now();
        let mut guard = MutationGuard {
            locks: Arc::clone(&self.locks),
            principal: principal.clone(),
            temporary: Vec::new(),
            release: None,
        };

        let conditions: Vec<Condition> = match token {
            Some(token) => vec![Condition::token(token)],
            None => {
                let mut conditions = Vec::new();
                let names = [name0, name1];
                for (i, name) in names.iter().enumerate() {
                    if name.is_empty() || names[..i].contains(name) {
                        continue;
                    }
                    let details = LockDetails::new(*name, Depth::Zero, None, principal.clone());
                    let token = self.locks.create(now, details).map_err(|e| {
                        anyhow!("{}: {}", e.status(LockOperation::Create), e)
                    })?;
                    debug!(token = %token, resource = *name, "temporary lock");
                    guard.temporary.push(token.clone());
                    conditions.push(Condition::token(token));
                }
                conditions
            }
        };

        let release = self
            .locks
            .confirm(now, name0, name1, &conditions)
            .map_err(|e| anyhow!("{}: {}", e.status(LockOperation::Confirm), e))?;
        guard.release = Some(release);
        Ok(guard)
    }
}

/// Holds confirmed locks for one mutation and drops temporary locks.
pub struct MutationGuard {
    locks: Arc<dyn LockSystem>,
    principal: Principal,
    temporary: Vec<String>,
    release: Option<Release>,
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release.release();
        }
        let now = Utc::now();
        for token in self.temporary.drain(..) {
            if let Err(e) = self.locks.unlock(now, &token, &self.principal) {
                warn!(token = %token, error = %e, "failed to drop temporary lock");
            }
        }
    }
}

//! Command implementations
//!
//! Each command runs as one principal against a [`DavServer`], the way a
//! protocol front end would serve a single request.

pub mod lock;
pub mod props;
pub mod resource;

use anyhow::{anyhow, Result};
use davgate_core::{FsError, LockError, LockOperation, Principal};
use davgate_fs::TransferError;

use crate::server::{DavServer, MutationGuard};

/// The caller of a command.
pub struct Session<'a> {
    /// The server the command runs against
    pub server: &'a DavServer,

    /// The calling principal
    pub principal: Principal,

    /// Lock token presented with mutations
    pub lock_token: Option<String>,
}

impl Session<'_> {
    /// Confirm locks for a mutation of up to two resources.
    pub fn guard(&self, name0: &str, name1: &str) -> Result<MutationGuard> {
        self.server
            .guard_mutation(&self.principal, name0, name1, self.lock_token.as_deref())
    }
}

/// Attach the protocol status to a filesystem error.
pub fn fs_error(err: FsError) -> anyhow::Error {
    anyhow!("{}: {}", err.status(), err)
}

/// Attach the protocol status to a lock error.
pub fn lock_error(err: LockError, operation: LockOperation) -> anyhow::Error {
    anyhow!("{}: {}", err.status(operation), err)
}

/// Report a failed copy or move.
pub fn transfer_error(err: TransferError) -> anyhow::Error {
    anyhow!("{}", err)
}

//! Lock commands

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use davgate_core::{DavStatus, Depth, FsError, LockOperation};
use davgate_fs::{FileSystem, OpenFlags};
use davgate_lock::LockDetails;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use super::{fs_error, lock_error, Session};

/// Arguments for the lock command
#[derive(Args)]
pub struct LockArgs {
    /// The resource to lock; created empty if missing
    pub path: String,

    /// 0 or infinity
    #[clap(long, default_value = "infinity")]
    pub depth: Depth,

    /// Lifetime in seconds; the lock never expires when omitted
    #[clap(long)]
    pub timeout: Option<u64>,

    /// Owner description stored with the lock
    #[clap(long, default_value = "")]
    pub owner: String,
}

/// Arguments for the refresh command
#[derive(Args)]
pub struct RefreshArgs {
    /// Lock token
    pub token: String,

    /// New lifetime in seconds; the lock never expires when omitted
    #[clap(long)]
    pub timeout: Option<u64>,
}

/// Arguments for the unlock command
#[derive(Args)]
pub struct UnlockArgs {
    /// Lock token
    pub token: String,
}

fn describe(token: &str, details: &LockDetails) -> serde_json::Value {
    json!({
        "token": token,
        "root": details.root,
        "depth": details.depth.to_string(),
        "timeout": details.timeout.map(|t| t.as_secs()),
        "owner": details.owner_xml,
        "principal": details.principal.name(),
    })
}

/// Implementation of the lock command
///
/// Prints the token on the first line, then the status: 201 if an empty
/// resource was created, 200 otherwise.
pub fn execute_lock(session: &Session, args: &LockArgs) -> Result<()> {
    let fs = session.server.fs();
    let locks = session.server.locks();

    let details = LockDetails::new(
        args.path.as_str(),
        args.depth,
        args.timeout.map(Duration::from_secs),
        session.principal.clone(),
    )
    .with_owner(args.owner.as_str());
    let token = locks
        .create(Utc::now(), details)
        .map_err(|e| lock_error(e, LockOperation::Create))?;

    let created = match fs.stat(&session.principal, &args.path) {
        Ok(_) => Ok(false),
        Err(FsError::NotFound) => fs
            .open(
                &session.principal,
                &args.path,
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            )
            .map(|_| true),
        Err(err) => Err(err),
    };

    let created = match created {
        Ok(created) => created,
        Err(err) => {
            if let Err(e) = locks.unlock(Utc::now(), &token, &session.principal) {
                warn!(token = %token, error = %e, "failed to drop lock");
            }
            return Err(fs_error(err));
        }
    };

    println!("{}", token);
    println!("{}", if created { DavStatus::Created } else { DavStatus::Ok });
    Ok(())
}

/// Implementation of the refresh command
pub fn execute_refresh(session: &Session, args: &RefreshArgs) -> Result<()> {
    let details = session
        .server
        .locks()
        .refresh(
            Utc::now(),
            &args.token,
            args.timeout.map(Duration::from_secs),
        )
        .map_err(|e| lock_error(e, LockOperation::Refresh))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&describe(&args.token, &details))?
    );
    Ok(())
}

/// Implementation of the unlock command
pub fn execute_unlock(session: &Session, args: &UnlockArgs) -> Result<()> {
    session
        .server
        .locks()
        .unlock(Utc::now(), &args.token, &session.principal)
        .map_err(|e| lock_error(e, LockOperation::Unlock))?;
    println!("{}", DavStatus::NoContent);
    Ok(())
}

/// Implementation of the locks command
///
/// Lists every unexpired lock, one JSON object per line.
pub fn execute_locks(session: &Session) -> Result<()> {
    let locks = session
        .server
        .locks()
        .list(Utc::now())
        .map_err(|e| lock_error(e, LockOperation::Confirm))?;
    for (token, details) in &locks {
        println!("{}", describe(token, details));
    }
    Ok(())
}

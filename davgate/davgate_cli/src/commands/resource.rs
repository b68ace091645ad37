//! Resource commands
//!
//! Listing, reading and writing resources, and copying or moving trees.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use davgate_core::{DavStatus, Depth, FsError, ResourceInfo, ResourcePath};
use davgate_fs::{copy_files, move_files, DavFile, FileSystem, OpenFlags, Walk};
use davgate_lock::Condition;
use serde_json::json;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use super::{fs_error, transfer_error, Session};

/// Arguments for the ls command
#[derive(Args)]
pub struct LsArgs {
    /// Collection to list
    #[clap(default_value = "/")]
    pub path: String,

    /// How far to descend: 0, 1 or infinity
    #[clap(long, default_value = "1")]
    pub depth: Depth,
}

/// Arguments for commands naming a single resource
#[derive(Args)]
pub struct PathArgs {
    /// The resource
    pub path: String,
}

/// Arguments for the put command
#[derive(Args)]
pub struct PutArgs {
    /// The resource to write
    pub path: String,

    /// Read content from this file instead of stdin
    #[clap(long)]
    pub from: Option<PathBuf>,

    /// Only write if the resource's current ETag matches
    #[clap(long)]
    pub if_match: Option<String>,
}

/// Arguments for the mv command
#[derive(Args)]
pub struct MoveArgs {
    /// Source resource
    pub src: String,

    /// Destination resource
    pub dst: String,

    /// Replace an existing destination
    #[clap(long)]
    pub overwrite: bool,
}

/// Arguments for the cp command
#[derive(Args)]
pub struct CopyArgs {
    /// Source resource
    pub src: String,

    /// Destination resource
    pub dst: String,

    /// Replace an existing destination
    #[clap(long)]
    pub overwrite: bool,

    /// 0 copies a collection without its members
    #[clap(long, default_value = "infinity")]
    pub depth: Depth,
}

fn describe(info: &ResourceInfo) -> serde_json::Value {
    json!({
        "path": info.path.as_str(),
        "kind": if info.is_dir() { "collection" } else { "file" },
        "size": info.size,
        "modified": info.modified.to_rfc3339(),
        "etag": info.etag(),
    })
}

/// Implementation of the ls command
pub fn execute_ls(session: &Session, args: &LsArgs) -> Result<()> {
    let start = ResourcePath::parse(&args.path).map_err(|e| fs_error(e.into()))?;
    let fs = session.server.fs();
    let mut stdout = io::stdout().lock();
    let mut failed = None;

    for entry in Walk::new(fs, &session.principal, start.clone(), args.depth) {
        match entry.info {
            Ok(info) => {
                let marker = if info.is_dir() { "d" } else { "-" };
                writeln!(stdout, "{}\t{}\t{}", marker, info.size, info.path)?;
            }
            Err(err) => {
                eprintln!("{}: {}", entry.path, err.status());
                if entry.path == start {
                    failed = Some(err);
                }
            }
        }
    }

    match failed {
        Some(err) => Err(fs_error(err)),
        None => Ok(()),
    }
}

/// Implementation of the stat command
pub fn execute_stat(session: &Session, args: &PathArgs) -> Result<()> {
    let info = session
        .server
        .fs()
        .stat(&session.principal, &args.path)
        .map_err(fs_error)?;
    println!("{}", serde_json::to_string_pretty(&describe(&info))?);
    Ok(())
}

/// Implementation of the mkdir command
pub fn execute_mkdir(session: &Session, args: &PathArgs) -> Result<()> {
    let _guard = session.guard(&args.path, "")?;
    session
        .server
        .fs()
        .create_dir(&session.principal, &args.path)
        .map_err(fs_error)?;
    println!("{}", DavStatus::Created);
    Ok(())
}

/// Implementation of the cat command
pub fn execute_cat(session: &Session, args: &PathArgs) -> Result<()> {
    let mut file = session
        .server
        .fs()
        .open(&session.principal, &args.path, OpenFlags::READ)
        .map_err(fs_error)?;
    let mut stdout = io::stdout().lock();
    io::copy(&mut file, &mut stdout).map_err(|e| fs_error(FsError::from_io(e)))?;
    stdout.flush()?;
    Ok(())
}

/// Implementation of the put command
pub fn execute_put(session: &Session, args: &PutArgs) -> Result<()> {
    let mut content = Vec::new();
    match &args.from {
        Some(path) => {
            File::open(path)
                .and_then(|mut file| file.read_to_end(&mut content))
                .with_context(|| format!("cannot read {}", path.display()))?;
        }
        None => {
            io::stdin()
                .read_to_end(&mut content)
                .context("cannot read stdin")?;
        }
    }

    let fs = session.server.fs();
    let _guard = session.guard(&args.path, "")?;
    let current = match fs.stat(&session.principal, &args.path) {
        Ok(info) => Some(info),
        Err(FsError::NotFound) => None,
        Err(err) => return Err(fs_error(err)),
    };
    if let Some(etag) = &args.if_match {
        if Condition::etag(etag.as_str()).check_etag(current.as_ref()) != Some(true) {
            return Err(anyhow!("{}: etag mismatch", DavStatus::PreconditionFailed));
        }
    }
    let existed = current.is_some();

    let mut file = fs
        .open(
            &session.principal,
            &args.path,
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
        )
        .map_err(fs_error)?;
    file.write_all(&content)
        .and_then(|()| file.flush())
        .map_err(|e| fs_error(FsError::from_io(e)))?;

    let info = file.info().map_err(fs_error)?;
    println!(
        "{}",
        if existed {
            DavStatus::NoContent
        } else {
            DavStatus::Created
        }
    );
    println!("ETag: {}", info.etag());
    Ok(())
}

/// Implementation of the rm command
pub fn execute_rm(session: &Session, args: &PathArgs) -> Result<()> {
    let _guard = session.guard(&args.path, "")?;
    session
        .server
        .fs()
        .remove_all(&session.principal, &args.path)
        .map_err(fs_error)?;
    println!("{}", DavStatus::NoContent);
    Ok(())
}

/// Implementation of the mv command
pub fn execute_mv(session: &Session, args: &MoveArgs) -> Result<()> {
    let _guard = session.guard(&args.src, &args.dst)?;
    let status = move_files(
        session.server.fs(),
        &session.principal,
        &args.src,
        &args.dst,
        args.overwrite,
    )
    .map_err(transfer_error)?;
    println!("{}", status);
    Ok(())
}

/// Implementation of the cp command
pub fn execute_cp(session: &Session, args: &CopyArgs) -> Result<()> {
    let _guard = session.guard("", &args.dst)?;
    let status = copy_files(
        session.server.fs(),
        &session.principal,
        &args.src,
        &args.dst,
        args.overwrite,
        args.depth,
        session.server.recursion_guard(),
    )
    .map_err(transfer_error)?;
    println!("{}", status);
    Ok(())
}

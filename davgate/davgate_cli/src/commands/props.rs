//! Property and policy commands

use anyhow::{anyhow, Result};
use clap::Args;
use davgate_fs::{DavFile, FileSystem, OpenFlags, PropPatch, Property, PropertyName};
use davgate_policy::Permission;

use super::{fs_error, Session};

/// Arguments for the props command
#[derive(Args)]
pub struct PropsArgs {
    /// The resource
    pub path: String,
}

/// Arguments for the setprop command
#[derive(Args)]
pub struct SetPropArgs {
    /// The resource
    pub path: String,

    /// Property name in `{namespace}local` form
    pub name: PropertyName,

    /// Property value
    pub value: String,
}

/// Arguments for the delprop command
#[derive(Args)]
pub struct DelPropArgs {
    /// The resource
    pub path: String,

    /// Property name in `{namespace}local` form
    pub name: PropertyName,
}

/// Arguments for the decide command
#[derive(Args)]
pub struct DecideArgs {
    /// The resource
    pub path: String,

    /// Create, Read, Write, Delete or Stat
    #[clap(long)]
    pub action: Permission,
}

/// Implementation of the props command
pub fn execute_props(session: &Session, args: &PropsArgs) -> Result<()> {
    let file = session
        .server
        .fs()
        .open(&session.principal, &args.path, OpenFlags::READ)
        .map_err(fs_error)?;
    for (name, value) in file.dead_props().map_err(fs_error)? {
        println!("{}\t{}", name, value);
    }
    Ok(())
}

fn apply_patch(session: &Session, path: &str, update: PropPatch) -> Result<()> {
    let _guard = session.guard(path, "")?;
    let mut file = session
        .server
        .fs()
        .open(&session.principal, path, OpenFlags::READ | OpenFlags::WRITE)
        .map_err(fs_error)?;

    let stats = file.patch(&[update]).map_err(fs_error)?;
    let mut failed = false;
    for stat in &stats {
        for prop in &stat.props {
            println!("{}\t{}", stat.status, prop.name);
        }
        failed |= !stat.status.is_success();
    }

    if failed {
        return Err(anyhow!("property update rejected"));
    }
    Ok(())
}

/// Implementation of the setprop command
pub fn execute_setprop(session: &Session, args: &SetPropArgs) -> Result<()> {
    apply_patch(
        session,
        &args.path,
        PropPatch::set(vec![Property::new(args.name.clone(), args.value.clone())]),
    )
}

/// Implementation of the delprop command
pub fn execute_delprop(session: &Session, args: &DelPropArgs) -> Result<()> {
    apply_patch(
        session,
        &args.path,
        PropPatch::remove(vec![args.name.clone()]),
    )
}

/// Implementation of the decide command
///
/// Prints the gate's decision without touching the resource.
pub fn execute_decide(session: &Session, args: &DecideArgs) -> Result<()> {
    let decision = session
        .server
        .fs()
        .decide(&session.principal, args.action, &args.path)
        .map_err(fs_error)?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

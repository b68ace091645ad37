//! Recursive copy and move.
//!
//! Both operations work purely through a [`FileSystem`], so every step is
//! subject to the same authorization gate as a direct request, and report
//! protocol statuses: `201 Created` when the destination did not exist,
//! `204 No Content` when it was replaced.

use davgate_core::{DavStatus, Depth, FsError, Principal, ResourcePath};
use std::io::{self, Write};
use thiserror::Error;
use tracing::debug;

use crate::filesystem::{DavFile, FileSystem, OpenFlags};
use crate::props::{PropPatch, Property, PropertySet};

/// Default nesting limit for recursive copies.
pub const DEFAULT_RECURSION_CEILING: usize = 1000;

/// A failed copy or move, with the status to report.
#[derive(Debug, Error)]
#[error("{status}: {source}")]
pub struct TransferError {
    /// Status for the protocol front end.
    pub status: DavStatus,

    /// What went wrong.
    pub source: FsError,
}

impl TransferError {
    fn new(status: DavStatus, source: FsError) -> Self {
        Self { status, source }
    }

    /// Report an error with its default status.
    fn from_fs(source: FsError) -> Self {
        Self::new(source.status(), source)
    }

    fn forbidden(source: FsError) -> Self {
        Self::new(DavStatus::Forbidden, source)
    }

    fn internal(source: FsError) -> Self {
        Self::new(DavStatus::InternalServerError, source)
    }
}

/// Bounds the nesting of a recursive copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecursionGuard {
    depth: usize,
    ceiling: usize,
}

impl RecursionGuard {
    /// A guard allowing `ceiling` nested levels.
    pub fn new(ceiling: usize) -> Self {
        Self { depth: 0, ceiling }
    }

    /// Current nesting level.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Enter one more level.
    fn enter(self) -> Result<Self, TransferError> {
        if self.depth >= self.ceiling {
            return Err(TransferError::internal(FsError::RecursionTooDeep));
        }
        Ok(Self {
            depth: self.depth + 1,
            ceiling: self.ceiling,
        })
    }
}

impl Default for RecursionGuard {
    fn default() -> Self {
        Self::new(DEFAULT_RECURSION_CEILING)
    }
}

/// Reject transfers onto the source itself.
fn check_distinct(src: &str, dst: &str) -> Result<(), TransferError> {
    let src = ResourcePath::parse(src).map_err(|e| TransferError::from_fs(e.into()))?;
    let dst = ResourcePath::parse(dst).map_err(|e| TransferError::from_fs(e.into()))?;
    if src == dst {
        return Err(TransferError::forbidden(FsError::InvalidOperation(
            "destination equals source".to_string(),
        )));
    }
    Ok(())
}

/// Reject moves into the source's own subtree.
fn check_outside(src: &str, dst: &str) -> Result<(), TransferError> {
    let src = ResourcePath::parse(src).map_err(|e| TransferError::from_fs(e.into()))?;
    let dst = ResourcePath::parse(dst).map_err(|e| TransferError::from_fs(e.into()))?;
    if dst.is_within(&src) {
        return Err(TransferError::forbidden(FsError::InvalidOperation(format!(
            "cannot move {} into itself",
            src
        ))));
    }
    Ok(())
}

/// Whether `dst` exists. Errors other than not-found are forbidden.
fn prepare_destination<F: FileSystem>(
    fs: &F,
    principal: &Principal,
    dst: &str,
    overwrite: bool,
) -> Result<bool, TransferError> {
    match fs.stat(principal, dst) {
        Ok(_) if !overwrite => Err(TransferError::new(
            DavStatus::PreconditionFailed,
            FsError::AlreadyExists,
        )),
        Ok(_) => match fs.remove_all(principal, dst) {
            Ok(()) | Err(FsError::NotFound) => Ok(false),
            Err(e) => Err(TransferError::forbidden(e)),
        },
        Err(FsError::NotFound) => Ok(true),
        Err(e) => Err(TransferError::forbidden(e)),
    }
}

/// Write `props` onto an open destination.
fn copy_props<D: DavFile>(dst: &mut D, props: PropertySet) -> Result<(), FsError> {
    if props.is_empty() {
        return Ok(());
    }
    let patch = PropPatch::set(
        props
            .into_iter()
            .map(|(name, value)| Property::new(name, value))
            .collect(),
    );
    for stat in dst.patch(&[patch])? {
        if !stat.status.is_success() {
            return Err(FsError::NotAllowed);
        }
    }
    Ok(())
}

/// Unwrap an `FsError` carried inside an `io::Error`.
fn io_error(err: io::Error) -> FsError {
    let carried = match err.get_ref().and_then(|inner| inner.downcast_ref::<FsError>()) {
        Some(FsError::IsADirectory) => Some(FsError::IsADirectory),
        Some(FsError::ReadOnlyHandle) => Some(FsError::ReadOnlyHandle),
        _ => None,
    };
    carried.unwrap_or_else(|| FsError::Storage(err))
}

/// Copy `src` to `dst`.
///
/// Directories are recreated; with `Depth::Infinity` their children are
/// copied recursively, skipping sidecars. Files are copied byte for byte,
/// then their dead properties. A file whose bytes arrived but whose
/// properties did not is reported as an internal error.
///
/// # Arguments
///
/// * `overwrite` - Replace an existing destination instead of failing with
///   `412 Precondition Failed`.
/// * `guard` - Recursion bound; exceeding it fails with
///   `500 Internal Server Error`.
pub fn copy_files<F: FileSystem>(
    fs: &F,
    principal: &Principal,
    src: &str,
    dst: &str,
    overwrite: bool,
    depth: Depth,
    guard: RecursionGuard,
) -> Result<DavStatus, TransferError> {
    let guard = guard.enter()?;
    check_distinct(src, dst)?;

    let mut src_file = fs
        .open(principal, src, OpenFlags::READ)
        .map_err(TransferError::from_fs)?;
    let src_info = src_file.info().map_err(TransferError::from_fs)?;

    let created = prepare_destination(fs, principal, dst, overwrite)?;

    if src_info.is_dir() {
        fs.create_dir(principal, dst).map_err(|e| match e {
            FsError::Conflict => TransferError::new(DavStatus::Conflict, e),
            e => TransferError::forbidden(e),
        })?;

        let props = src_file.dead_props().map_err(TransferError::internal)?;
        if !props.is_empty() {
            let mut dst_dir = fs
                .open(principal, dst, OpenFlags::READ | OpenFlags::WRITE)
                .map_err(TransferError::forbidden)?;
            copy_props(&mut dst_dir, props).map_err(TransferError::internal)?;
        }

        if depth == Depth::Infinity {
            let children = fs
                .read_dir(principal, src)
                .map_err(TransferError::forbidden)?;
            let dst_path = ResourcePath::parse(dst).map_err(|e| TransferError::from_fs(e.into()))?;
            for child in children {
                if child.path.is_sidecar() {
                    continue;
                }
                let Some(name) = child.path.file_name() else {
                    continue;
                };
                let child_dst = dst_path
                    .join(name)
                    .map_err(|e| TransferError::from_fs(e.into()))?;
                copy_files(
                    fs,
                    principal,
                    child.path.as_str(),
                    child_dst.as_str(),
                    overwrite,
                    depth,
                    guard,
                )?;
            }
        }
    } else {
        let mut dst_file = fs
            .open(
                principal,
                dst,
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            )
            .map_err(|e| match e {
                FsError::NotFound | FsError::Conflict => {
                    TransferError::new(DavStatus::Conflict, e)
                }
                e => TransferError::forbidden(e),
            })?;

        // Properties and the final flush are attempted even after a failed
        // byte copy; the first error wins.
        let copied = io::copy(&mut src_file, &mut dst_file).map_err(io_error);
        let propped = src_file
            .dead_props()
            .and_then(|props| copy_props(&mut dst_file, props));
        let flushed = dst_file.flush().map_err(io_error);
        copied
            .and(propped)
            .and(flushed)
            .map_err(TransferError::internal)?;
    }

    debug!(principal = %principal, from = src, to = dst, depth = guard.depth(), "copied");
    Ok(if created {
        DavStatus::Created
    } else {
        DavStatus::NoContent
    })
}

/// Move `src` to `dst` with a single rename.
///
/// The source is resolved before the destination is touched. An existing
/// destination is then removed when `overwrite` is set; otherwise the move
/// fails with `412 Precondition Failed` and nothing is touched.
pub fn move_files<F: FileSystem>(
    fs: &F,
    principal: &Principal,
    src: &str,
    dst: &str,
    overwrite: bool,
) -> Result<DavStatus, TransferError> {
    check_distinct(src, dst)?;
    fs.stat(principal, src).map_err(TransferError::from_fs)?;
    check_outside(src, dst)?;
    let created = prepare_destination(fs, principal, dst, overwrite)?;
    fs.rename(principal, src, dst)
        .map_err(TransferError::from_fs)?;

    debug!(principal = %principal, from = src, to = dst, "moved");
    Ok(if created {
        DavStatus::Created
    } else {
        DavStatus::NoContent
    })
}

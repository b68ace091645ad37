//! Error types for the davgate storage engine.
//!
//! Errors are organized by subsystem, with each subsystem having its own
//! error type. The root error type, `Error`, can wrap any of the
//! subsystem-specific errors, allowing for uniform error handling at the
//! top level.
//!
//! None of these types distinguishes "absent" from "hidden": both are
//! `FsError::NotFound`.

use std::io;
use thiserror::Error;

/// Root error type for davgate.
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem errors
    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    /// Lock manager errors
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Policy evaluation errors
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors produced by filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// The resource does not exist, or the caller may not see it
    #[error("not found")]
    NotFound,

    /// The caller can see the resource but the requested verb is denied
    #[error("not allowed")]
    NotAllowed,

    /// The operation violates a structural invariant
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The target of a create already exists
    #[error("already exists")]
    AlreadyExists,

    /// An intermediate collection is missing
    #[error("conflict: intermediate collection missing")]
    Conflict,

    /// A directory was required
    #[error("not a directory")]
    NotADirectory,

    /// Byte I/O was attempted on a directory
    #[error("is a directory")]
    IsADirectory,

    /// A mutation was attempted through a handle opened read-only
    #[error("handle is read-only")]
    ReadOnlyHandle,

    /// A recursive copy exceeded its recursion ceiling
    #[error("recursion too deep")]
    RecursionTooDeep,

    /// The underlying storage failed
    #[error("storage error: {0}")]
    Storage(#[from] io::Error),
}

impl FsError {
    /// Map a native I/O error onto the filesystem taxonomy.
    ///
    /// Missing entries become `NotFound`, existing entries become
    /// `AlreadyExists`; anything else stays a storage failure.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::AlreadyExists => Self::AlreadyExists,
            _ => Self::Storage(err),
        }
    }

    /// Map a native I/O error raised while creating a resource.
    ///
    /// A missing entry at create time means the parent collection is
    /// missing, and a file in its place means it is not a collection.
    /// Both are conflicts rather than not-found.
    pub fn from_create_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => Self::Conflict,
            _ => Self::from_io(err),
        }
    }

    /// Check whether this error is the not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Errors produced by the lock manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// None of the presented conditions could be confirmed; the caller may
    /// retry with a different condition set
    #[error("confirmation failed")]
    ConfirmationFailed,

    /// The caller does not own the lock
    #[error("forbidden")]
    Forbidden,

    /// The resource is locked, or the lock is currently held
    #[error("locked")]
    Locked,

    /// No lock with the given token exists
    #[error("no such lock")]
    NoSuchLock,

    /// Locks are either zero or infinite depth
    #[error("invalid lock depth")]
    InvalidDepth,

    /// The lock backend failed
    #[error("lock backend error: {0}")]
    Backend(String),
}

/// Errors raised while evaluating a policy document.
///
/// These never leave the policy engine: they are downgraded to a denial.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The policy document could not be parsed
    #[error("policy document parse error: {0}")]
    DocumentParse(String),

    /// The policy document could not be evaluated against the input
    #[error("policy evaluation failed: {0}")]
    Evaluation(String),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// The configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// The configuration is invalid
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type used throughout davgate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let error: Error = FsError::NotFound.into();
        assert!(matches!(error, Error::Fs(FsError::NotFound)));

        let error: Error = LockError::Locked.into();
        assert!(matches!(error, Error::Lock(LockError::Locked)));

        let error: Error = ConfigError::Invalid("root".into()).into();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn test_io_mapping() {
        let err = FsError::from_io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.is_not_found());

        let err = FsError::from_io(io::Error::new(io::ErrorKind::AlreadyExists, "there"));
        assert!(matches!(err, FsError::AlreadyExists));

        let err = FsError::from_io(io::Error::new(io::ErrorKind::PermissionDenied, "eacces"));
        assert!(matches!(err, FsError::Storage(_)));

        let err = FsError::from_create_io(io::Error::new(io::ErrorKind::NotFound, "no parent"));
        assert!(matches!(err, FsError::Conflict));
    }

    #[test]
    fn test_error_display() {
        let error: Error = FsError::NotAllowed.into();
        assert_eq!(error.to_string(), "Filesystem error: not allowed");
    }
}

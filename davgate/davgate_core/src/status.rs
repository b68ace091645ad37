//! Protocol-level result codes.
//!
//! The mapping from core errors to these codes is the contract with the
//! protocol front end. Callers only ever see one of these codes, never a raw
//! storage message.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FsError, LockError};

/// A protocol-level outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DavStatus {
    /// 200
    Ok,
    /// 201
    Created,
    /// 204
    NoContent,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 405
    MethodNotAllowed,
    /// 409
    Conflict,
    /// 412
    PreconditionFailed,
    /// 423
    Locked,
    /// 500
    InternalServerError,
}

impl DavStatus {
    /// The numeric status code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::NoContent => 204,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::Conflict => 409,
            Self::PreconditionFailed => 412,
            Self::Locked => 423,
            Self::InternalServerError => 500,
        }
    }

    /// The canonical reason phrase.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::NoContent => "No Content",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::Conflict => "Conflict",
            Self::PreconditionFailed => "Precondition Failed",
            Self::Locked => "Locked",
            Self::InternalServerError => "Internal Server Error",
        }
    }

    /// Check whether this is a 2xx outcome.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Created | Self::NoContent)
    }
}

impl fmt::Display for DavStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// The lock manager operation an error came from.
///
/// Some lock errors map to different codes depending on the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOperation {
    /// Confirming conditions before a mutation
    Confirm,
    /// Creating a lock
    Create,
    /// Refreshing a lock
    Refresh,
    /// Releasing a lock
    Unlock,
}

impl FsError {
    /// The protocol status for this error.
    pub fn status(&self) -> DavStatus {
        match self {
            Self::NotFound => DavStatus::NotFound,
            Self::NotAllowed => DavStatus::Forbidden,
            Self::InvalidOperation(_) => DavStatus::Forbidden,
            Self::AlreadyExists => DavStatus::MethodNotAllowed,
            Self::Conflict => DavStatus::Conflict,
            Self::NotADirectory | Self::IsADirectory => DavStatus::Conflict,
            Self::ReadOnlyHandle => DavStatus::Forbidden,
            Self::RecursionTooDeep => DavStatus::InternalServerError,
            Self::Storage(_) => DavStatus::InternalServerError,
        }
    }
}

impl LockError {
    /// The protocol status for this error when raised by `operation`.
    pub fn status(&self, operation: LockOperation) -> DavStatus {
        match (self, operation) {
            (Self::Locked, _) => DavStatus::Locked,
            (Self::Forbidden, _) => DavStatus::Forbidden,
            (Self::NoSuchLock, LockOperation::Unlock) => DavStatus::Conflict,
            (Self::NoSuchLock, _) => DavStatus::PreconditionFailed,
            (Self::ConfirmationFailed, _) => DavStatus::PreconditionFailed,
            (Self::InvalidDepth, _) => DavStatus::PreconditionFailed,
            (Self::Backend(_), _) => DavStatus::InternalServerError,
        }
    }
}

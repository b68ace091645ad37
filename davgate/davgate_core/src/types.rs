//! Shared data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::Metadata;
use std::str::FromStr;
use thiserror::Error;

use crate::path::ResourcePath;

/// Scope of a traversal or lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Depth {
    /// The resource only.
    Zero,
    /// The resource and its immediate children.
    One,
    /// The resource and everything beneath it.
    Infinity,
}

impl Depth {
    /// The depth remaining after descending one level.
    pub fn descend(self) -> Depth {
        match self {
            Self::Zero | Self::One => Self::Zero,
            Self::Infinity => Self::Infinity,
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "0"),
            Self::One => write!(f, "1"),
            Self::Infinity => write!(f, "infinity"),
        }
    }
}

/// A depth string was not `0`, `1` or `infinity`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid depth: {0}")]
pub struct InvalidDepth(pub String);

impl FromStr for Depth {
    type Err = InvalidDepth;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" => Ok(Self::Zero),
            "1" => Ok(Self::One),
            "infinity" => Ok(Self::Infinity),
            _ => Err(InvalidDepth(s.to_string())),
        }
    }
}

/// Whether a resource is a plain file or a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A plain resource with byte content.
    File,
    /// A collection of other resources.
    Directory,
}

impl ResourceKind {
    /// Derive the kind from native metadata.
    pub fn of(metadata: &Metadata) -> Self {
        if metadata.is_dir() {
            Self::Directory
        } else {
            Self::File
        }
    }
}

/// Metadata about a resource, as returned by stat and directory listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// The resource path.
    pub path: ResourcePath,

    /// File or directory.
    pub kind: ResourceKind,

    /// Content length in bytes (zero for directories).
    pub size: u64,

    /// Last modification time.
    pub modified: DateTime<Utc>,
}

impl ResourceInfo {
    /// Build resource info from native metadata.
    pub fn from_metadata(path: ResourcePath, metadata: &Metadata) -> Self {
        let kind = ResourceKind::of(metadata);
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH);
        Self {
            path,
            kind,
            size: if kind == ResourceKind::Directory { 0 } else { metadata.len() },
            modified,
        }
    }

    /// The last path segment; empty for the root.
    pub fn name(&self) -> &str {
        self.path.file_name().unwrap_or("")
    }

    /// Check whether this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == ResourceKind::Directory
    }

    /// A weak version tag derived from modification time and size.
    pub fn etag(&self) -> String {
        let nanos = self.modified.timestamp_nanos_opt().unwrap_or_default();
        format!("\"{:x}{:x}\"", nanos, self.size)
    }
}

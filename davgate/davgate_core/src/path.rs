//! Normalized resource paths.
//!
//! A `ResourcePath` is a slash-separated, root-relative name with exactly
//! one leading slash and no `.`/`..` segments. Paths are normalized before
//! any storage or policy lookup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::FsError;
use crate::sidecar::SIDECAR_PREFIX;

/// The path could not be normalized.
///
/// Deliberately converts to `FsError::NotFound` so that path probing looks
/// exactly like asking for a missing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedPath;

impl From<MalformedPath> for FsError {
    fn from(_: MalformedPath) -> Self {
        FsError::NotFound
    }
}

/// A normalized, root-relative resource path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePath(String);

impl ResourcePath {
    /// The storage root.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Normalize a raw name.
    ///
    /// Embedded NUL bytes and backslashes are rejected. Everything else is
    /// cleaned the way `path.Clean("/" + name)` would: duplicate slashes
    /// collapse, `.` segments vanish and `..` never climbs above the root.
    pub fn parse(name: &str) -> Result<Self, MalformedPath> {
        if name.contains('\0') || name.contains('\\') {
            return Err(MalformedPath);
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in name.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other),
            }
        }

        Ok(Self(format!("/{}", segments.join("/"))))
    }

    /// The normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether this is the storage root.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The parent directory, or `None` for the root.
    pub fn parent(&self) -> Option<ResourcePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// The last segment, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Append a single child name.
    pub fn join(&self, name: &str) -> Result<ResourcePath, MalformedPath> {
        if self.is_root() {
            Self::parse(name)
        } else {
            Self::parse(&format!("{}/{}", self.0, name))
        }
    }

    /// The first segment below the root, if any.
    pub fn top_segment(&self) -> Option<&str> {
        self.segments().next()
    }

    /// Iterate over the segments below the root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Check whether the last segment names a metadata sidecar.
    pub fn is_sidecar(&self) -> bool {
        self.file_name()
            .map(|name| name.starts_with(SIDECAR_PREFIX))
            .unwrap_or(false)
    }

    /// Check whether this path equals `other` or lies beneath it.
    pub fn is_within(&self, other: &ResourcePath) -> bool {
        if other.is_root() || self == other {
            return true;
        }
        self.0
            .strip_prefix(other.as_str())
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
    }

    /// Resolve this path beneath a native storage root.
    pub fn to_native(&self, root: &Path) -> PathBuf {
        let mut native = root.to_path_buf();
        for segment in self.segments() {
            native.push(segment);
        }
        native
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).map_err(|_| format!("malformed resource path: {:?}", value))
    }
}

impl From<ResourcePath> for String {
    fn from(path: ResourcePath) -> Self {
        path.0
    }
}

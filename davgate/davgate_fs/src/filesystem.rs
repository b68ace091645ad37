//! The filesystem contract consumed by protocol front ends.

use bitflags::bitflags;
use davgate_core::{FsError, Principal, ResourceInfo};
use std::io::{Read, Seek, Write};

use crate::props::{PropPatch, PropStat, PropertySet};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    /// How a resource is opened
    pub struct OpenFlags: u8 {
        const READ = 0b00000001;
        const WRITE = 0b00000010;
        const CREATE = 0b00000100;
        const TRUNCATE = 0b00001000;
        const EXCLUSIVE = 0b00010000;
    }
}

/// An open resource.
///
/// Byte I/O on a directory handle fails with [`FsError::IsADirectory`]
/// wrapped in the `io::Error`.
pub trait DavFile: Read + Write + Seek + Send {
    /// Current metadata of the open resource.
    fn info(&self) -> Result<ResourceInfo, FsError>;

    /// The resource's dead properties.
    fn dead_props(&self) -> Result<PropertySet, FsError>;

    /// Apply a property patch.
    ///
    /// Fails with [`FsError::ReadOnlyHandle`] unless the handle was opened
    /// with [`OpenFlags::WRITE`].
    fn patch(&mut self, patches: &[PropPatch]) -> Result<Vec<PropStat>, FsError>;
}

/// Trait for hierarchical resource stores.
///
/// Every method takes the calling principal explicitly. Names are raw
/// request paths; implementations normalize them and report malformed
/// names as [`FsError::NotFound`].
pub trait FileSystem: Send + Sync {
    /// Handle type returned by [`FileSystem::open`].
    type File: DavFile;

    /// Create a directory.
    fn create_dir(&self, principal: &Principal, name: &str) -> Result<(), FsError>;

    /// Open or create a resource.
    fn open(&self, principal: &Principal, name: &str, flags: OpenFlags)
        -> Result<Self::File, FsError>;

    /// Remove a resource and everything beneath it.
    fn remove_all(&self, principal: &Principal, name: &str) -> Result<(), FsError>;

    /// Rename a resource. The destination must not exist.
    fn rename(&self, principal: &Principal, from: &str, to: &str) -> Result<(), FsError>;

    /// Metadata of a resource.
    fn stat(&self, principal: &Principal, name: &str) -> Result<ResourceInfo, FsError>;

    /// The children of a directory the principal may see, sorted by name.
    fn read_dir(&self, principal: &Principal, name: &str) -> Result<Vec<ResourceInfo>, FsError>;
}

//! # davgate Filesystem
//!
//! `davgate_fs` exposes a native directory tree through the [`FileSystem`]
//! contract, with every operation gated by policy.
//!
//! Key concepts:
//!
//! 1. **Authorized filesystem**: Stat-gated existence, then verb-specific
//!    permission, then storage.
//!
//! 2. **Dead properties**: Client-defined properties kept in JSON sidecars.
//!
//! 3. **Tree operations**: Walk, copy and move built only on the contract,
//!    reporting protocol statuses.

pub mod authorized;
pub mod filesystem;
pub mod props;
pub mod transfer;
pub mod walk;

// Re-export key types and traits for convenience
pub use authorized::{AuthorizedFile, AuthorizedFs};
pub use filesystem::{DavFile, FileSystem, OpenFlags};
pub use props::{DeadPropertyStore, PropPatch, PropStat, Property, PropertyName, PropertySet};
pub use transfer::{copy_files, move_files, RecursionGuard, TransferError};
pub use walk::{walk_fs, Walk, WalkControl, WalkEntry};

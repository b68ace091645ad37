//! # Davgate Lock
//!
//! Resource-scoped write locks for the davgate filesystem.
//!
//! A lock covers its root resource and, with infinite depth, every
//! descendant. Mutations confirm the locks covering the resources they
//! touch; confirmed locks are held, and cannot be confirmed again, until the
//! returned [`Release`] guard is dropped.
//!
//! Two backends are provided:
//!
//! - [`MemLockSystem`]: state local to one process
//! - [`FileLockSystem`]: state persisted to a JSON file shared by processes

pub mod file;
pub mod memory;
pub mod model;
pub mod system;
pub mod table;

pub use file::FileLockSystem;
pub use memory::MemLockSystem;
pub use model::{new_token, Condition, LockDetails, Release};
pub use system::LockSystem;
pub use table::{ActiveLock, Hold, LockTable};

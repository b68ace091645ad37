//! # davgate Core
//!
//! `davgate_core` provides the shared building blocks of the davgate storage
//! engine: the error taxonomy, protocol status codes, resource paths,
//! principals, sidecar naming conventions and configuration.
//!
//! ## Core Principles
//!
//! 1. **Fail closed**: every authorization answer that cannot be computed is
//!    a denial, never an error surfaced to the caller.
//!
//! 2. **Existence hiding**: a caller that may not see a resource receives the
//!    same not-found answer whether the resource exists or not.
//!
//! 3. **Explicit identity**: the calling principal is a parameter of every
//!    core operation instead of ambient request state.
//!
//! ## Crate Structure
//!
//! - **error**: Error types for all davgate components
//! - **status**: Protocol-level result codes and the error-to-status table
//! - **path**: Normalized, root-relative resource paths
//! - **principal**: Caller identity
//! - **sidecar**: Naming conventions for metadata records next to resources
//! - **types**: Depth and resource metadata
//! - **config**: Server configuration
//! - **logging**: Log levels

pub mod config;
pub mod error;
pub mod logging;
pub mod path;
pub mod principal;
pub mod sidecar;
pub mod status;
pub mod types;

// Re-export key types for convenience
pub use config::ServerConfig;
pub use error::{ConfigError, Error, FsError, LockError, PolicyError, Result};
pub use logging::LogLevel;
pub use path::ResourcePath;
pub use principal::Principal;
pub use sidecar::SidecarKind;
pub use status::{DavStatus, LockOperation};
pub use types::{Depth, ResourceInfo, ResourceKind};

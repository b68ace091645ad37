//! Naming conventions for sidecar records.
//!
//! Policy documents, dead properties and claims live next to the resources
//! they describe, in files whose names start with [`SIDECAR_PREFIX`].
//! Sidecars never have sidecars of their own.

use crate::path::ResourcePath;
use crate::principal::Principal;
use crate::types::ResourceKind;

/// Prefix shared by every sidecar file name.
pub const SIDECAR_PREFIX: &str = ".__";

/// File name of a principal's claims record inside their home directory.
pub const CLAIMS_FILE: &str = ".__claims.json";

/// The kind of record a sidecar holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarKind {
    /// A policy document
    Policy,
    /// A dead-properties set
    DeadProperties,
}

impl SidecarKind {
    /// Sidecar file name used for a directory, placed inside it.
    pub fn directory_name(&self) -> &'static str {
        match self {
            Self::Policy => ".__thisdir.policy",
            Self::DeadProperties => ".__deadproperties.json",
        }
    }

    /// Suffix appended to a file name for a file-specific sidecar.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::DeadProperties => "deadproperties.json",
        }
    }
}

/// Compute the sidecar path for a resource.
///
/// Directories keep their sidecar inside themselves; files keep it next to
/// them as `.__<name>.<suffix>`. Returns `None` for sidecars and for a file
/// at the root without a name.
pub fn sidecar_for(
    path: &ResourcePath,
    kind: ResourceKind,
    sidecar: SidecarKind,
) -> Option<ResourcePath> {
    if path.is_sidecar() {
        return None;
    }
    match kind {
        ResourceKind::Directory => path.join(sidecar.directory_name()).ok(),
        ResourceKind::File => {
            let name = path.file_name()?;
            let parent = path.parent()?;
            parent
                .join(&format!("{}{}.{}", SIDECAR_PREFIX, name, sidecar.file_suffix()))
                .ok()
        }
    }
}

/// The claims record location for a principal: `/<principal>/.__claims.json`.
///
/// Returns `None` when the principal's name cannot be used as a home
/// directory.
pub fn claims_path(principal: &Principal) -> Option<ResourcePath> {
    let home = principal.home_segment()?;
    ResourcePath::parse(&format!("/{}/{}", home, CLAIMS_FILE)).ok()
}

//! Claims record lookup.

use davgate_core::sidecar::claims_path;
use davgate_core::Principal;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

use crate::model::Claims;

/// Resolve the claims of a principal.
///
/// The record lives at `<root>/<principal>/.__claims.json`. The home
/// directory is created when it is missing, so a new principal provisions
/// its own space. Every failure yields empty claims.
///
/// # Arguments
///
/// * `root` - The native storage root.
/// * `principal` - The caller.
///
/// # Returns
///
/// The decoded claims, or empty claims.
pub fn resolve_claims(root: &Path, principal: &Principal) -> Claims {
    let Some(record) = claims_path(principal) else {
        debug!(principal = %principal, "principal has no usable home directory");
        return Claims::empty();
    };

    let native = record.to_native(root);
    if let Some(home) = native.parent() {
        if !home.exists() {
            match fs::create_dir(home) {
                Ok(()) => debug!(home = %home.display(), "provisioned home directory"),
                // Another request for the same principal got there first.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    warn!(home = %home.display(), error = %e, "could not create home directory");
                    return Claims::empty();
                }
            }
        }
    }

    let data = match fs::read(&native) {
        Ok(data) => data,
        Err(e) => {
            if e.kind() == io::ErrorKind::NotFound {
                debug!(principal = %principal, "no claims record");
            } else {
                warn!(record = %native.display(), error = %e, "could not read claims");
            }
            return Claims::empty();
        }
    };

    match serde_json::from_slice(&data) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(record = %native.display(), error = %e, "could not decode claims");
            Claims::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_provisions_home_directory() {
        let root = TempDir::new().unwrap();
        let claims = resolve_claims(root.path(), &Principal::new("rob"));
        assert!(claims.is_empty());
        assert!(root.path().join("rob").is_dir());

        // Second lookup is idempotent
        let claims = resolve_claims(root.path(), &Principal::new("rob"));
        assert!(claims.is_empty());
    }

    #[test]
    fn test_reads_claims() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("rob")).unwrap();
        fs::write(
            root.path().join("rob/.__claims.json"),
            r#"{"groups": {"username": ["rob"]}}"#,
        )
        .unwrap();

        let claims = resolve_claims(root.path(), &Principal::new("rob"));
        assert!(claims.contains("groups.username", "rob"));
    }

    #[test]
    fn test_undecodable_claims_are_empty() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("rob")).unwrap();
        fs::write(root.path().join("rob/.__claims.json"), "not json").unwrap();

        let claims = resolve_claims(root.path(), &Principal::new("rob"));
        assert!(claims.is_empty());
    }

    #[test]
    fn test_unusable_principal() {
        let root = TempDir::new().unwrap();
        let claims = resolve_claims(root.path(), &Principal::new("../escape"));
        assert!(claims.is_empty());
        assert!(!root.path().join("escape").exists());
    }
}

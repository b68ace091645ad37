//! Policy document resolution.

use davgate_core::sidecar::sidecar_for;
use davgate_core::{ResourceKind, ResourcePath, SidecarKind};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// The policy document governing a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDocument {
    /// A document read from a policy sidecar.
    Sidecar {
        /// Where the document was found.
        path: ResourcePath,
        /// The document text.
        source: String,
    },
    /// No document applies; everything is denied.
    DenyAll,
}

impl PolicyDocument {
    /// Check whether this is the deny-all fallback.
    pub fn is_deny_all(&self) -> bool {
        matches!(self, Self::DenyAll)
    }

    /// Where the document was found, if anywhere.
    pub fn path(&self) -> Option<&ResourcePath> {
        match self {
            Self::Sidecar { path, .. } => Some(path),
            Self::DenyAll => None,
        }
    }
}

/// Find the nearest policy document for a path.
///
/// A file's own sidecar wins over its directory's; a directory's sidecar
/// covers everything beneath it until a deeper one overrides it. Paths that
/// do not exist (yet) and sidecar paths are governed by their parent. The
/// walk only ever moves upward and ends at the root, falling back to
/// [`PolicyDocument::DenyAll`].
pub fn resolve_policy(root: &Path, path: &ResourcePath) -> PolicyDocument {
    let mut current = path.clone();

    loop {
        if !current.is_sidecar() {
            match fs::metadata(current.to_native(root)) {
                Ok(metadata) => {
                    let kind = ResourceKind::of(&metadata);
                    if let Some(sidecar) = sidecar_for(&current, kind, SidecarKind::Policy) {
                        match fs::read_to_string(sidecar.to_native(root)) {
                            Ok(source) => {
                                debug!(resource = %path, policy = %sidecar, "resolved policy");
                                return PolicyDocument::Sidecar {
                                    path: sidecar,
                                    source,
                                };
                            }
                            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                            Err(e) => {
                                warn!(policy = %sidecar, error = %e, "could not read policy");
                                return PolicyDocument::DenyAll;
                            }
                        }
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                    ) => {}
                Err(e) => {
                    warn!(path = %current, error = %e, "could not stat policy subject");
                    return PolicyDocument::DenyAll;
                }
            }
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => {
                debug!(resource = %path, "no policy applies");
                return PolicyDocument::DenyAll;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn p(s: &str) -> ResourcePath {
        ResourcePath::parse(s).unwrap()
    }

    #[test]
    fn test_no_documents() {
        let root = TempDir::new().unwrap();
        assert!(resolve_policy(root.path(), &p("/a/b/c")).is_deny_all());
        assert!(resolve_policy(root.path(), &ResourcePath::root()).is_deny_all());
    }

    #[test]
    fn test_file_overrides_directory() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("rob")).unwrap();
        fs::write(root.path().join("rob/cat.jpg"), b"meow").unwrap();
        fs::write(root.path().join("rob/dog.jpg"), b"woof").unwrap();
        fs::write(root.path().join("rob/.__thisdir.policy"), "dir").unwrap();
        fs::write(root.path().join("rob/.__cat.jpg.policy"), "file").unwrap();

        let doc = resolve_policy(root.path(), &p("/rob/cat.jpg"));
        assert_eq!(doc.path(), Some(&p("/rob/.__cat.jpg.policy")));

        let doc = resolve_policy(root.path(), &p("/rob/dog.jpg"));
        assert_eq!(doc.path(), Some(&p("/rob/.__thisdir.policy")));
    }

    #[test]
    fn test_missing_paths_inherit() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join(".__thisdir.policy"), "root").unwrap();

        let doc = resolve_policy(root.path(), &p("/not/yet/created"));
        assert_eq!(
            doc,
            PolicyDocument::Sidecar {
                path: p("/.__thisdir.policy"),
                source: "root".to_string(),
            }
        );
    }

    #[test]
    fn test_names_beneath_a_file_inherit() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("rob")).unwrap();
        fs::write(root.path().join("rob/cat.jpg"), b"meow").unwrap();
        fs::write(root.path().join("rob/.__thisdir.policy"), "dir").unwrap();

        let doc = resolve_policy(root.path(), &p("/rob/cat.jpg/whiskers"));
        assert_eq!(doc.path(), Some(&p("/rob/.__thisdir.policy")));
    }

    #[test]
    fn test_sidecars_delegate_to_directory() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("rob")).unwrap();
        fs::write(root.path().join("rob/.__thisdir.policy"), "dir").unwrap();

        let doc = resolve_policy(root.path(), &p("/rob/.__thisdir.policy"));
        assert_eq!(doc.path(), Some(&p("/rob/.__thisdir.policy")));
    }
}

//! Dead properties.
//!
//! Client-defined properties the native store cannot hold are persisted as
//! a JSON object in a sidecar next to the resource (inside it, for
//! directories). Reading never fails: a missing or undecodable sidecar is
//! an empty set.

use davgate_core::sidecar::{sidecar_for, SIDECAR_PREFIX};
use davgate_core::{DavStatus, FsError, ResourceKind, ResourcePath, SidecarKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A qualified property name, written in Clark notation as `{namespace}local`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PropertyName {
    /// Namespace URI; empty when the property has none.
    pub namespace: String,

    /// Local name.
    pub local: String,
}

impl PropertyName {
    /// Create a property name.
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

impl FromStr for PropertyName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, local) = match s.strip_prefix('{') {
            Some(rest) => rest
                .split_once('}')
                .ok_or_else(|| format!("unterminated namespace in {:?}", s))?,
            None => ("", s),
        };
        if local.is_empty() {
            return Err(format!("empty property name in {:?}", s));
        }
        Ok(Self::new(namespace, local))
    }
}

impl TryFrom<String> for PropertyName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PropertyName> for String {
    fn from(name: PropertyName) -> Self {
        name.to_string()
    }
}

/// A named property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name.
    pub name: PropertyName,

    /// Opaque value; empty in removal requests and their results.
    pub value: String,
}

impl Property {
    /// Create a property.
    pub fn new(name: PropertyName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// The dead properties of one resource.
pub type PropertySet = BTreeMap<PropertyName, String>;

/// One step of a property patch: set or remove a batch of properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropPatch {
    /// Remove the named properties instead of setting them.
    pub remove: bool,

    /// The properties touched by this step.
    pub props: Vec<Property>,
}

impl PropPatch {
    /// A step setting properties.
    pub fn set(props: Vec<Property>) -> Self {
        Self {
            remove: false,
            props,
        }
    }

    /// A step removing properties.
    pub fn remove(names: Vec<PropertyName>) -> Self {
        Self {
            remove: true,
            props: names.into_iter().map(|n| Property::new(n, "")).collect(),
        }
    }
}

/// The outcome shared by a group of properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropStat {
    /// Outcome.
    pub status: DavStatus,

    /// Properties with this outcome, values omitted.
    pub props: Vec<Property>,
}

/// Reads and writes dead-property sidecars beneath a native root.
#[derive(Debug, Clone)]
pub struct DeadPropertyStore {
    root: PathBuf,
}

impl DeadPropertyStore {
    /// Create a store over a native root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Native location of a resource's sidecar; `None` for sidecars.
    fn sidecar(&self, path: &ResourcePath, kind: ResourceKind) -> Option<PathBuf> {
        sidecar_for(path, kind, SidecarKind::DeadProperties).map(|s| s.to_native(&self.root))
    }

    /// Read the dead properties of a resource.
    pub fn read(&self, path: &ResourcePath, kind: ResourceKind) -> PropertySet {
        let Some(sidecar) = self.sidecar(path, kind) else {
            return PropertySet::new();
        };

        let data = match fs::read(&sidecar) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return PropertySet::new(),
            Err(e) => {
                warn!(sidecar = %sidecar.display(), error = %e, "could not read dead properties");
                return PropertySet::new();
            }
        };

        match serde_json::from_slice(&data) {
            Ok(props) => props,
            Err(e) => {
                warn!(sidecar = %sidecar.display(), error = %e, "could not decode dead properties");
                PropertySet::new()
            }
        }
    }

    /// Apply a patch to the dead properties of a resource.
    ///
    /// Steps are applied in order, so a later step wins over an earlier one
    /// for the same name. The full set is then written back in one piece.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<PropStat>)` - A single entry listing every touched
    ///   property: `200 OK` on success, `403 Forbidden` for sidecars.
    /// * `Err(FsError)` - If the set could not be written.
    pub fn patch(
        &self,
        path: &ResourcePath,
        kind: ResourceKind,
        patches: &[PropPatch],
    ) -> Result<Vec<PropStat>, FsError> {
        let touched: Vec<Property> = patches
            .iter()
            .flat_map(|patch| patch.props.iter())
            .map(|prop| Property::new(prop.name.clone(), ""))
            .collect();

        let Some(sidecar) = self.sidecar(path, kind) else {
            return Ok(vec![PropStat {
                status: DavStatus::Forbidden,
                props: touched,
            }]);
        };

        let mut props = self.read(path, kind);
        for patch in patches {
            for prop in &patch.props {
                if patch.remove {
                    props.remove(&prop.name);
                } else {
                    props.insert(prop.name.clone(), prop.value.clone());
                }
            }
        }

        write_atomic(&sidecar, &props)?;
        debug!(resource = %path, count = touched.len(), "patched dead properties");

        Ok(vec![PropStat {
            status: DavStatus::Ok,
            props: touched,
        }])
    }

    /// Delete the sidecar of a file. A missing sidecar is not an error.
    pub fn remove(&self, path: &ResourcePath) -> Result<(), FsError> {
        let Some(sidecar) = self.sidecar(path, ResourceKind::File) else {
            return Ok(());
        };
        match fs::remove_file(&sidecar) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FsError::Storage(e)),
        }
    }

    /// Move the sidecar of a file along with the file.
    pub fn rename(&self, from: &ResourcePath, to: &ResourcePath) -> Result<(), FsError> {
        let (Some(old), Some(new)) = (
            self.sidecar(from, ResourceKind::File),
            self.sidecar(to, ResourceKind::File),
        ) else {
            return Ok(());
        };
        match fs::rename(&old, &new) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FsError::Storage(e)),
        }
    }
}

/// A temporary file in `dir`, named as a sidecar so listings and copies
/// skip it.
fn temp_sidecar(dir: &Path) -> io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(&format!("{}tmp", SIDECAR_PREFIX))
        .tempfile_in(dir)
}

/// Write a property set through a temporary file in the same directory.
fn write_atomic(target: &Path, props: &PropertySet) -> Result<(), FsError> {
    let dir = target.parent().ok_or(FsError::NotFound)?;
    let data = serde_json::to_vec_pretty(props)
        .map_err(|e| FsError::Storage(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    let mut tmp = temp_sidecar(dir).map_err(FsError::from_create_io)?;
    tmp.write_all(&data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| FsError::Storage(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn p(s: &str) -> ResourcePath {
        ResourcePath::parse(s).unwrap()
    }

    fn name(local: &str) -> PropertyName {
        PropertyName::new("DAV:", local)
    }

    #[test]
    fn test_property_name_notation() {
        let parsed: PropertyName = "{DAV:}author".parse().unwrap();
        assert_eq!(parsed, name("author"));
        assert_eq!(parsed.to_string(), "{DAV:}author");

        let bare: PropertyName = "color".parse().unwrap();
        assert_eq!(bare.namespace, "");
        assert_eq!(bare.to_string(), "color");

        assert!("{DAV:author".parse::<PropertyName>().is_err());
        assert!("{DAV:}".parse::<PropertyName>().is_err());
    }

    #[test]
    fn test_missing_sidecar_is_empty() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("a.txt"), b"x").unwrap();
        let store = DeadPropertyStore::new(root.path());
        assert!(store.read(&p("/a.txt"), ResourceKind::File).is_empty());
    }

    #[test]
    fn test_patch_and_read() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("a.txt"), b"x").unwrap();
        let store = DeadPropertyStore::new(root.path());
        let path = p("/a.txt");

        let stats = store
            .patch(
                &path,
                ResourceKind::File,
                &[PropPatch::set(vec![
                    Property::new(name("author"), "rob"),
                    Property::new(name("color"), "red"),
                ])],
            )
            .unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].status, DavStatus::Ok);
        assert_eq!(stats[0].props.len(), 2);
        assert!(root.path().join(".__a.txt.deadproperties.json").exists());

        store
            .patch(
                &path,
                ResourceKind::File,
                &[
                    PropPatch::set(vec![Property::new(name("author"), "alice")]),
                    PropPatch::remove(vec![name("color")]),
                ],
            )
            .unwrap();

        let props = store.read(&path, ResourceKind::File);
        assert_eq!(props.get(&name("author")).map(String::as_str), Some("alice"));
        assert!(!props.contains_key(&name("color")));
    }

    #[test]
    fn test_directory_sidecar_location() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("docs")).unwrap();
        let store = DeadPropertyStore::new(root.path());

        store
            .patch(
                &p("/docs"),
                ResourceKind::Directory,
                &[PropPatch::set(vec![Property::new(name("k"), "v")])],
            )
            .unwrap();
        assert!(root.path().join("docs/.__deadproperties.json").exists());
    }

    #[test]
    fn test_sidecars_have_no_properties() {
        let root = TempDir::new().unwrap();
        let store = DeadPropertyStore::new(root.path());
        let sidecar = p("/.__thisdir.policy");

        let stats = store
            .patch(
                &sidecar,
                ResourceKind::File,
                &[PropPatch::set(vec![Property::new(name("k"), "v")])],
            )
            .unwrap();
        assert_eq!(stats[0].status, DavStatus::Forbidden);
        assert!(store.read(&sidecar, ResourceKind::File).is_empty());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_temporary_files_are_sidecars() {
        let root = TempDir::new().unwrap();
        let tmp = temp_sidecar(root.path()).unwrap();
        let file_name = tmp.path().file_name().unwrap().to_str().unwrap();
        assert!(p(&format!("/{}", file_name)).is_sidecar());
        drop(tmp);

        fs::write(root.path().join("a.txt"), b"x").unwrap();
        let store = DeadPropertyStore::new(root.path());
        store
            .patch(
                &p("/a.txt"),
                ResourceKind::File,
                &[PropPatch::set(vec![Property::new(name("k"), "v")])],
            )
            .unwrap();
        let mut names: Vec<String> = fs::read_dir(root.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![".__a.txt.deadproperties.json", "a.txt"]);
    }

    #[test]
    fn test_undecodable_sidecar_is_empty() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("a.txt"), b"x").unwrap();
        fs::write(root.path().join(".__a.txt.deadproperties.json"), b"[1, 2").unwrap();
        let store = DeadPropertyStore::new(root.path());
        assert!(store.read(&p("/a.txt"), ResourceKind::File).is_empty());
    }
}

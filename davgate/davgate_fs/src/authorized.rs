//! The authorization-gated filesystem.
//!
//! Every operation goes through the same gate before touching storage:
//!
//! 1. Normalize the name; malformed names are not found.
//! 2. Decide, with a fresh policy evaluation.
//! 3. Without `Stat`, the resource does not exist for this caller.
//! 4. With `Stat` but without the verb's permission, the caller is told
//!    the operation is not allowed.
//!
//! Creates are decided against the parent directory's policy, since the
//! child has none yet.

use davgate_core::{FsError, Principal, ResourceInfo, ResourceKind, ResourcePath};
use davgate_policy::{Decision, Permission, PolicyEngine, PolicyEvaluator};
use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::filesystem::{DavFile, FileSystem, OpenFlags};
use crate::props::{DeadPropertyStore, PropPatch, PropStat, PropertySet};

/// A native directory tree guarded by policy.
pub struct AuthorizedFs<E> {
    root: PathBuf,
    engine: PolicyEngine<E>,
    props: DeadPropertyStore,
}

impl<E> AuthorizedFs<E>
where
    E: PolicyEvaluator,
{
    /// Create a filesystem over a native root.
    ///
    /// # Arguments
    ///
    /// * `root` - The native directory exposed as `/`.
    /// * `evaluator` - The policy evaluator.
    pub fn new(root: impl Into<PathBuf>, evaluator: E) -> Self {
        let root = root.into();
        Self {
            engine: PolicyEngine::new(root.clone(), evaluator),
            props: DeadPropertyStore::new(root.clone()),
            root,
        }
    }

    /// The native root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The policy engine.
    pub fn engine(&self) -> &PolicyEngine<E> {
        &self.engine
    }

    /// Decide a permission for a principal on a raw name.
    ///
    /// This is the decision the gate would use; it does not touch storage
    /// beyond reading claims and policies.
    pub fn decide(
        &self,
        principal: &Principal,
        permission: Permission,
        name: &str,
    ) -> Result<Decision, FsError> {
        let path = ResourcePath::parse(name)?;
        let governing = match permission {
            Permission::Create => path.parent().unwrap_or_else(ResourcePath::root),
            _ => path.clone(),
        };
        Ok(self.engine.decide(principal, permission, &path, &governing))
    }

    fn native(&self, path: &ResourcePath) -> PathBuf {
        path.to_native(&self.root)
    }

    /// Native metadata, or `None` if nothing is there.
    ///
    /// A name beneath a file is not there either.
    fn metadata(&self, path: &ResourcePath) -> Result<Option<Metadata>, FsError> {
        match fs::metadata(self.native(path)) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotADirectory => Ok(None),
            Err(e) => Err(FsError::Storage(e)),
        }
    }

    /// Apply the gate to a resource that must exist.
    fn authorize_existing(
        &self,
        principal: &Principal,
        permission: Permission,
        path: &ResourcePath,
    ) -> Result<Metadata, FsError> {
        let decision = self.engine.decide(principal, permission, path, path);
        if !decision.allows(Permission::Stat) {
            return Err(FsError::NotFound);
        }
        let metadata = self.metadata(path)?.ok_or(FsError::NotFound)?;
        if permission != Permission::Stat && !decision.allows(permission) {
            return Err(FsError::NotAllowed);
        }
        Ok(metadata)
    }

    /// Apply the gate to the creation of `path` in its parent.
    fn authorize_create(
        &self,
        principal: &Principal,
        path: &ResourcePath,
    ) -> Result<(), FsError> {
        let parent = path.parent().ok_or(FsError::AlreadyExists)?;
        let decision = self
            .engine
            .decide(principal, Permission::Create, path, &parent);
        if !decision.allows(Permission::Stat) {
            return Err(FsError::NotFound);
        }
        if !decision.allows(Permission::Create) {
            return Err(FsError::NotAllowed);
        }
        Ok(())
    }

    /// Whether `path` is the caller's own home directory.
    fn is_home(principal: &Principal, path: &ResourcePath) -> bool {
        match (path.parent(), path.file_name(), principal.home_segment()) {
            (Some(parent), Some(name), Some(home)) => parent.is_root() && name == home,
            _ => false,
        }
    }

    fn handle(
        &self,
        path: ResourcePath,
        kind: ResourceKind,
        file: Option<File>,
        writable: bool,
    ) -> AuthorizedFile {
        AuthorizedFile {
            native: self.native(&path),
            path,
            kind,
            file,
            writable,
            props: self.props.clone(),
        }
    }
}

impl<E> FileSystem for AuthorizedFs<E>
where
    E: PolicyEvaluator,
{
    type File = AuthorizedFile;

    fn create_dir(&self, principal: &Principal, name: &str) -> Result<(), FsError> {
        let path = ResourcePath::parse(name)?;

        if Self::is_home(principal, &path) {
            debug!(principal = %principal, resource = %path, "self-service provisioning");
        } else {
            self.authorize_create(principal, &path)?;
        }

        fs::create_dir(self.native(&path)).map_err(FsError::from_create_io)?;
        debug!(principal = %principal, resource = %path, "created directory");
        Ok(())
    }

    fn open(
        &self,
        principal: &Principal,
        name: &str,
        flags: OpenFlags,
    ) -> Result<AuthorizedFile, FsError> {
        let path = ResourcePath::parse(name)?;
        let writable = flags.contains(OpenFlags::WRITE);

        // Storage errors here must not leak past the gate.
        if matches!(self.metadata(&path), Ok(Some(_))) {
            let verb = if writable || flags.contains(OpenFlags::TRUNCATE) {
                Permission::Write
            } else {
                Permission::Read
            };
            let metadata = self.authorize_existing(principal, verb, &path)?;

            if flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) {
                return Err(FsError::AlreadyExists);
            }

            let kind = ResourceKind::of(&metadata);
            if kind == ResourceKind::Directory {
                if flags.contains(OpenFlags::TRUNCATE) {
                    return Err(FsError::IsADirectory);
                }
                return Ok(self.handle(path, kind, None, writable));
            }

            let file = OpenOptions::new()
                .read(true)
                .write(writable)
                .truncate(writable && flags.contains(OpenFlags::TRUNCATE))
                .open(self.native(&path))
                .map_err(FsError::from_io)?;
            debug!(principal = %principal, resource = %path, ?flags, "opened");
            return Ok(self.handle(path, kind, Some(file), writable));
        }

        if !flags.contains(OpenFlags::CREATE) {
            return Err(FsError::NotFound);
        }
        self.authorize_create(principal, &path)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(self.native(&path))
            .map_err(FsError::from_create_io)?;
        debug!(principal = %principal, resource = %path, "created file");
        Ok(self.handle(path, ResourceKind::File, Some(file), writable))
    }

    fn remove_all(&self, principal: &Principal, name: &str) -> Result<(), FsError> {
        let path = ResourcePath::parse(name)?;
        if path.is_root() {
            return Err(FsError::InvalidOperation(
                "cannot remove the storage root".to_string(),
            ));
        }

        let metadata = self.authorize_existing(principal, Permission::Delete, &path)?;
        let native = self.native(&path);
        if metadata.is_dir() {
            fs::remove_dir_all(&native).map_err(FsError::from_io)?;
        } else {
            fs::remove_file(&native).map_err(FsError::from_io)?;
            self.props.remove(&path)?;
        }

        debug!(principal = %principal, resource = %path, "removed");
        Ok(())
    }

    fn rename(&self, principal: &Principal, from: &str, to: &str) -> Result<(), FsError> {
        let src = ResourcePath::parse(from)?;
        let dst = ResourcePath::parse(to)?;
        if src.is_root() || dst.is_root() {
            return Err(FsError::InvalidOperation(
                "cannot rename the storage root".to_string(),
            ));
        }

        let metadata = self.authorize_existing(principal, Permission::Read, &src)?;
        if dst.is_within(&src) {
            return Err(FsError::InvalidOperation(format!(
                "cannot move {} into itself",
                src
            )));
        }

        self.authorize_create(principal, &dst)?;
        if self.metadata(&dst)?.is_some() {
            return Err(FsError::NotAllowed);
        }

        fs::rename(self.native(&src), self.native(&dst)).map_err(FsError::from_create_io)?;
        if !metadata.is_dir() {
            self.props.rename(&src, &dst)?;
        }

        debug!(principal = %principal, from = %src, to = %dst, "renamed");
        Ok(())
    }

    fn stat(&self, principal: &Principal, name: &str) -> Result<ResourceInfo, FsError> {
        let path = ResourcePath::parse(name)?;
        let metadata = self.authorize_existing(principal, Permission::Stat, &path)?;
        Ok(ResourceInfo::from_metadata(path, &metadata))
    }

    fn read_dir(&self, principal: &Principal, name: &str) -> Result<Vec<ResourceInfo>, FsError> {
        let path = ResourcePath::parse(name)?;
        let metadata = self.authorize_existing(principal, Permission::Read, &path)?;
        if !metadata.is_dir() {
            return Err(FsError::NotADirectory);
        }

        let mut children = Vec::new();
        for entry in fs::read_dir(self.native(&path)).map_err(FsError::from_io)? {
            let entry = entry?;
            let Some(child_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(child) = path.join(&child_name) else {
                continue;
            };

            let decision = self
                .engine
                .decide(principal, Permission::Stat, &child, &child);
            if !decision.allows(Permission::Stat) {
                continue;
            }
            // Entries can vanish between listing and stat.
            if let Ok(child_metadata) = entry.metadata() {
                children.push(ResourceInfo::from_metadata(child, &child_metadata));
            }
        }

        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }
}

/// A handle returned by [`AuthorizedFs::open`].
#[derive(Debug)]
pub struct AuthorizedFile {
    path: ResourcePath,
    native: PathBuf,
    kind: ResourceKind,
    file: Option<File>,
    writable: bool,
    props: DeadPropertyStore,
}

impl AuthorizedFile {
    /// The path this handle was opened with.
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other(FsError::IsADirectory))
    }
}

impl Read for AuthorizedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Write for AuthorizedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::other(FsError::ReadOnlyHandle));
        }
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Seek for AuthorizedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl DavFile for AuthorizedFile {
    fn info(&self) -> Result<ResourceInfo, FsError> {
        let metadata = match &self.file {
            Some(file) => file.metadata()?,
            None => fs::metadata(&self.native).map_err(FsError::from_io)?,
        };
        Ok(ResourceInfo::from_metadata(self.path.clone(), &metadata))
    }

    fn dead_props(&self) -> Result<PropertySet, FsError> {
        Ok(self.props.read(&self.path, self.kind))
    }

    fn patch(&mut self, patches: &[PropPatch]) -> Result<Vec<PropStat>, FsError> {
        if !self.writable {
            return Err(FsError::ReadOnlyHandle);
        }
        self.props.patch(&self.path, self.kind, patches)
    }
}

//! Depth-bounded tree traversal.

use davgate_core::{Depth, FsError, Principal, ResourceInfo, ResourcePath};

use crate::filesystem::FileSystem;

/// A node visited by a walk.
#[derive(Debug)]
pub struct WalkEntry {
    /// The node's path.
    pub path: ResourcePath,

    /// Its metadata, or why it could not be read.
    pub info: Result<ResourceInfo, FsError>,
}

/// What a visitor wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    /// Keep going, descending into the node if it is a directory.
    Continue,
    /// Do not descend into the node just visited.
    SkipSubtree,
}

/// A lazy, pre-order traversal through a [`FileSystem`].
///
/// Nodes are stat'ed as they are reached and directories are listed only
/// when the walk descends into them. A node that cannot be stat'ed or a
/// directory that cannot be listed is yielded with an error and the walk
/// moves on to its siblings.
pub struct Walk<'a, F> {
    fs: &'a F,
    principal: &'a Principal,
    pending: Vec<(ResourcePath, Depth)>,
    expand: Option<(ResourcePath, Depth)>,
}

impl<'a, F> Walk<'a, F>
where
    F: FileSystem,
{
    /// Start a walk at `start`.
    ///
    /// With `Depth::Zero` only the start node is visited; with `Depth::One`
    /// its children too.
    pub fn new(fs: &'a F, principal: &'a Principal, start: ResourcePath, depth: Depth) -> Self {
        Self {
            fs,
            principal,
            pending: vec![(start, depth)],
            expand: None,
        }
    }

    /// Do not descend into the directory yielded last.
    pub fn skip_subtree(&mut self) {
        self.expand = None;
    }
}

impl<F> Iterator for Walk<'_, F>
where
    F: FileSystem,
{
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        if let Some((dir, depth)) = self.expand.take() {
            match self.fs.read_dir(self.principal, dir.as_str()) {
                Ok(children) => {
                    self.pending
                        .extend(children.into_iter().rev().map(|child| (child.path, depth)));
                }
                Err(e) => {
                    return Some(WalkEntry {
                        path: dir,
                        info: Err(e),
                    })
                }
            }
        }

        let (path, depth) = self.pending.pop()?;
        let info = self.fs.stat(self.principal, path.as_str());
        if let Ok(info) = &info {
            if info.is_dir() && depth != Depth::Zero {
                self.expand = Some((path.clone(), depth.descend()));
            }
        }
        Some(WalkEntry { path, info })
    }
}

/// Walk a tree, calling `visit` for every node.
///
/// The visitor may skip the subtree of the node it was given, or abort the
/// whole walk by returning an error.
pub fn walk_fs<F, V>(
    fs: &F,
    principal: &Principal,
    start: ResourcePath,
    depth: Depth,
    mut visit: V,
) -> Result<(), FsError>
where
    F: FileSystem,
    V: FnMut(&WalkEntry) -> Result<WalkControl, FsError>,
{
    let mut walk = Walk::new(fs, principal, start, depth);
    while let Some(entry) = walk.next() {
        if visit(&entry)? == WalkControl::SkipSubtree {
            walk.skip_subtree();
        }
    }
    Ok(())
}

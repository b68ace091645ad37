//! Integration tests for copy and move.

mod common;

use common::{Fixture, OWNER_POLICY};
use davgate_core::{DavStatus, Depth, FsError, Principal, ResourceInfo};
use davgate_fs::{
    copy_files, move_files, AuthorizedFile, AuthorizedFs, DavFile, FileSystem, OpenFlags,
    PropPatch, PropStat, Property, PropertyName, PropertySet, RecursionGuard,
};
use davgate_policy::RuleEvaluator;
use std::io::{self, Read, Seek, SeekFrom, Write};

fn name(local: &str) -> PropertyName {
    PropertyName::new("DAV:", local)
}

#[test]
fn test_copy_twice_with_overwrite() {
    let fx = Fixture::open();
    let rob = fx.user("rob");
    fx.write("src.txt", "content");

    let status = copy_files(
        &fx.fs,
        &rob,
        "/src.txt",
        "/dst.txt",
        true,
        Depth::Infinity,
        RecursionGuard::default(),
    )
    .unwrap();
    assert_eq!(status, DavStatus::Created);
    assert_eq!(fx.read("dst.txt"), "content");

    let status = copy_files(
        &fx.fs,
        &rob,
        "/src.txt",
        "/dst.txt",
        true,
        Depth::Infinity,
        RecursionGuard::default(),
    )
    .unwrap();
    assert_eq!(status, DavStatus::NoContent);
    assert_eq!(fx.read("dst.txt"), "content");
}

#[test]
fn test_copy_without_overwrite() {
    let fx = Fixture::open();
    let rob = fx.user("rob");
    fx.write("src.txt", "new");
    fx.write("dst.txt", "old");

    let err = copy_files(
        &fx.fs,
        &rob,
        "/src.txt",
        "/dst.txt",
        false,
        Depth::Infinity,
        RecursionGuard::default(),
    )
    .unwrap_err();
    assert_eq!(err.status, DavStatus::PreconditionFailed);
    assert_eq!(fx.read("dst.txt"), "old");
}

#[test]
fn test_copy_tree_with_properties() {
    let fx = Fixture::open();
    let rob = fx.user("rob");
    fx.write("tree/a.txt", "a");
    fx.write("tree/sub/b.txt", "b");
    fx.write("tree/.__thisdir.policy", common::OPEN_POLICY);

    let mut file = fx.fs.open(&rob, "/tree/a.txt", OpenFlags::WRITE).unwrap();
    file.patch(&[PropPatch::set(vec![Property::new(name("author"), "rob")])])
        .unwrap();
    drop(file);
    let mut dir = fx
        .fs
        .open(&rob, "/tree", OpenFlags::READ | OpenFlags::WRITE)
        .unwrap();
    dir.patch(&[PropPatch::set(vec![Property::new(name("color"), "blue")])])
        .unwrap();
    drop(dir);

    let status = copy_files(
        &fx.fs,
        &rob,
        "/tree",
        "/copy",
        false,
        Depth::Infinity,
        RecursionGuard::default(),
    )
    .unwrap();
    assert_eq!(status, DavStatus::Created);
    assert_eq!(fx.read("copy/a.txt"), "a");
    assert_eq!(fx.read("copy/sub/b.txt"), "b");
    assert!(!fx.exists("copy/.__thisdir.policy"));

    let file = fx.fs.open(&rob, "/copy/a.txt", OpenFlags::READ).unwrap();
    let props = file.dead_props().unwrap();
    assert_eq!(props.get(&name("author")).map(String::as_str), Some("rob"));

    let dir = fx.fs.open(&rob, "/copy", OpenFlags::READ).unwrap();
    let props = dir.dead_props().unwrap();
    assert_eq!(props.get(&name("color")).map(String::as_str), Some("blue"));
}

#[test]
fn test_copy_depth_zero() {
    let fx = Fixture::open();
    let rob = fx.user("rob");
    fx.write("tree/a.txt", "a");

    let status = copy_files(
        &fx.fs,
        &rob,
        "/tree",
        "/copy",
        false,
        Depth::Zero,
        RecursionGuard::default(),
    )
    .unwrap();
    assert_eq!(status, DavStatus::Created);
    assert!(fx.exists("copy"));
    assert!(!fx.exists("copy/a.txt"));
}

#[test]
fn test_copy_into_own_descendant_hits_ceiling() {
    let fx = Fixture::open();
    let rob = fx.user("rob");
    fx.write("a/file.txt", "x");

    let err = copy_files(
        &fx.fs,
        &rob,
        "/a",
        "/a/b",
        false,
        Depth::Infinity,
        RecursionGuard::new(8),
    )
    .unwrap_err();
    assert_eq!(err.status, DavStatus::InternalServerError);
    assert!(matches!(err.source, FsError::RecursionTooDeep));
}

#[test]
fn test_copy_source_errors() {
    let fx = Fixture::open();
    fx.user("rob");
    let alice = fx.user("alice");
    fx.write("rob/secret.txt", "s");
    fx.write("rob/.__thisdir.policy", OWNER_POLICY);
    fx.write("readonly/doc.txt", "d");
    fx.write("readonly/.__thisdir.policy", r#"{"Stat": true}"#);

    let copy = |src: &str| {
        copy_files(
            &fx.fs,
            &alice,
            src,
            "/alice/out.txt",
            false,
            Depth::Infinity,
            RecursionGuard::default(),
        )
        .unwrap_err()
        .status
    };

    assert_eq!(copy("/missing.txt"), DavStatus::NotFound);
    assert_eq!(copy("/rob/secret.txt"), DavStatus::NotFound);
    assert_eq!(copy("/readonly/doc.txt"), DavStatus::Forbidden);
    assert_eq!(copy("/alice/out.txt"), DavStatus::Forbidden);
}

#[test]
fn test_copy_to_missing_parent() {
    let fx = Fixture::open();
    let rob = fx.user("rob");
    fx.write("a.txt", "a");

    let err = copy_files(
        &fx.fs,
        &rob,
        "/a.txt",
        "/nowhere/a.txt",
        false,
        Depth::Infinity,
        RecursionGuard::default(),
    )
    .unwrap_err();
    assert_eq!(err.status, DavStatus::Conflict);
}

#[test]
fn test_move_precondition() {
    let fx = Fixture::open();
    let rob = fx.user("rob");
    fx.write("src.txt", "src");
    fx.write("dst.txt", "dst");

    let err = move_files(&fx.fs, &rob, "/src.txt", "/dst.txt", false).unwrap_err();
    assert_eq!(err.status, DavStatus::PreconditionFailed);
    assert_eq!(fx.read("src.txt"), "src");
    assert_eq!(fx.read("dst.txt"), "dst");
}

#[test]
fn test_move_overwrite_and_create() {
    let fx = Fixture::open();
    let rob = fx.user("rob");
    fx.write("src.txt", "src");
    fx.write("dst.txt", "dst");

    let status = move_files(&fx.fs, &rob, "/src.txt", "/dst.txt", true).unwrap();
    assert_eq!(status, DavStatus::NoContent);
    assert!(!fx.exists("src.txt"));
    assert_eq!(fx.read("dst.txt"), "src");

    let status = move_files(&fx.fs, &rob, "/dst.txt", "/moved.txt", false).unwrap();
    assert_eq!(status, DavStatus::Created);
    assert_eq!(fx.read("moved.txt"), "src");
}

#[test]
fn test_move_hidden_source() {
    let fx = Fixture::open();
    fx.user("rob");
    let alice = fx.user("alice");
    fx.write("rob/secret.txt", "s");
    fx.write("rob/.__thisdir.policy", OWNER_POLICY);

    let err = move_files(&fx.fs, &alice, "/rob/secret.txt", "/alice/s.txt", false).unwrap_err();
    assert_eq!(err.status, DavStatus::NotFound);
    assert!(fx.exists("rob/secret.txt"));
}

#[test]
fn test_failed_move_keeps_destination() {
    let fx = Fixture::open();
    fx.user("rob");
    let alice = fx.user("alice");
    fx.write("rob/secret.txt", "s");
    fx.write("rob/.__thisdir.policy", OWNER_POLICY);
    fx.write("alice/keep.txt", "keep");

    for src in ["/rob/secret.txt", "/rob/missing.txt", "/alice/missing.txt"] {
        let err = move_files(&fx.fs, &alice, src, "/alice/keep.txt", true).unwrap_err();
        assert_eq!(err.status, DavStatus::NotFound, "{}", src);
        assert_eq!(fx.read("alice/keep.txt"), "keep", "{}", src);
    }
    assert!(fx.exists("rob/secret.txt"));
}

#[test]
fn test_move_into_own_subtree() {
    let fx = Fixture::open();
    let rob = fx.user("rob");
    fx.write("rob/dir/sub/a.txt", "a");

    let err = move_files(&fx.fs, &rob, "/rob/dir", "/rob/dir/sub", true).unwrap_err();
    assert_eq!(err.status, DavStatus::Forbidden);
    assert!(matches!(err.source, FsError::InvalidOperation(_)));
    assert_eq!(fx.read("rob/dir/sub/a.txt"), "a");
}

/// Wraps the store so that reading one resource's bytes fails.
struct BrokenReads {
    inner: AuthorizedFs<RuleEvaluator>,
    broken: &'static str,
}

struct BrokenFile {
    inner: AuthorizedFile,
    broken: bool,
}

impl Read for BrokenFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::Other, "bad sector"));
        }
        self.inner.read(buf)
    }
}

impl Write for BrokenFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for BrokenFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl DavFile for BrokenFile {
    fn info(&self) -> Result<ResourceInfo, FsError> {
        self.inner.info()
    }

    fn dead_props(&self) -> Result<PropertySet, FsError> {
        self.inner.dead_props()
    }

    fn patch(&mut self, patches: &[PropPatch]) -> Result<Vec<PropStat>, FsError> {
        self.inner.patch(patches)
    }
}

impl FileSystem for BrokenReads {
    type File = BrokenFile;

    fn create_dir(&self, principal: &Principal, name: &str) -> Result<(), FsError> {
        self.inner.create_dir(principal, name)
    }

    fn open(
        &self,
        principal: &Principal,
        name: &str,
        flags: OpenFlags,
    ) -> Result<BrokenFile, FsError> {
        Ok(BrokenFile {
            inner: self.inner.open(principal, name, flags)?,
            broken: name == self.broken,
        })
    }

    fn remove_all(&self, principal: &Principal, name: &str) -> Result<(), FsError> {
        self.inner.remove_all(principal, name)
    }

    fn rename(&self, principal: &Principal, from: &str, to: &str) -> Result<(), FsError> {
        self.inner.rename(principal, from, to)
    }

    fn stat(&self, principal: &Principal, name: &str) -> Result<ResourceInfo, FsError> {
        self.inner.stat(principal, name)
    }

    fn read_dir(&self, principal: &Principal, name: &str) -> Result<Vec<ResourceInfo>, FsError> {
        self.inner.read_dir(principal, name)
    }
}

#[test]
fn test_copy_read_failure_still_copies_properties() {
    let fx = Fixture::open();
    let rob = fx.user("rob");
    fx.write("src.txt", "content");

    let mut file = fx.fs.open(&rob, "/src.txt", OpenFlags::WRITE).unwrap();
    file.patch(&[PropPatch::set(vec![Property::new(name("author"), "rob")])])
        .unwrap();
    drop(file);

    let broken = BrokenReads {
        inner: AuthorizedFs::new(fx.root(), RuleEvaluator::new()),
        broken: "/src.txt",
    };
    let err = copy_files(
        &broken,
        &rob,
        "/src.txt",
        "/dst.txt",
        false,
        Depth::Infinity,
        RecursionGuard::default(),
    )
    .unwrap_err();
    assert_eq!(err.status, DavStatus::InternalServerError);
    assert!(matches!(err.source, FsError::Storage(_)));

    let copy = fx.fs.open(&rob, "/dst.txt", OpenFlags::READ).unwrap();
    let props = copy.dead_props().unwrap();
    assert_eq!(props.get(&name("author")).map(String::as_str), Some("rob"));
}

#![allow(dead_code)]

use davgate_core::Principal;
use davgate_fs::AuthorizedFs;
use davgate_policy::RuleEvaluator;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A policy granting everything to everyone.
pub const OPEN_POLICY: &str =
    r#"{"Stat": true, "Read": true, "Write": true, "Create": true, "Delete": true}"#;

/// A policy granting everything to the owner of the top-level directory.
pub const OWNER_POLICY: &str = r#"{
    "Stat": {"owner": true},
    "Read": {"owner": true},
    "Write": {"owner": true},
    "Create": {"owner": true},
    "Delete": {"owner": true}
}"#;

pub struct Fixture {
    pub dir: TempDir,
    pub fs: AuthorizedFs<RuleEvaluator>,
}

impl Fixture {
    /// An empty store whose root grants everything.
    pub fn open() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".__thisdir.policy"), OPEN_POLICY).unwrap();
        let fs = AuthorizedFs::new(dir.path(), RuleEvaluator::new());
        Self { dir, fs }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn mkdir(&self, rel: &str) {
        fs::create_dir_all(self.root().join(rel)).unwrap();
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root().join(rel)).unwrap()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.root().join(rel).exists()
    }

    /// Give a principal a home directory and a username claim.
    pub fn user(&self, name: &str) -> Principal {
        self.write(
            &format!("{}/.__claims.json", name),
            &format!(r#"{{"groups": {{"username": ["{}"]}}}}"#, name),
        );
        Principal::new(name)
    }
}

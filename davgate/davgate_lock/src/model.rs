//! Lock data model.

use davgate_core::{Depth, Principal, ResourceInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// A lock's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDetails {
    /// The locked resource. A zero-depth lock covers only this resource.
    pub root: String,

    /// `Depth::Zero` or `Depth::Infinity`.
    pub depth: Depth,

    /// How long the lock lives unless refreshed; `None` never expires.
    pub timeout: Option<Duration>,

    /// Verbatim owner description supplied by the client.
    pub owner_xml: String,

    /// The principal that created the lock.
    pub principal: Principal,
}

impl LockDetails {
    /// Create lock details.
    pub fn new(
        root: impl Into<String>,
        depth: Depth,
        timeout: Option<Duration>,
        principal: Principal,
    ) -> Self {
        Self {
            root: root.into(),
            depth,
            timeout,
            owner_xml: String::new(),
            principal,
        }
    }

    /// Attach an owner description.
    pub fn with_owner(mut self, owner_xml: impl Into<String>) -> Self {
        self.owner_xml = owner_xml.into();
        self
    }

    /// Check whether the lock covers only its root.
    pub fn is_zero_depth(&self) -> bool {
        self.depth == Depth::Zero
    }
}

/// A predicate presented when confirming locks.
///
/// Exactly one of `token` and `etag` should be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Negate the match.
    pub not: bool,

    /// A lock token.
    pub token: Option<String>,

    /// A resource version tag.
    pub etag: Option<String>,
}

impl Condition {
    /// A condition matching a lock token.
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// A condition matching a resource version tag.
    pub fn etag(etag: impl Into<String>) -> Self {
        Self {
            etag: Some(etag.into()),
            ..Self::default()
        }
    }

    /// Negate this condition.
    pub fn negate(mut self) -> Self {
        self.not = !self.not;
        self
    }

    /// The token this condition can claim a lock with, if any.
    ///
    /// Only positive token conditions claim locks.
    pub fn claim_token(&self) -> Option<&str> {
        if self.not {
            return None;
        }
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    /// Evaluate an ETag condition against a resource.
    ///
    /// Returns `None` for token conditions.
    pub fn check_etag(&self, info: Option<&ResourceInfo>) -> Option<bool> {
        let etag = self.etag.as_deref()?;
        let matches = info.map(|info| info.etag() == etag).unwrap_or(false);
        Some(matches != self.not)
    }
}

/// Keeps confirmed locks held until released or dropped.
///
/// Releasing does not unlock; it lets the locks be confirmed again.
#[must_use = "locks are released as soon as the guard is dropped"]
pub struct Release {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Release {
    /// A guard running `f` on release.
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(f)),
        }
    }

    /// A guard holding nothing.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Release now.
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Release {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Release")
            .field("pending", &self.release.is_some())
            .finish()
    }
}

/// Issue a fresh lock token.
pub fn new_token() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use davgate_core::{ResourceKind, ResourcePath};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_claim_token() {
        assert_eq!(Condition::token("t").claim_token(), Some("t"));
        assert_eq!(Condition::token("t").negate().claim_token(), None);
        assert_eq!(Condition::etag("\"x\"").claim_token(), None);
        assert_eq!(Condition::token("").claim_token(), None);
    }

    #[test]
    fn test_check_etag() {
        let info = ResourceInfo {
            path: ResourcePath::parse("/a").unwrap(),
            kind: ResourceKind::File,
            size: 3,
            modified: DateTime::<Utc>::UNIX_EPOCH,
        };
        let etag = info.etag();

        assert_eq!(Condition::etag(etag.clone()).check_etag(Some(&info)), Some(true));
        assert_eq!(
            Condition::etag(etag.clone()).negate().check_etag(Some(&info)),
            Some(false)
        );
        assert_eq!(Condition::etag(etag).check_etag(None), Some(false));
        assert_eq!(Condition::token("t").check_etag(Some(&info)), None);
    }

    #[test]
    fn test_release_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let release = Release::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        release.release();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let counter = count.clone();
        {
            let _release = Release::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_token_format() {
        let token = new_token();
        assert!(token.starts_with("urn:uuid:"));
        assert_ne!(token, new_token());
    }
}

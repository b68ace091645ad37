//! The lock state machine shared by every backend.
//!
//! Every name on the path from a locked resource up to the root has a node
//! whose reference count is the number of locks at or below it. A node
//! without a lock of its own therefore means that something beneath it is
//! locked, which is what conflict checks for infinite-depth locks need.

use chrono::{DateTime, TimeDelta, Utc};
use davgate_core::{Depth, LockError, Principal, ResourcePath};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::model::{new_token, Condition, LockDetails};

/// A granted lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLock {
    /// The lock token.
    pub token: String,

    /// Lock metadata.
    pub details: LockDetails,

    /// When the lock expires; `None` never.
    pub expiry: Option<DateTime<Utc>>,

    /// The confirmation currently holding the lock, if any.
    #[serde(default)]
    pub hold: Option<Hold>,
}

impl ActiveLock {
    /// Check whether a confirmation currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.hold.is_some()
    }
}

/// Who holds a confirmed lock, and since when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    /// Process id of the holder.
    pub pid: u32,

    /// When the lock was confirmed.
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LockNode {
    ref_count: usize,
    lock: Option<ActiveLock>,
}

/// Name-indexed lock nodes with token and expiry indexes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockTable {
    nodes: BTreeMap<String, LockNode>,
    tokens: BTreeMap<String, String>,
    expiry: BTreeSet<(DateTime<Utc>, String)>,
}

/// The names from `name` up to and including the root.
fn ancestry(name: &ResourcePath) -> impl Iterator<Item = ResourcePath> {
    std::iter::successors(Some(name.clone()), ResourcePath::parent)
}

/// Normalize a lock name.
fn clean(name: &str) -> Result<ResourcePath, LockError> {
    ResourcePath::parse(name).map_err(|_| LockError::ConfirmationFailed)
}

fn expiry_for(now: DateTime<Utc>, timeout: Option<Duration>) -> Option<DateTime<Utc>> {
    let timeout = TimeDelta::from_std(timeout?).ok()?;
    now.checked_add_signed(timeout)
}

impl LockTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of granted locks.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Check whether no locks are granted.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// All granted locks.
    pub fn locks(&self) -> impl Iterator<Item = &ActiveLock> {
        self.tokens
            .values()
            .filter_map(|name| self.nodes.get(name))
            .filter_map(|node| node.lock.as_ref())
    }

    /// Look up a lock by token.
    pub fn get(&self, token: &str) -> Option<&ActiveLock> {
        let name = self.tokens.get(token)?;
        self.nodes.get(name)?.lock.as_ref()
    }

    fn get_mut(&mut self, token: &str) -> Option<&mut ActiveLock> {
        let name = self.tokens.get(token)?;
        self.nodes.get_mut(name)?.lock.as_mut()
    }

    /// Drop every unheld lock whose expiry is at or before `now`.
    pub fn collect_expired(&mut self, now: DateTime<Utc>) {
        while self.expiry.first().is_some_and(|(expiry, _)| *expiry <= now) {
            let Some((_, token)) = self.expiry.pop_first() else {
                break;
            };
            info!(token = %token, "lock expired");
            self.remove(&token);
        }
    }

    /// Check whether a lock of the given depth may be created at `name`.
    fn can_create(&self, name: &ResourcePath, depth: Depth) -> bool {
        for (i, ancestor) in ancestry(name).enumerate() {
            let Some(node) = self.nodes.get(ancestor.as_str()) else {
                continue;
            };
            if i == 0 {
                // The target itself is locked.
                if node.lock.is_some() {
                    return false;
                }
                // Something beneath the target is locked.
                if depth != Depth::Zero {
                    return false;
                }
            } else if node
                .lock
                .as_ref()
                .is_some_and(|lock| !lock.details.is_zero_depth())
            {
                return false;
            }
        }
        true
    }

    /// Grant a new lock.
    ///
    /// Fails with [`LockError::Locked`] if the lock would overlap an
    /// existing one: the same resource, an infinite-depth lock on an
    /// ancestor, or any lock beneath an infinite-depth request.
    pub fn create(
        &mut self,
        now: DateTime<Utc>,
        mut details: LockDetails,
    ) -> Result<String, LockError> {
        self.collect_expired(now);

        if details.depth == Depth::One {
            return Err(LockError::InvalidDepth);
        }
        let root = clean(&details.root)?;
        if !self.can_create(&root, details.depth) {
            return Err(LockError::Locked);
        }

        for ancestor in ancestry(&root) {
            self.nodes
                .entry(ancestor.as_str().to_string())
                .or_default()
                .ref_count += 1;
        }

        let token = new_token();
        details.root = root.as_str().to_string();
        let expiry = expiry_for(now, details.timeout);
        if let Some(expiry) = expiry {
            self.expiry.insert((expiry, token.clone()));
        }
        self.tokens.insert(token.clone(), details.root.clone());

        info!(token = %token, root = %details.root, depth = %details.depth, principal = %details.principal, "lock created");
        if let Some(node) = self.nodes.get_mut(root.as_str()) {
            node.lock = Some(ActiveLock {
                token: token.clone(),
                details,
                expiry,
                hold: None,
            });
        }

        Ok(token)
    }

    /// Extend a lock's lifetime.
    pub fn refresh(
        &mut self,
        now: DateTime<Utc>,
        token: &str,
        timeout: Option<Duration>,
    ) -> Result<LockDetails, LockError> {
        self.collect_expired(now);

        let lock = self.get_mut(token).ok_or(LockError::NoSuchLock)?;
        if lock.is_held() {
            return Err(LockError::Locked);
        }

        let old = lock.expiry.take();
        lock.details.timeout = timeout;
        lock.expiry = expiry_for(now, timeout);
        let new = lock.expiry;
        let details = lock.details.clone();

        if let Some(old) = old {
            self.expiry.remove(&(old, token.to_string()));
        }
        if let Some(new) = new {
            self.expiry.insert((new, token.to_string()));
        }

        debug!(token = %token, "lock refreshed");
        Ok(details)
    }

    /// Remove a lock on behalf of a principal.
    pub fn unlock(
        &mut self,
        now: DateTime<Utc>,
        token: &str,
        principal: &Principal,
    ) -> Result<(), LockError> {
        self.collect_expired(now);

        let lock = self.get(token).ok_or(LockError::NoSuchLock)?;
        if &lock.details.principal != principal {
            return Err(LockError::Forbidden);
        }
        if lock.is_held() {
            return Err(LockError::Locked);
        }

        self.remove(token);
        info!(token = %token, principal = %principal, "lock released");
        Ok(())
    }

    /// Find the lock a set of conditions claims for `name`.
    ///
    /// The lock may sit on an ancestor if it has infinite depth. Held locks
    /// cannot be claimed.
    fn lookup(&self, name: &ResourcePath, conditions: &[Condition]) -> Option<String> {
        for token in conditions.iter().filter_map(Condition::claim_token) {
            let Some(lock) = self.get(token) else {
                continue;
            };
            if lock.is_held() {
                continue;
            }
            let Ok(root) = ResourcePath::parse(&lock.details.root) else {
                continue;
            };
            if &root == name {
                return Some(lock.token.clone());
            }
            if lock.details.is_zero_depth() {
                continue;
            }
            if name.is_within(&root) {
                return Some(lock.token.clone());
            }
        }
        None
    }

    /// Claim the locks covering up to two resources. Empty names are
    /// ignored.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<String>)` - Tokens now held; pass them to
    ///   [`LockTable::release`].
    /// * `Err(LockError::ConfirmationFailed)` - If a named resource is not
    ///   covered by an unheld lock matching the conditions.
    pub fn confirm(
        &mut self,
        now: DateTime<Utc>,
        name0: &str,
        name1: &str,
        conditions: &[Condition],
    ) -> Result<Vec<String>, LockError> {
        self.collect_expired(now);

        let mut held = Vec::new();
        for name in [name0, name1] {
            if name.is_empty() {
                continue;
            }
            let name = clean(name)?;
            let token = self
                .lookup(&name, conditions)
                .ok_or(LockError::ConfirmationFailed)?;
            if !held.contains(&token) {
                held.push(token);
            }
        }

        let hold = Hold {
            pid: std::process::id(),
            since: now,
        };
        for token in &held {
            self.hold(token, hold);
        }
        Ok(held)
    }

    /// Release tokens held by [`LockTable::confirm`].
    pub fn release(&mut self, tokens: &[String]) {
        for token in tokens {
            self.unhold(token);
        }
    }

    /// Release holds whose holder is gone.
    ///
    /// A hold is stale once `is_alive` reports its process dead, or once it
    /// is older than `max_age`. Released locks expire normally again.
    ///
    /// # Returns
    ///
    /// The number of holds released.
    pub fn clear_stale_holds(
        &mut self,
        now: DateTime<Utc>,
        max_age: TimeDelta,
        is_alive: impl Fn(u32) -> bool,
    ) -> usize {
        let stale: Vec<(String, Hold)> = self
            .locks()
            .filter_map(|lock| Some((lock.token.clone(), lock.hold?)))
            .filter(|(_, hold)| {
                let expired = hold
                    .since
                    .checked_add_signed(max_age)
                    .is_some_and(|deadline| deadline <= now);
                expired || !is_alive(hold.pid)
            })
            .collect();

        for (token, hold) in &stale {
            warn!(token = %token, pid = hold.pid, since = %hold.since, "releasing stale hold");
            self.unhold(token);
        }
        stale.len()
    }

    fn hold(&mut self, token: &str, hold: Hold) {
        if let Some(lock) = self.get_mut(token) {
            lock.hold = Some(hold);
            if let Some(expiry) = lock.expiry {
                self.expiry.remove(&(expiry, token.to_string()));
            }
        }
    }

    fn unhold(&mut self, token: &str) {
        if let Some(lock) = self.get_mut(token) {
            lock.hold = None;
            if let Some(expiry) = lock.expiry {
                self.expiry.insert((expiry, token.to_string()));
            }
        }
    }

    fn remove(&mut self, token: &str) {
        let Some(name) = self.tokens.remove(token) else {
            return;
        };
        let Ok(root) = ResourcePath::parse(&name) else {
            return;
        };

        if let Some(lock) = self.nodes.get_mut(&name).and_then(|node| node.lock.take()) {
            if let Some(expiry) = lock.expiry {
                self.expiry.remove(&(expiry, token.to_string()));
            }
        }

        for ancestor in ancestry(&root) {
            if let Some(node) = self.nodes.get_mut(ancestor.as_str()) {
                node.ref_count = node.ref_count.saturating_sub(1);
                if node.ref_count == 0 {
                    self.nodes.remove(ancestor.as_str());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    fn details(root: &str, depth: Depth, timeout: Option<u64>) -> LockDetails {
        LockDetails::new(
            root,
            depth,
            timeout.map(Duration::from_secs),
            Principal::new("rob"),
        )
    }

    #[test]
    fn test_infinite_lock_blocks_descendants() {
        let mut table = LockTable::new();
        table
            .create(at(0), details("/docs", Depth::Infinity, None))
            .unwrap();

        assert_eq!(
            table.create(at(0), details("/docs/sub", Depth::Infinity, None)),
            Err(LockError::Locked)
        );
        assert_eq!(
            table.create(at(0), details("/docs/sub", Depth::Zero, None)),
            Err(LockError::Locked)
        );
        assert_eq!(
            table.create(at(0), details("/docs", Depth::Zero, None)),
            Err(LockError::Locked)
        );
        assert!(table.create(at(0), details("/docs2", Depth::Zero, None)).is_ok());
    }

    #[test]
    fn test_descendant_lock_blocks_infinite_ancestor() {
        let mut table = LockTable::new();
        table
            .create(at(0), details("/docs/sub/file", Depth::Zero, None))
            .unwrap();

        assert_eq!(
            table.create(at(0), details("/docs", Depth::Infinity, None)),
            Err(LockError::Locked)
        );
        assert_eq!(
            table.create(at(0), details("/", Depth::Infinity, None)),
            Err(LockError::Locked)
        );
        // A zero-depth lock on an ancestor does not overlap
        assert!(table.create(at(0), details("/docs", Depth::Zero, None)).is_ok());
    }

    #[test]
    fn test_depth_one_rejected() {
        let mut table = LockTable::new();
        assert_eq!(
            table.create(at(0), details("/docs", Depth::One, None)),
            Err(LockError::InvalidDepth)
        );
    }

    #[test]
    fn test_unlock_frees_nodes() {
        let mut table = LockTable::new();
        let token = table
            .create(at(0), details("/a/b/c", Depth::Infinity, None))
            .unwrap();
        table.unlock(at(0), &token, &Principal::new("rob")).unwrap();

        assert!(table.is_empty());
        assert!(table.nodes.is_empty());
        assert!(table.create(at(0), details("/", Depth::Infinity, None)).is_ok());
    }

    #[test]
    fn test_unlock_errors() {
        let mut table = LockTable::new();
        let token = table
            .create(at(0), details("/a", Depth::Zero, None))
            .unwrap();

        assert_eq!(
            table.unlock(at(0), "urn:uuid:nope", &Principal::new("rob")),
            Err(LockError::NoSuchLock)
        );
        assert_eq!(
            table.unlock(at(0), &token, &Principal::new("alice")),
            Err(LockError::Forbidden)
        );

        let held = table
            .confirm(at(0), "/a", "", &[Condition::token(token.clone())])
            .unwrap();
        assert_eq!(
            table.unlock(at(0), &token, &Principal::new("rob")),
            Err(LockError::Locked)
        );
        table.release(&held);
        assert!(table.unlock(at(0), &token, &Principal::new("rob")).is_ok());
    }

    #[test]
    fn test_expiry() {
        let mut table = LockTable::new();
        let token = table
            .create(at(0), details("/a", Depth::Zero, Some(10)))
            .unwrap();

        table.collect_expired(at(9));
        assert!(table.get(&token).is_some());

        table.collect_expired(at(10));
        assert!(table.get(&token).is_none());
        assert!(table.nodes.is_empty());
        assert!(table.expiry.is_empty());
    }

    #[test]
    fn test_refresh() {
        let mut table = LockTable::new();
        let token = table
            .create(at(0), details("/a", Depth::Zero, Some(10)))
            .unwrap();

        let refreshed = table
            .refresh(at(5), &token, Some(Duration::from_secs(10)))
            .unwrap();
        assert_eq!(refreshed.timeout, Some(Duration::from_secs(10)));

        table.collect_expired(at(12));
        assert!(table.get(&token).is_some());
        table.collect_expired(at(15));
        assert!(table.get(&token).is_none());

        assert_eq!(
            table.refresh(at(15), &token, None),
            Err(LockError::NoSuchLock)
        );
    }

    #[test]
    fn test_confirm_covers_descendants() {
        let mut table = LockTable::new();
        let token = table
            .create(at(0), details("/docs", Depth::Infinity, None))
            .unwrap();
        let conditions = [Condition::token(token.clone())];

        let held = table
            .confirm(at(0), "/docs/a.txt", "/docs/b/c.txt", &conditions)
            .unwrap();
        assert_eq!(held, vec![token.clone()]);

        // Held: cannot be confirmed again until released
        assert_eq!(
            table.confirm(at(0), "/docs/a.txt", "", &conditions),
            Err(LockError::ConfirmationFailed)
        );
        table.release(&held);
        assert!(table.confirm(at(0), "/docs/a.txt", "", &conditions).is_ok());
    }

    #[test]
    fn test_confirm_zero_depth() {
        let mut table = LockTable::new();
        let token = table
            .create(at(0), details("/docs", Depth::Zero, None))
            .unwrap();
        let conditions = [Condition::token(token)];

        assert!(table.confirm(at(0), "/docs/a.txt", "", &conditions).is_err());
        assert!(table.confirm(at(0), "/docs", "", &conditions).is_ok());
    }

    #[test]
    fn test_confirm_rejects_unmatched() {
        let mut table = LockTable::new();
        let token = table
            .create(at(0), details("/docs", Depth::Infinity, None))
            .unwrap();

        assert_eq!(
            table.confirm(at(0), "/other", "", &[Condition::token(token.clone())]),
            Err(LockError::ConfirmationFailed)
        );
        assert_eq!(
            table.confirm(at(0), "/docs", "", &[Condition::token(token).negate()]),
            Err(LockError::ConfirmationFailed)
        );
        assert_eq!(table.confirm(at(0), "", "", &[]), Ok(vec![]));
    }

    #[test]
    fn test_held_lock_does_not_expire() {
        let mut table = LockTable::new();
        let token = table
            .create(at(0), details("/a", Depth::Zero, Some(1)))
            .unwrap();
        let held = table
            .confirm(at(0), "/a", "", &[Condition::token(token.clone())])
            .unwrap();

        table.collect_expired(at(100));
        assert!(table.get(&token).is_some());

        table.release(&held);
        table.collect_expired(at(100));
        assert!(table.get(&token).is_none());
    }

    #[test]
    fn test_stale_holds_are_released() {
        let mut table = LockTable::new();
        let token = table
            .create(at(0), details("/a", Depth::Zero, Some(30)))
            .unwrap();
        let conditions = [Condition::token(token.clone())];
        table.confirm(at(0), "/a", "", &conditions).unwrap();
        let hold = table.get(&token).unwrap().hold.unwrap();
        assert_eq!(hold.pid, std::process::id());
        assert_eq!(hold.since, at(0));

        // Live holder within the bound
        assert_eq!(table.clear_stale_holds(at(59), TimeDelta::seconds(60), |_| true), 0);
        assert!(table.get(&token).unwrap().is_held());

        // Dead holder
        assert_eq!(table.clear_stale_holds(at(1), TimeDelta::seconds(60), |_| false), 1);
        assert!(!table.get(&token).unwrap().is_held());
        assert!(table.unlock(at(1), &token, &Principal::new("rob")).is_ok());

        // Hold outlived the bound; the lock's own expiry applies again
        let token = table
            .create(at(0), details("/b", Depth::Zero, Some(30)))
            .unwrap();
        table
            .confirm(at(0), "/b", "", &[Condition::token(token.clone())])
            .unwrap();
        assert_eq!(table.clear_stale_holds(at(60), TimeDelta::seconds(60), |_| true), 1);
        table.collect_expired(at(60));
        assert!(table.get(&token).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_serde_round_trip_keeps_state() {
        let mut table = LockTable::new();
        let token = table
            .create(at(0), details("/a/b", Depth::Infinity, Some(60)))
            .unwrap();

        let json = serde_json::to_string(&table).unwrap();
        let mut restored: LockTable = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.get(&token), table.get(&token));
        assert_eq!(
            restored.create(at(0), details("/a", Depth::Infinity, None)),
            Err(LockError::Locked)
        );
    }
}

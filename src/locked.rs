//! Lock-guarded persistent cache
//!
//! Same mapping as `Cache`, but every read-modify-write runs inside a
//! cross-process critical section: take the file lock, reload from disk,
//! mutate in memory, persist, release. Disk I/O happens only at the scope
//! boundaries, so concurrent writers cannot interleave store and persist
//! steps.

use crate::error::{StashError, StashResult};
use crate::lock::FileLock;
use crate::store::{self, Store};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry for lock acquisition and locked loads
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per phase before giving up
    pub max_attempts: u32,
    /// Sleep between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Cache whose updates are serialized across processes by a `FileLock`
#[derive(Debug)]
pub struct LockedCache {
    path: PathBuf,
    lock: FileLock,
    policy: RetryPolicy,
    store: Store,
}

impl LockedCache {
    /// Create a locked cache over `path`, guarded by the lock file at
    /// `lock_path`
    ///
    /// Lazy: the in-memory store starts empty and is populated from disk
    /// when a scope is entered, so construction never touches the cache
    /// file.
    pub fn open(path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: FileLock::new(lock_path),
            policy: RetryPolicy::default(),
            store: Store::new(),
        }
    }

    /// Create a locked cache and eagerly load the current file contents
    ///
    /// The load happens outside any lock and is best-effort initial state
    /// only: a concurrent writer can be mid-write, and the next scope entry
    /// supersedes whatever was read here. A missing file starts empty.
    pub fn open_eager(path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> StashResult<Self> {
        let mut cache = Self::open(path, lock_path);
        cache.store = match store::load_store(&cache.path) {
            Ok(store) => store,
            Err(StashError::StoreNotFound(_)) => Store::new(),
            Err(e) => return Err(e),
        };
        Ok(cache)
    }

    /// Set the retry policy for lock acquisition and locked loads
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the maximum time each wait-for-unlock blocks
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.lock = self.lock.with_max_wait(max_wait);
        self
    }

    /// Set the lock-file polling interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.lock = self.lock.with_poll_interval(poll_interval);
        self
    }

    /// Get the cache file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a value from the in-memory store, deserialized into `T`
    ///
    /// Outside a scope this reflects the last scoped load (or the eager
    /// constructor load), not necessarily the file's current contents.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StashResult<Option<T>> {
        match self.store.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Get the raw JSON value for a key from the in-memory store
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.store.get(key).cloned()
    }

    /// Number of entries currently in memory
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the in-memory store is empty
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Enter the critical section
    ///
    /// Acquires the lock (bounded retry), then loads the file (bounded
    /// retry, tolerating a concurrent writer's torn output), and returns a
    /// scope whose mutations are memory-only until it is committed or
    /// dropped. If the load fails for good, the just-created lock file is
    /// removed before the error propagates so a failed entry never leaves
    /// the lock held.
    pub fn scope(&mut self) -> StashResult<LockedScope<'_>> {
        self.acquire()?;

        match self.load_locked() {
            Ok(store) => self.store = store,
            Err(e) => {
                if let Err(unlock_err) = self.lock.unlock() {
                    warn!(
                        "Failed to release lock after load failure on {}: {}",
                        self.path.display(),
                        unlock_err
                    );
                }
                return Err(e);
            }
        }

        Ok(LockedScope {
            cache: self,
            committed: false,
        })
    }

    /// Wait-then-lock, retried when another process wins the create race
    fn acquire(&self) -> StashResult<()> {
        for attempt in 1..=self.policy.max_attempts {
            self.lock.wait_unlock()?;
            match self.lock.lock() {
                Ok(()) => return Ok(()),
                Err(StashError::LockHeld(_)) => {
                    debug!(
                        "Lost lock race on {} (attempt {}/{})",
                        self.lock.path().display(),
                        attempt,
                        self.policy.max_attempts
                    );
                    thread::sleep(self.policy.backoff);
                }
                Err(e) => return Err(e),
            }
        }

        Err(StashError::LockRetriesExhausted {
            path: self.lock.path().to_path_buf(),
            attempts: self.policy.max_attempts,
        })
    }

    /// Load the file while holding the lock
    ///
    /// A missing file means no one has written yet: start empty. An
    /// undecodable file may be a concurrent writer mid-write, so back off
    /// and retry; if it never becomes readable, surface the decode failure.
    fn load_locked(&self) -> StashResult<Store> {
        let mut last_corrupt = None;

        for attempt in 1..=self.policy.max_attempts {
            match store::load_store(&self.path) {
                Ok(store) => return Ok(store),
                Err(StashError::StoreNotFound(_)) => return Ok(Store::new()),
                Err(e @ StashError::StoreCorrupt { .. }) => {
                    debug!(
                        "Cache file {} unreadable (attempt {}/{}), retrying",
                        self.path.display(),
                        attempt,
                        self.policy.max_attempts
                    );
                    last_corrupt = Some(e);
                    thread::sleep(self.policy.backoff);
                }
                Err(e) => return Err(e),
            }
        }

        match last_corrupt {
            Some(e) => Err(e),
            None => store::load_store(&self.path),
        }
    }

    /// Persist the full store, then release the lock
    ///
    /// Both steps always run; a persist failure does not skip the unlock.
    /// An already-absent lock file is not an error here: releasing was the
    /// goal and it is already released.
    fn release(&mut self) -> StashResult<()> {
        let persisted = store::save_store(&self.path, &self.store);

        let unlocked = match self.lock.unlock() {
            Err(StashError::LockNotHeld(path)) => {
                debug!("Lock file {} already gone at release", path.display());
                Ok(())
            }
            other => other,
        };

        persisted?;
        unlocked
    }
}

/// Critical section over a `LockedCache`
///
/// While the scope is alive the in-memory store is authoritative and all
/// mutations are memory-only. `commit` persists and unlocks, propagating
/// failures; dropping the scope without committing runs the same
/// persist-then-unlock sequence best-effort, so the lock is released on
/// every exit path including panics.
#[derive(Debug)]
pub struct LockedScope<'a> {
    cache: &'a mut LockedCache,
    committed: bool,
}

impl LockedScope<'_> {
    /// Insert or overwrite a key in memory
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> StashResult<()> {
        self.cache
            .store
            .insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Remove a key from memory if present; absent keys are a no-op
    pub fn clear(&mut self, key: &str) {
        self.cache.store.remove(key);
    }

    /// Get a value from the scope's store, deserialized into `T`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StashResult<Option<T>> {
        self.cache.get(key)
    }

    /// Get the raw JSON value for a key
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.cache.get_value(key)
    }

    /// Number of entries in the scope's store
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the scope's store is empty
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Exit the critical section: persist the store, then unlock
    ///
    /// Propagates persist and unlock failures, except the one case where
    /// the lock file was already removed out-of-band.
    pub fn commit(mut self) -> StashResult<()> {
        self.committed = true;
        self.cache.release()
    }
}

impl Drop for LockedScope<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self.cache.release() {
            warn!(
                "Failed to persist and release {} on scope exit: {}",
                self.cache.path.display(),
                e
            );
        }
    }
}

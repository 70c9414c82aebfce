//! Filesystem-presence file lock
//!
//! Advisory, cooperative mutual exclusion between processes sharing one
//! filesystem: the existence of the lock file is the whole lock state.
//! Portable anywhere an exclusive-create open is available; no advisory
//! `flock`-style syscalls involved.
//!
//! The file's content is a human-readable creation timestamp for whoever
//! goes looking at a stale lock. It is never parsed back. No owner identity
//! is recorded, so any process can unlock any lock.

use crate::error::{StashError, StashResult};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default maximum time to wait for another holder to release
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);

/// Default interval between lock-file presence checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cross-process lock backed by a lock file's existence
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    max_wait: Duration,
    poll_interval: Duration,
}

impl FileLock {
    /// Create a lock handle with default wait and poll settings
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_wait: DEFAULT_MAX_WAIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the maximum time `wait_unlock` blocks before failing
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Set the interval between presence checks while waiting
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Get the lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether the lock file currently exists
    pub fn is_locked(&self) -> bool {
        self.path.exists()
    }

    /// Block until the lock file does not exist
    ///
    /// Polls at `poll_interval`. Returns immediately if the file never
    /// existed. Fails with `LockTimeout` once more than `max_wait` has
    /// elapsed with the file still present.
    pub fn wait_unlock(&self) -> StashResult<()> {
        let start = Instant::now();
        loop {
            if !self.path.exists() {
                return Ok(());
            }
            thread::sleep(self.poll_interval);

            let waited = start.elapsed();
            if waited > self.max_wait {
                return Err(StashError::LockTimeout {
                    path: self.path.clone(),
                    waited,
                });
            }
        }
    }

    /// Take the lock by creating the lock file
    ///
    /// Uses an exclusive create, so the presence check and the creation are
    /// one atomic filesystem operation. Fails with `LockHeld` if the file
    /// already exists; the caller decides whether to retry.
    pub fn lock(&self) -> StashResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    StashError::LockHeld(self.path.clone())
                } else {
                    StashError::io(format!("creating lock file {}", self.path.display()), e)
                }
            })?;

        let stamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
        file.write_all(stamp.as_bytes())
            .map_err(|e| StashError::io(format!("writing lock file {}", self.path.display()), e))?;

        debug!("Locked {}", self.path.display());
        Ok(())
    }

    /// Release the lock by removing the lock file
    ///
    /// Fails with `LockNotHeld` if the file does not exist.
    pub fn unlock(&self) -> StashResult<()> {
        fs::remove_file(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StashError::LockNotHeld(self.path.clone())
            } else {
                StashError::io(format!("removing lock file {}", self.path.display()), e)
            }
        })?;

        debug!("Unlocked {}", self.path.display());
        Ok(())
    }

    /// Scoped acquisition: wait for the lock to clear, then take it
    ///
    /// The returned guard releases the lock when dropped, on every exit path
    /// including panics. Intended for single short critical sections; there
    /// is no built-in retry when another process wins the create race.
    /// That loop lives in `LockedCache`.
    pub fn acquire(&self) -> StashResult<LockGuard<'_>> {
        self.wait_unlock()?;
        self.lock()?;
        Ok(LockGuard { lock: self })
    }
}

/// RAII guard for a held `FileLock`
///
/// Dropping the guard removes the lock file. `Drop` cannot propagate errors,
/// so a failed removal is logged instead.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a FileLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            warn!("Failed to release lock {}: {}", self.lock.path.display(), e);
        }
    }
}

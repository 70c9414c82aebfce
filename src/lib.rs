//! stash - Persistent key-value cache with cross-process file locking
//!
//! A small file-backed mapping that survives process restarts, plus a
//! filesystem-presence lock so independent processes can read-modify-write
//! the same cache file without corrupting it. Locking is advisory and
//! cooperative: all writers must go through [`LockedCache`] (or honor
//! [`FileLock`] themselves) and share one filesystem.
//!
//! # Example
//!
//! ```no_run
//! use stash::{Cache, LockedCache, StashResult};
//!
//! fn main() -> StashResult<()> {
//!     // Single-writer use: every set rewrites the file.
//!     let mut cache = Cache::open("/tmp/app-cache.json")?;
//!     cache.set("answer", 42)?;
//!     assert_eq!(cache.get::<i64>("answer")?, Some(42));
//!
//!     // Multi-process use: updates run inside a critical section.
//!     let mut shared = LockedCache::open("/tmp/shared.json", "/tmp/shared.lock");
//!     let mut scope = shared.scope()?;
//!     scope.set("worker", "done")?;
//!     scope.commit()?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod lock;
pub mod locked;
pub mod store;

pub use cache::Cache;
pub use error::{StashError, StashResult};
pub use lock::{FileLock, LockGuard};
pub use locked::{LockedCache, LockedScope, RetryPolicy};
pub use store::Store;

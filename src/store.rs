//! Persisted store codec
//!
//! Loads and saves the entire key-value mapping as a single JSON file.
//! The blob is always written whole; there is no incremental update.

use crate::error::{StashError, StashResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// In-memory form of the persisted mapping
pub type Store = BTreeMap<String, Value>;

/// Load the store from a JSON blob at `path`
///
/// A missing file is `StoreNotFound`. A file that exists but does not decode
/// (including one truncated by a writer that died mid-write) is
/// `StoreCorrupt`.
pub fn load_store(path: &Path) -> StashResult<Store> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StashError::StoreNotFound(path.to_path_buf())
        } else {
            StashError::io(format!("reading cache file {}", path.display()), e)
        }
    })?;

    let store: Store = serde_json::from_str(&content).map_err(|e| StashError::StoreCorrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    debug!("Loaded {} entries from {}", store.len(), path.display());
    Ok(store)
}

/// Save the store as a JSON blob at `path`, overwriting the whole file
///
/// The write is not atomic. A reader racing this write can observe a
/// truncated blob; `LockedCache` tolerates that by retrying the load.
pub fn save_store(path: &Path, store: &Store) -> StashResult<()> {
    let content = serde_json::to_string_pretty(store)?;
    fs::write(path, content)
        .map_err(|e| StashError::io(format!("writing cache file {}", path.display()), e))?;

    debug!("Saved {} entries to {}", store.len(), path.display());
    Ok(())
}

//! Persistent key-value cache
//!
//! A simple mapping backed by a single file, persisted whole on every
//! mutation. No locking of any kind: concurrent writers on the same path
//! race with last-write-wins semantics. Use `LockedCache` when multiple
//! processes update the same file.

use crate::error::{StashError, StashResult};
use crate::store::{self, Store};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed key-value cache with per-operation persistence
#[derive(Debug)]
pub struct Cache {
    path: PathBuf,
    auto_reload: bool,
    store: Store,
}

impl Cache {
    /// Open a cache at `path`
    ///
    /// Loads the existing file, or starts empty and writes the file
    /// immediately if there is none, so the path always exists once
    /// construction succeeds. The parent directory must already exist.
    pub fn open(path: impl Into<PathBuf>) -> StashResult<Self> {
        Self::open_inner(path.into(), false)
    }

    /// Open a cache that reloads from disk before every get/set/clear
    ///
    /// Makes writes from other live instances on the same path visible, at
    /// the cost of discarding this instance's in-memory state on each
    /// operation.
    pub fn open_auto_reload(path: impl Into<PathBuf>) -> StashResult<Self> {
        Self::open_inner(path.into(), true)
    }

    fn open_inner(path: PathBuf, auto_reload: bool) -> StashResult<Self> {
        let store = match store::load_store(&path) {
            Ok(store) => store,
            Err(StashError::StoreNotFound(_)) => {
                debug!("No cache file at {}, starting empty", path.display());
                let store = Store::new();
                store::save_store(&path, &store)?;
                store
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            path,
            auto_reload,
            store,
        })
    }

    /// Get the cache file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries currently in memory
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the in-memory store is empty
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Replace the in-memory store with the current file contents
    pub fn reload(&mut self) -> StashResult<()> {
        self.store = store::load_store(&self.path)?;
        Ok(())
    }

    fn reload_if_auto(&mut self) -> StashResult<()> {
        if self.auto_reload {
            self.reload()?;
        }
        Ok(())
    }

    /// Get a value by key, deserialized into `T`
    ///
    /// A missing key is `Ok(None)`, never an error.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> StashResult<Option<T>> {
        match self.get_value(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Get the raw JSON value for a key
    pub fn get_value(&mut self, key: &str) -> StashResult<Option<Value>> {
        self.reload_if_auto()?;
        Ok(self.store.get(key).cloned())
    }

    /// Insert or overwrite a key, then persist the whole store
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> StashResult<()> {
        self.set_value(key.into(), serde_json::to_value(value)?)
    }

    fn set_value(&mut self, key: String, value: Value) -> StashResult<()> {
        self.reload_if_auto()?;
        self.store.insert(key, value);
        store::save_store(&self.path, &self.store)
    }

    /// Remove a key if present
    ///
    /// Removing an absent key is a no-op, not an error; the file is only
    /// rewritten when something was actually removed.
    pub fn clear(&mut self, key: &str) -> StashResult<()> {
        self.reload_if_auto()?;
        if self.store.remove(key).is_some() {
            store::save_store(&self.path, &self.store)?;
        }
        Ok(())
    }

    /// Compute a value once and serve it from the cache afterwards
    ///
    /// The cache key is `name`, or an identifier derived from the producer's
    /// type when `name` is `None`.
    ///
    /// # Known limitation
    ///
    /// Presence is tested by JSON truthiness of the stored value, not by key
    /// existence. A producer returning a falsy result (null, `false`, zero,
    /// an empty string, array or object) is therefore recomputed on every
    /// call.
    pub fn memoize<T, F>(&mut self, name: Option<&str>, producer: F) -> StashResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let key = match name {
            Some(name) => name.to_string(),
            None => producer_key::<F>(),
        };

        if let Some(cached) = self.get_value(&key)? {
            if is_truthy(&cached) {
                debug!("Memoized value for {} served from cache", key);
                return Ok(serde_json::from_value(cached)?);
            }
        }

        debug!("Computing memoized value for {}", key);
        let value = serde_json::to_value(producer())?;
        self.set_value(key, value.clone())?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Stable cache key derived from a producer's type name
///
/// For a named function this is the function name; for a closure it is the
/// name of the enclosing function.
fn producer_key<F>() -> String {
    let name = std::any::type_name::<F>();
    let name = name.trim_end_matches("::{{closure}}");
    name.rsplit("::").next().unwrap_or(name).to_string()
}

/// Python-style truthiness over JSON values
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

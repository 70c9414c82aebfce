//! Integration tests for stash

mod lock_tests {
    use serial_test::serial;
    use stash::{FileLock, StashError};
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn wait_unlock_times_out_near_max_wait() {
        let temp = TempDir::new().unwrap();
        let lock = FileLock::new(temp.path().join(".lock")).with_max_wait(Duration::from_secs(1));

        fs::write(lock.path(), "lock").unwrap();

        let start = Instant::now();
        let result = lock.wait_unlock();
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(StashError::LockTimeout { .. })));
        // Bounded below by max_wait and above by one extra poll tick plus
        // scheduling slack.
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_millis(1500));
    }

    #[test]
    fn contended_acquire_serializes_two_threads() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".lock");

        let lock = FileLock::new(&path).with_poll_interval(Duration::from_millis(5));
        let guard = lock.acquire().unwrap();

        let waiter_path = path.clone();
        let waiter = std::thread::spawn(move || {
            let lock = FileLock::new(&waiter_path).with_poll_interval(Duration::from_millis(5));
            let _guard = lock.acquire().unwrap();
        });

        std::thread::sleep(Duration::from_millis(50));
        drop(guard);

        waiter.join().unwrap();
        assert!(!path.exists());
    }
}

mod cache_tests {
    use stash::Cache;
    use tempfile::TempDir;

    #[test]
    fn roundtrip_across_instances() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");

        let mut cache = Cache::open(&path).unwrap();
        cache.set("name", "stash").unwrap();
        cache.set("count", 3).unwrap();
        cache.set("enabled", true).unwrap();

        let mut reopened = Cache::open(&path).unwrap();
        assert_eq!(
            reopened.get::<String>("name").unwrap(),
            Some("stash".to_string())
        );
        assert_eq!(reopened.get::<i64>("count").unwrap(), Some(3));
        assert_eq!(reopened.get::<bool>("enabled").unwrap(), Some(true));
    }

    #[test]
    fn auto_reload_visibility_between_live_instances() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");

        let mut writer = Cache::open_auto_reload(&path).unwrap();
        let mut reader = Cache::open_auto_reload(&path).unwrap();

        writer.set("test", 123).unwrap();

        assert_eq!(reader.get::<i64>("test").unwrap(), Some(123));
    }
}

mod locked_cache_tests {
    use serial_test::serial;
    use stash::{Cache, LockedCache, RetryPolicy};
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast(cache: LockedCache) -> LockedCache {
        cache
            .with_max_wait(Duration::from_secs(30))
            .with_poll_interval(Duration::from_millis(5))
            .with_retry_policy(RetryPolicy {
                max_attempts: 100,
                backoff: Duration::from_millis(5),
            })
    }

    #[test]
    fn scoped_writes_visible_to_plain_cache() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.json");

        let mut locked = fast(LockedCache::open(&cache_path, temp.path().join(".lock")));
        let mut scope = locked.scope().unwrap();
        scope.set("from-scope", 7).unwrap();
        scope.commit().unwrap();

        let mut cache = Cache::open(&cache_path).unwrap();
        assert_eq!(cache.get::<i64>("from-scope").unwrap(), Some(7));
    }

    #[test]
    fn scope_sees_prior_plain_cache_writes() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.json");

        let mut cache = Cache::open(&cache_path).unwrap();
        cache.set("seed", "value").unwrap();

        let mut locked = fast(LockedCache::open(&cache_path, temp.path().join(".lock")));
        let scope = locked.scope().unwrap();
        assert_eq!(
            scope.get::<String>("seed").unwrap(),
            Some("value".to_string())
        );
    }

    // The mutual-exclusion property: 100 concurrent writers, each setting a
    // distinct key through its own LockedCache scope, end up with exactly the
    // union and no lost updates. Short poll/backoff keeps the serialized
    // acquisitions inside a reasonable wall time.
    #[test]
    #[serial]
    fn concurrent_scopes_lose_no_writes() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("cache.json");
        let lock_path = temp.path().join(".lock");

        let threads: Vec<_> = (0..100)
            .map(|i| {
                let cache_path = cache_path.clone();
                let lock_path = lock_path.clone();
                std::thread::spawn(move || {
                    let mut cache = fast(LockedCache::open(&cache_path, &lock_path));
                    let mut scope = cache.scope().unwrap();
                    scope.set(i.to_string(), i).unwrap();
                    scope.commit().unwrap();
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }

        assert!(!lock_path.exists());

        let mut cache = Cache::open(&cache_path).unwrap();
        assert_eq!(cache.len(), 100);
        for i in 0..100 {
            assert_eq!(cache.get::<i64>(&i.to_string()).unwrap(), Some(i));
        }
    }
}

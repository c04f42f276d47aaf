use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

/// Per-key mutual exclusion.
///
/// Callers holding the same key run one at a time; different keys never
/// block each other beyond the brief map lookup. An entry lives only while
/// some caller holds or waits on it.
pub struct KeyLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the key map, recovering from a poisoned Mutex if necessary.
    fn lock_map(&self) -> MutexGuard<'_, HashMap<K, Arc<Mutex<()>>>> {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` while holding the lock for `key`.
    ///
    /// The entry is released even if `f` panics.
    pub fn with_lock<R>(&self, key: &K, f: impl FnOnce() -> R) -> R {
        let entry = {
            let mut map = self.lock_map();
            Arc::clone(
                map.entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let release = Release {
            locks: self,
            key,
            entry,
        };

        let _guard = release
            .entry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f()
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drops the map entry for `key` once the last holder is done.
struct Release<'a, K: Eq + Hash + Clone> {
    locks: &'a KeyLocks<K>,
    key: &'a K,
    entry: Arc<Mutex<()>>,
}

impl<K: Eq + Hash + Clone> Drop for Release<'_, K> {
    fn drop(&mut self) {
        // Counts only change under the map lock: 2 means the map and us.
        let mut map = self.locks.lock_map();
        if Arc::strong_count(&self.entry) == 2 {
            map.remove(self.key);
        }
    }
}

impl<K: Eq + Hash + Clone> Default for KeyLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn same_key_runs_one_at_a_time() {
        let locks: KeyLocks<String> = KeyLocks::new();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);
        let key = "bucket".to_string();

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        locks.with_lock(&key, || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            thread::yield_now();
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn entries_are_dropped_after_use() {
        let locks: KeyLocks<u32> = KeyLocks::new();
        let value = locks.with_lock(&7, || {
            assert_eq!(locks.len(), 1);
            42
        });
        assert_eq!(value, 42);
        assert!(locks.is_empty());
    }

    #[test]
    fn entry_is_released_when_the_closure_panics() {
        let locks: KeyLocks<u32> = KeyLocks::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            locks.with_lock(&3, || panic!("merge blew up"))
        }));
        assert!(outcome.is_err());
        assert!(locks.is_empty());

        // the key is usable again afterwards
        assert_eq!(locks.with_lock(&3, || 1), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn different_keys_do_not_block_each_other() {
        let locks: KeyLocks<u32> = KeyLocks::new();
        let nested = locks.with_lock(&1, || locks.with_lock(&2, || "ok"));
        assert_eq!(nested, "ok");
        assert!(locks.is_empty());
    }
}

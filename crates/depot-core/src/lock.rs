//! Process-wide read/write locks keyed by canonical path.
//!
//! Every caller resolving the same key gets the same lock instance, so
//! metadata read-modify-write cycles on one document serialize while
//! unrelated documents proceed concurrently.

use crate::vfs::VirtualPath;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use tokio::sync::RwLock;

/// A shared lock entry. Hold the `Arc` for as long as the guard is needed.
pub type PathLock = Arc<RwLock<()>>;

/// Entries are only dropped once nobody holds them; the table is swept when
/// it doubles in size since the last sweep.
const MIN_PRUNE_THRESHOLD: usize = 64;

static GLOBAL: OnceLock<PathLockRegistry> = OnceLock::new();

#[derive(Debug)]
struct Entries {
    locks: HashMap<String, Weak<RwLock<()>>>,
    prune_at: usize,
}

/// Registry of path locks.
#[derive(Debug)]
pub struct PathLockRegistry {
    entries: Mutex<Entries>,
}

impl Default for PathLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PathLockRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                locks: HashMap::new(),
                prune_at: MIN_PRUNE_THRESHOLD,
            }),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    /// Canonical lock key of a virtual path: `storage:repository/relative`.
    pub fn key_for(path: &VirtualPath) -> String {
        format!("{}/{}", path.file_system().key(), path.relative())
    }

    /// The lock for `key`, created on first use.
    ///
    /// Lookup and insertion happen under one mutex, so two racing first
    /// callers always end up with the same instance.
    pub fn lock(&self, key: &str) -> PathLock {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = entries.locks.get(key).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(RwLock::new(()));
        entries.locks.insert(key.to_string(), Arc::downgrade(&lock));
        if entries.locks.len() >= entries.prune_at {
            entries.locks.retain(|_, weak| weak.strong_count() > 0);
            entries.prune_at = (entries.locks.len() * 2).max(MIN_PRUNE_THRESHOLD);
        }
        lock
    }

    /// The lock for a virtual path.
    pub fn lock_path(&self, path: &VirtualPath) -> PathLock {
        self.lock(&Self::key_for(path))
    }

    /// Drop entries no caller holds any more. Returns the number removed.
    pub fn prune(&self) -> usize {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = entries.locks.len();
        entries.locks.retain(|_, weak| weak.strong_count() > 0);
        before - entries.locks.len()
    }

    /// Number of table entries, including ones not yet pruned.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .locks
            .len()
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn same_key_same_instance() {
        let registry = PathLockRegistry::new();
        let a = registry.lock("s:r/org/lib");
        let b = registry.lock("s:r/org/lib");
        let c = registry.lock("s:r/org/other");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn unreferenced_entries_are_pruned() {
        let registry = PathLockRegistry::new();
        let held = registry.lock("held");
        drop(registry.lock("released"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.prune(), 1);
        assert!(Arc::ptr_eq(&held, &registry.lock("held")));
    }

    #[test]
    fn table_stays_bounded() {
        let registry = PathLockRegistry::new();
        for i in 0..10_000 {
            drop(registry.lock(&format!("key-{i}")));
        }
        assert!(registry.len() <= MIN_PRUNE_THRESHOLD);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_are_mutually_exclusive() {
        let registry = Arc::new(PathLockRegistry::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            tasks.push(tokio::spawn(async move {
                let lock = registry.lock("s:r/org/example/lib");
                let _guard = lock.write().await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn read_modify_write_never_loses_updates() {
        let registry = Arc::new(PathLockRegistry::new());
        let document = Arc::new(std::sync::Mutex::new(Vec::<usize>::new()));

        let mut tasks = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            let document = Arc::clone(&document);
            tasks.push(tokio::spawn(async move {
                let lock = registry.lock("doc");
                let _guard = lock.write().await;
                let mut snapshot = document.lock().unwrap().clone();
                tokio::task::yield_now().await;
                snapshot.push(i);
                *document.lock().unwrap() = snapshot;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let mut merged = document.lock().unwrap().clone();
        merged.sort_unstable();
        assert_eq!(merged, (0..32).collect::<Vec<_>>());
    }
}

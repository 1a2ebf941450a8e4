use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard returned by [`PathLocks::acquire`]. Dropping it, on any exit path,
/// unblocks the next waiter for the same path in arrival order.
pub struct PathGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Asynchronous mutual exclusion keyed by filesystem path.
///
/// At most one holder per distinct path value at a time; callers for
/// different paths never block each other. Waiting yields to the scheduler
/// (tokio's mutex queues waiters FIFO). Lock objects are created lazily and
/// held only via `Weak` in the registry, so paths that are no longer
/// held or waited on are reclaimed rather than leaking.
pub struct PathLocks {
    registry: Mutex<HashMap<PathBuf, Weak<AsyncMutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, path: &Path) -> PathGuard {
        let lock = self.lock_for(path);
        PathGuard {
            _guard: lock.lock_owned().await,
        }
    }

    fn lock_for(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut registry = match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = registry.get(path).and_then(Weak::upgrade) {
            return existing;
        }
        // Sweep dead entries while we already hold the registry lock.
        registry.retain(|_, weak| weak.strong_count() > 0);

        let lock = Arc::new(AsyncMutex::new(()));
        registry.insert(path.to_path_buf(), Arc::downgrade(&lock));
        lock
    }

    /// Number of live lock entries, for tests and diagnostics.
    pub fn live_locks(&self) -> usize {
        let registry = match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        registry
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl Default for PathLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_path_is_exclusive() {
        let locks = Arc::new(PathLocks::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(Path::new("/tmp/state.json")).await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_paths_do_not_block() {
        let locks = PathLocks::new();
        let _a = locks.acquire(Path::new("/tmp/a.json")).await;
        // Must not deadlock: distinct path, distinct lock.
        let _b = locks.acquire(Path::new("/tmp/b.json")).await;
    }

    #[tokio::test]
    async fn released_locks_are_reclaimed() {
        let locks = PathLocks::new();
        {
            let _guard = locks.acquire(Path::new("/tmp/a.json")).await;
            assert_eq!(locks.live_locks(), 1);
        }
        // Guard dropped: the Weak in the registry is dead.
        assert_eq!(locks.live_locks(), 0);
    }
}

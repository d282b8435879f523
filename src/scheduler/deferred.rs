//! Run-once, key-deduplicated delayed work
//!
//! Each scheduled task gets its own timer thread. The registry maps a key to
//! the id of its pending task; scheduling a key that is already pending is a
//! no-op, and the entry removes itself once the task has run. Cancelling only
//! removes the entry: the timer still wakes up, sees that it no longer owns
//! the key and returns without running the task.

use log::warn;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Registry<K> = Arc<Mutex<HashMap<K, u64>>>;

pub struct DeferredTasks<K> {
    pending: Registry<K>,
    next_id: AtomicU64,
}

impl<K> DeferredTasks<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Run `task` after `delay` unless `key` already has a pending task.
    ///
    /// Returns false when nothing was scheduled.
    pub fn schedule<F>(&self, key: K, delay: Duration, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let id = {
            let mut pending = self.pending.lock();
            if pending.contains_key(&key) {
                return false;
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            pending.insert(key.clone(), id);
            id
        };

        let guard = PendingEntry {
            registry: Arc::clone(&self.pending),
            key,
            id,
        };

        let spawned = thread::Builder::new()
            .name("deferred-task".to_string())
            .spawn(move || {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                if guard.is_current() {
                    task();
                }
                drop(guard);
            });

        match spawned {
            Ok(_) => true,
            // The dropped closure releases the entry through its guard
            Err(e) => {
                warn!("Failed to start deferred task: {}", e);
                false
            }
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Forget the pending task for `key`; returns whether one was pending
    pub fn cancel(&self, key: &K) -> bool {
        self.pending.lock().remove(key).is_some()
    }

    /// Block until no task is pending or `timeout` elapses
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending_count() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl<K> Default for DeferredTasks<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes its registry entry on drop, including when the task panics
struct PendingEntry<K: Eq + Hash> {
    registry: Registry<K>,
    key: K,
    id: u64,
}

impl<K: Eq + Hash> PendingEntry<K> {
    fn is_current(&self) -> bool {
        self.registry.lock().get(&self.key) == Some(&self.id)
    }
}

impl<K: Eq + Hash> Drop for PendingEntry<K> {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        if registry.get(&self.key) == Some(&self.id) {
            registry.remove(&self.key);
        }
    }
}

//! Time-based reuse and throttling
//!
//! Both primitives read time from a `Clock` so tests can drive expiry with a
//! `ManualClock` instead of sleeping.

use super::clock::Clock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Map whose entries expire `ttl` after they were inserted
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: HashMap<K, (Instant, V)>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: HashMap::new(),
        }
    }

    /// Cached value for `key`, or the result of `f` stored for the next `ttl`
    pub fn get_or_insert_with(&mut self, key: K, f: impl FnOnce() -> V) -> V {
        match self.get_or_try_insert_with(key, || Ok::<V, std::convert::Infallible>(f())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like `get_or_insert_with`; a failed `f` leaves nothing cached
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: K,
        f: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        let now = self.clock.now();

        if let Some((inserted, value)) = self.entries.get(&key) {
            if now.duration_since(*inserted) < self.ttl {
                return Ok(value.clone());
            }
        }

        let value = f()?;
        self.entries.insert(key, (now, value.clone()));
        Ok(value)
    }

    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Lets a caller through at most once per interval
pub struct RateGate {
    interval: Duration,
    clock: Arc<dyn Clock>,
    last_pass: Option<Instant>,
}

impl RateGate {
    pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval,
            clock,
            last_pass: None,
        }
    }

    /// True on the first call and then once `interval` has elapsed since the
    /// last call that returned true
    pub fn try_pass(&mut self) -> bool {
        let now = self.clock.now();
        match self.last_pass {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_pass = Some(now);
                true
            }
        }
    }
}

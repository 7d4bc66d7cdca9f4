use crate::clock::{Clock, SystemClock};
use crate::error::BackendError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A counter value together with the time left before the store expires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredCounter {
    /// Requests observed in the current window.
    pub value: u64,
    /// Time remaining until the entry expires.
    pub ttl: Duration,
}

/// Key-value storage capability required by the window-counter strategy.
///
/// Modelled on expiring KV stores: reads report the remaining TTL, writes set one. Whether a
/// write is atomic with respect to a concurrent read is up to the backend.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the counter stored at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<StoredCounter>, BackendError>;

    /// Write `value` at `key`, expiring after `ttl`.
    async fn put(&self, key: &str, value: u64, ttl: Duration) -> Result<(), BackendError>;
}

/// Minimum gap between two sweeps of expired entries.
const SWEEP_INTERVAL_MILLIS: u64 = 1_000;

/// Simple in-memory expiring store.
///
/// Expired entries are dropped when read, and swept from the whole map on a write once the
/// earliest known expiry has passed (at most once per second). Clones share the same map.
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    entries: Arc<Mutex<Entries>>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Default)]
struct Entries {
    // key -> (value, expires_at_millis)
    map: HashMap<String, (u64, u64)>,
    next_sweep_at: Option<u64>,
}

impl Entries {
    fn sweep(&mut self, now: u64) {
        self.map.retain(|_, (_, expires_at)| *expires_at > now);
        self.next_sweep_at = self
            .map
            .values()
            .map(|(_, expires_at)| *expires_at)
            .min()
            .map(|earliest| earliest.max(now.saturating_add(SWEEP_INTERVAL_MILLIS)));
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Use a custom clock for expiry, e.g. [`ManualClock`](crate::clock::ManualClock) in tests.
    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self { entries: Arc::default(), clock: Arc::new(clock) }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        let guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        guard.map.values().filter(|(_, expires_at)| *expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoredCounter>, BackendError> {
        let now = self.clock.now_millis();
        let mut guard = self.entries.lock().map_err(|_| BackendError::Poisoned)?;
        match guard.map.get(key).copied() {
            Some((value, expires_at)) if expires_at > now => {
                Ok(Some(StoredCounter { value, ttl: Duration::from_millis(expires_at - now) }))
            }
            Some(_) => {
                guard.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: u64, ttl: Duration) -> Result<(), BackendError> {
        let now = self.clock.now_millis();
        let expires_at = now.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        let mut guard = self.entries.lock().map_err(|_| BackendError::Poisoned)?;
        if guard.next_sweep_at.is_some_and(|at| at <= now) {
            let before = guard.map.len();
            guard.sweep(now);
            tracing::trace!(
                target: "tollgate::store",
                evicted = before - guard.map.len(),
                "swept expired entries"
            );
        }
        guard.map.insert(key.to_string(), (value, expires_at));
        let candidate = expires_at.max(now.saturating_add(SWEEP_INTERVAL_MILLIS));
        guard.next_sweep_at = Some(guard.next_sweep_at.map_or(candidate, |at| at.min(candidate)));
        Ok(())
    }
}

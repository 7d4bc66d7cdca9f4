//! Window counting primitives.
//!
//! A [`WindowCounter`] maps one hit on a storage key to a [`WindowOutcome`]. The window-counter
//! strategy treats it as a black box, so tests and alternative backends can swap it out.
//!
//! [`FixedWindow`] is the default:
//! - first hit on a key stores `1` with a TTL of `period`;
//! - later hits before expiry increment and rewrite with the entry's remaining TTL, so the
//!   window never slides;
//! - `reset` is the time left in the window, or with `interval > 0` the time left until the
//!   next sub-interval boundary counted from window start (capped at window end).
//!
//! Invariants:
//! - `remaining <= limit`, and `remaining == 0` whenever `success` is false.
//! - `1 <= reset <= period` for every fresh or live window.

use crate::error::BackendError;
use crate::store::KvStore;
use async_trait::async_trait;
use std::time::Duration;

/// Result of counting one request against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    /// Whether the request is within the limit.
    pub success: bool,
    /// Requests left in the window.
    pub remaining: u64,
    /// Seconds until the caller should expect capacity again.
    pub reset: u64,
}

/// Validated numeric policy for one window-counter middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    /// Requests allowed per window. Always >= 1.
    pub limit: u64,
    /// Window length in seconds. Always >= 60.
    pub period: u64,
    /// Sub-interval length in seconds; 0 disables rounding. Never exceeds `period`.
    pub interval: u64,
}

/// Counting primitive consulted once per keyed request.
#[async_trait]
pub trait WindowCounter: Send + Sync {
    /// Record a hit on `key` and report the decision.
    async fn hit(
        &self,
        store: &dyn KvStore,
        key: &str,
        policy: &WindowPolicy,
    ) -> Result<WindowOutcome, BackendError>;
}

/// Fixed-window counter over a [`KvStore`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedWindow;

#[async_trait]
impl WindowCounter for FixedWindow {
    async fn hit(
        &self,
        store: &dyn KvStore,
        key: &str,
        policy: &WindowPolicy,
    ) -> Result<WindowOutcome, BackendError> {
        let period = Duration::from_secs(policy.period);
        let (count, ttl) = match store.get(key).await? {
            Some(entry) if !entry.ttl.is_zero() => {
                (entry.value.saturating_add(1), entry.ttl.min(period))
            }
            _ => (1, period),
        };
        store.put(key, count, ttl).await?;

        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let reset = reset_after(policy, ttl_millis);

        if count <= policy.limit {
            Ok(WindowOutcome { success: true, remaining: policy.limit - count, reset })
        } else {
            Ok(WindowOutcome { success: false, remaining: 0, reset })
        }
    }
}

/// Seconds until reset for a window with `ttl_millis` left.
pub fn reset_after(policy: &WindowPolicy, ttl_millis: u64) -> u64 {
    let period_millis = policy.period.saturating_mul(1_000);
    let ttl_millis = ttl_millis.min(period_millis);
    if policy.interval == 0 {
        return ceil_secs(ttl_millis);
    }

    let interval_millis = policy.interval.saturating_mul(1_000);
    let elapsed = period_millis - ttl_millis;
    let boundary =
        (elapsed / interval_millis).saturating_add(1).saturating_mul(interval_millis).min(period_millis);
    ceil_secs(boundary - elapsed)
}

fn ceil_secs(millis: u64) -> u64 {
    millis / 1_000 + u64::from(millis % 1_000 != 0)
}

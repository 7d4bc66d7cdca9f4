//! Outcome handlers and their defaults.
//!
//! Success handlers run after the inner service on every exit path and only shape the
//! response; they never see or alter an inner failure. Error handlers turn a refused
//! decision into a [`Rejection`].

use crate::context::RequestContext;
use crate::error::Rejection;
use http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use http::HeaderMap;
use std::sync::Arc;

/// Configured request limit.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Requests left in the current window.
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Unix timestamp (seconds) at which capacity returns.
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Success handler for the service-backed strategy.
pub type ServiceSuccessHandler = Arc<dyn Fn(&mut RequestContext) + Send + Sync>;
/// Error handler for the service-backed strategy.
pub type ServiceErrorHandler = Arc<dyn Fn(&mut RequestContext) -> Rejection + Send + Sync>;
/// Success handler for the window-counter strategy: `(ctx, limit, remaining, reset)`.
pub type WindowSuccessHandler = Arc<dyn Fn(&mut RequestContext, u64, u64, u64) + Send + Sync>;
/// Error handler for the window-counter strategy: `(ctx, limit, remaining, reset)`.
pub type WindowErrorHandler =
    Arc<dyn Fn(&mut RequestContext, u64, u64, u64) -> Rejection + Send + Sync>;

/// Default service success handler: does nothing.
pub fn service_success(_ctx: &mut RequestContext) {}

/// Default service error handler: bare 429.
pub fn service_error(_ctx: &mut RequestContext) -> Rejection {
    Rejection::too_many_requests()
}

/// Default window success handler: sets the three `X-RateLimit-*` headers.
pub fn window_success(ctx: &mut RequestContext, limit: u64, remaining: u64, reset: u64) {
    let headers = rate_limit_headers(ctx.now_secs(), limit, remaining, reset);
    ctx.set_headers(headers.into_iter().filter_map(|(name, value)| Some((name?, value))));
}

/// Default window error handler: 429 with the `X-RateLimit-*` headers and `Retry-After`.
pub fn window_error(ctx: &mut RequestContext, limit: u64, remaining: u64, reset: u64) -> Rejection {
    let mut headers = rate_limit_headers(ctx.now_secs(), limit, remaining, reset);
    headers.insert(RETRY_AFTER, HeaderValue::from(reset));
    Rejection::too_many_requests().with_headers(headers)
}

/// Build `X-RateLimit-Limit`, `X-RateLimit-Remaining`, and `X-RateLimit-Reset` (absolute,
/// `now_secs + reset`).
pub fn rate_limit_headers(now_secs: u64, limit: u64, remaining: u64, reset: u64) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(4);
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(now_secs.saturating_add(reset)));
    headers
}

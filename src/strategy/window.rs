//! Window-counter strategy: count hits against a key-value store binding.

use super::{Admission, DecisionError, Settle};
use crate::binding::{require_store, resolve};
use crate::context::RequestContext;
use crate::options::WindowConfig;

pub(crate) async fn admit(
    config: &WindowConfig,
    ctx: &mut RequestContext,
    key: &str,
) -> Result<Admission, DecisionError> {
    let resolved = resolve(&config.binding, ctx).await;
    let store = require_store(&config.binding, resolved)?;

    let storage_key = config.storage_key(key);
    let outcome = config.counter.hit(store.as_ref(), &storage_key, &config.policy).await?;
    let limit = config.policy.limit;
    tracing::debug!(
        target: "tollgate::strategy",
        key = %storage_key,
        success = outcome.success,
        remaining = outcome.remaining,
        reset = outcome.reset,
        "window decision"
    );

    if outcome.success {
        Ok(Admission::Allow(Settle::Window {
            handler: config.success_handler.clone(),
            limit,
            remaining: outcome.remaining,
            reset: outcome.reset,
        }))
    } else {
        Ok(Admission::Deny((config.error_handler)(ctx, limit, outcome.remaining, outcome.reset)))
    }
}

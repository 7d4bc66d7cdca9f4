//! Service-backed strategy: the limiter binding owns all accounting.

use super::{Admission, DecisionError, Settle};
use crate::binding::{require_limiter, resolve, LimitRequest};
use crate::context::RequestContext;
use crate::options::ServiceConfig;

pub(crate) async fn admit(
    config: &ServiceConfig,
    ctx: &mut RequestContext,
    key: &str,
) -> Result<Admission, DecisionError> {
    let resolved = resolve(&config.binding, ctx).await;
    let limiter = require_limiter(&config.binding, resolved)?;

    let response = limiter.limit(LimitRequest { key: key.to_string() }).await?;
    tracing::debug!(target: "tollgate::strategy", key, success = response.success, "limiter decision");

    if response.success {
        Ok(Admission::Allow(Settle::Service(config.success_handler.clone())))
    } else {
        Ok(Admission::Deny((config.error_handler)(ctx)))
    }
}

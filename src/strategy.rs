//! Decision strategies.
//!
//! The set is closed: a middleware instance runs exactly one [`Strategy`], picked at
//! construction. Both variants share the same shape:
//! - resolve the binding and check its capability;
//! - ask the backend for a decision on the derived key;
//! - on refusal, run the error handler right away and return [`Admission::Deny`];
//! - on success, return [`Admission::Allow`] carrying a [`Settle`] that the middleware runs
//!   after the inner service on every exit path.

use crate::binding::BindingError;
use crate::clock::Clock;
use crate::context::RequestContext;
use crate::error::{AdmissionError, BackendError, Rejection};
use crate::handlers::{ServiceSuccessHandler, WindowSuccessHandler};
use crate::key::KeyGenerator;
use crate::options::{ServiceConfig, WindowConfig};
use std::sync::Arc;

pub mod service;
pub mod window;

/// The decision strategy configured for one middleware instance.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Delegate the decision to a limiter service binding.
    Service(ServiceConfig),
    /// Count hits in a fixed window against a key-value store binding.
    Window(WindowConfig),
}

impl Strategy {
    pub(crate) fn key_generator(&self) -> &KeyGenerator {
        match self {
            Strategy::Service(config) => &config.key_generator,
            Strategy::Window(config) => &config.key_generator,
        }
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        match self {
            Strategy::Service(config) => config.clock.clone(),
            Strategy::Window(config) => config.clock.clone(),
        }
    }

    /// Decide on `key` for the request described by `ctx`.
    pub(crate) async fn admit(
        &self,
        ctx: &mut RequestContext,
        key: &str,
    ) -> Result<Admission, DecisionError> {
        match self {
            Strategy::Service(config) => service::admit(config, ctx, key).await,
            Strategy::Window(config) => window::admit(config, ctx, key).await,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Strategy::Service(_) => "service",
            Strategy::Window(_) => "window",
        }
    }
}

/// Verdict for one keyed request.
pub(crate) enum Admission {
    Allow(Settle),
    Deny(Rejection),
}

/// Deferred success-handler invocation.
pub(crate) enum Settle {
    Service(ServiceSuccessHandler),
    Window { handler: WindowSuccessHandler, limit: u64, remaining: u64, reset: u64 },
}

impl Settle {
    pub(crate) fn run(self, ctx: &mut RequestContext) {
        match self {
            Settle::Service(handler) => handler(ctx),
            Settle::Window { handler, limit, remaining, reset } => {
                handler(ctx, limit, remaining, reset)
            }
        }
    }
}

/// Failures that stop a decision from being made at all.
#[derive(Debug)]
pub(crate) enum DecisionError {
    Binding(BindingError),
    Backend(BackendError),
}

impl From<BindingError> for DecisionError {
    fn from(e: BindingError) -> Self {
        DecisionError::Binding(e)
    }
}

impl From<BackendError> for DecisionError {
    fn from(e: BackendError) -> Self {
        DecisionError::Backend(e)
    }
}

impl<E> From<DecisionError> for AdmissionError<E> {
    fn from(e: DecisionError) -> Self {
        match e {
            DecisionError::Binding(e) => AdmissionError::Binding(e),
            DecisionError::Backend(e) => AdmissionError::Backend(e),
        }
    }
}

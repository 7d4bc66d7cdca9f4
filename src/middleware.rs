use crate::context::RequestContext;
use crate::error::AdmissionError;
use crate::key::derive_key;
use crate::options::{ConfigError, ServiceOptions, WindowOptions};
use crate::strategy::{Admission, Settle, Strategy};
use futures::future::BoxFuture;
use http::{HeaderMap, Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that admits or rejects requests using one decision [`Strategy`].
///
/// Construction validates the options once; the resulting config is shared read-only by
/// every service the layer produces.
#[derive(Clone, Debug)]
pub struct AdmissionLayer {
    strategy: Arc<Strategy>,
}

impl AdmissionLayer {
    /// Rate limit through an external limiter service binding.
    pub fn service(options: ServiceOptions) -> Result<Self, ConfigError> {
        Ok(Self::from_strategy(Strategy::Service(options.validate()?)))
    }

    /// Rate limit with a fixed window counted in a key-value store binding.
    pub fn window(options: WindowOptions) -> Result<Self, ConfigError> {
        Ok(Self::from_strategy(Strategy::Window(options.validate()?)))
    }

    pub fn from_strategy(strategy: Strategy) -> Self {
        Self { strategy: Arc::new(strategy) }
    }

    /// The validated strategy this layer runs.
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService { inner: service, strategy: self.strategy.clone() }
    }
}

/// Middleware service that gates its inner service on an admission decision.
#[derive(Clone, Debug)]
pub struct AdmissionService<S> {
    inner: S,
    strategy: Arc<Strategy>,
}

impl<S> AdmissionService<S> {
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AdmissionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = AdmissionError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdmissionError::Inner)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let strategy = self.strategy.clone();
        // Keep the instance that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut ctx = RequestContext::from_request(&req, strategy.clock());

            let Some(key) = derive_key(strategy.key_generator(), &ctx) else {
                tracing::trace!(target: "tollgate::middleware", "no rate-limit key; bypassing");
                return inner.call(req).await.map_err(AdmissionError::Inner);
            };

            let admission = match strategy.admit(&mut ctx, &key).await {
                Ok(admission) => admission,
                Err(e) => {
                    let e = AdmissionError::from(e);
                    match &e {
                        AdmissionError::Binding(err) => tracing::warn!(
                            target: "tollgate::middleware",
                            strategy = strategy.name(),
                            error = %err,
                            "binding unusable; request not processed"
                        ),
                        AdmissionError::Backend(err) => tracing::warn!(
                            target: "tollgate::middleware",
                            strategy = strategy.name(),
                            error = %err,
                            "rate limit backend failed"
                        ),
                        _ => {}
                    }
                    return Err(e);
                }
            };

            match admission {
                Admission::Deny(rejection) => {
                    let rejection = rejection.with_queued_headers(ctx.take_response_headers());
                    tracing::debug!(
                        target: "tollgate::middleware",
                        strategy = strategy.name(),
                        key = %key,
                        status = rejection.status().as_u16(),
                        "request rejected"
                    );
                    Err(AdmissionError::Rejected(rejection))
                }
                Admission::Allow(settle) => {
                    let guard = SettleGuard::new(ctx, settle);
                    let result = inner.call(req).await;
                    let headers = guard.settle();
                    match result {
                        Ok(mut response) => {
                            response.headers_mut().extend(headers);
                            Ok(response)
                        }
                        Err(e) => Err(AdmissionError::Inner(e)),
                    }
                }
            }
        })
    }
}

/// Runs the success handler exactly once: explicitly via [`SettleGuard::settle`], or on drop if
/// the inner call panicked or the request future was dropped mid-call.
struct SettleGuard {
    pending: Option<(RequestContext, Settle)>,
}

impl SettleGuard {
    fn new(ctx: RequestContext, settle: Settle) -> Self {
        Self { pending: Some((ctx, settle)) }
    }

    /// Run the handler and return the response headers it queued.
    fn settle(mut self) -> HeaderMap {
        match self.pending.take() {
            Some((mut ctx, settle)) => {
                settle.run(&mut ctx);
                ctx.take_response_headers()
            }
            None => HeaderMap::new(),
        }
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if let Some((mut ctx, settle)) = self.pending.take() {
            tracing::debug!(
                target: "tollgate::middleware",
                "inner call did not complete; running success handler on drop"
            );
            settle.run(&mut ctx);
        }
    }
}

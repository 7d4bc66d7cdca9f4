//! Bindings: live handles to the limiter service or store, obtained per request.
//!
//! A [`BindingRef`] is configured once; [`resolve`] turns it into a [`Binding`] for every
//! keyed request. Nothing is cached between requests. Capability checks happen in the
//! strategies through [`require_limiter`] and [`require_store`].

use crate::context::RequestContext;
use crate::error::BackendError;
use crate::store::KvStore;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Argument to a limiter service's decision call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitRequest {
    /// The rate-limit key derived for this request.
    pub key: String,
}

/// A limiter service's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitResponse {
    /// `true` when the request may proceed.
    pub success: bool,
}

/// Decision capability of an external limiter service.
///
/// Quota, remaining count, and reset time all live inside the service.
#[async_trait]
pub trait LimiterBinding: Send + Sync {
    async fn limit(&self, request: LimitRequest) -> Result<LimitResponse, BackendError>;
}

/// A resolved binding and the capability it offers.
#[derive(Clone)]
pub enum Binding {
    /// A limiter service with a single decision call.
    Limiter(Arc<dyn LimiterBinding>),
    /// An expiring key-value store.
    Store(Arc<dyn KvStore>),
}

impl Binding {
    pub fn limiter<L: LimiterBinding + 'static>(limiter: L) -> Self {
        Self::Limiter(Arc::new(limiter))
    }

    pub fn store<S: KvStore + 'static>(store: S) -> Self {
        Self::Store(Arc::new(store))
    }

    /// Capability name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Limiter(_) => LIMITER,
            Self::Store(_) => STORE,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binding::{}", self.kind())
    }
}

const LIMITER: &str = "limiter";
const STORE: &str = "store";

/// Factory invoked with the request context to produce a binding.
pub type BindingFactory =
    Arc<dyn Fn(&RequestContext) -> BoxFuture<'static, Option<Binding>> + Send + Sync>;

/// How to find the binding for a request: a name in the request's [`Env`](crate::Env), or a
/// factory.
#[derive(Clone)]
pub enum BindingRef {
    Named(String),
    Factory(BindingFactory),
}

impl BindingRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Wrap an async factory. It may look things up in the context, build a client, or return
    /// `None`.
    pub fn factory<F, Fut>(factory: F) -> Self
    where
        F: Fn(&RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Binding>> + Send + 'static,
    {
        Self::Factory(Arc::new(
            move |ctx: &RequestContext| -> BoxFuture<'static, Option<Binding>> {
                Box::pin(factory(ctx))
            },
        ))
    }

    /// Label used in errors and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Named(name) => name.clone(),
            Self::Factory(_) => "<factory>".to_string(),
        }
    }
}

impl fmt::Debug for BindingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Factory(_) => f.write_str("Factory(<factory>)"),
        }
    }
}

impl From<&str> for BindingRef {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for BindingRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

/// Binding-usage errors: the configuration points at something unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    /// The reference resolved to nothing.
    #[error("binding `{binding}` did not resolve to a value")]
    Unresolved {
        /// Name of the binding, or `<factory>`.
        binding: String,
    },
    /// The binding exists but does not offer the capability the strategy needs.
    #[error("binding `{binding}` is a {found}, but a {expected} is required")]
    MissingCapability {
        binding: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Resolve `binding` for the current request.
pub async fn resolve(binding: &BindingRef, ctx: &RequestContext) -> Option<Binding> {
    match binding {
        BindingRef::Named(name) => ctx.env().get(name),
        BindingRef::Factory(factory) => factory(ctx).await,
    }
}

/// Require a limiter capability from a resolved binding.
pub fn require_limiter(
    reference: &BindingRef,
    resolved: Option<Binding>,
) -> Result<Arc<dyn LimiterBinding>, BindingError> {
    match resolved {
        Some(Binding::Limiter(limiter)) => Ok(limiter),
        Some(other) => Err(BindingError::MissingCapability {
            binding: reference.describe(),
            expected: LIMITER,
            found: other.kind(),
        }),
        None => Err(BindingError::Unresolved { binding: reference.describe() }),
    }
}

/// Require a store capability from a resolved binding.
pub fn require_store(
    reference: &BindingRef,
    resolved: Option<Binding>,
) -> Result<Arc<dyn KvStore>, BindingError> {
    match resolved {
        Some(Binding::Store(store)) => Ok(store),
        Some(other) => Err(BindingError::MissingCapability {
            binding: reference.describe(),
            expected: STORE,
            found: other.kind(),
        }),
        None => Err(BindingError::Unresolved { binding: reference.describe() }),
    }
}

//! Convenient re-exports for common Tollgate types.
pub use crate::{
    binding::{Binding, BindingRef, LimitRequest, LimitResponse, LimiterBinding},
    context::{Env, RequestContext},
    counter::{WindowCounter, WindowOutcome, WindowPolicy},
    error::{AdmissionError, BackendError, Rejection},
    handlers::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET},
    middleware::AdmissionLayer,
    options::{ConfigError, ServiceOptions, WindowOptions},
    store::{InMemoryStore, KvStore},
};

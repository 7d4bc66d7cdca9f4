#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Tollgate
//!
//! Keyed request admission for Tower HTTP services. Each request is reduced to a rate-limit
//! key; a decision strategy then admits it or turns it away with a 429.
//!
//! ## Strategies
//!
//! - **Service-backed** ([`AdmissionLayer::service`]): asks an external limiter binding for a
//!   yes/no answer. All accounting lives in the service.
//! - **Window-counter** ([`AdmissionLayer::window`]): counts hits per key in a fixed window
//!   stored in a key-value binding, with optional sub-interval rounding of the reset time, and
//!   reports `X-RateLimit-*` headers.
//!
//! Bindings are looked up per request, by name in the [`Env`] request extension or through a
//! factory, and never cached.
//!
//! ## Quick Start
//!
//! ```rust
//! use http::{Request, Response};
//! use std::convert::Infallible;
//! use tollgate::{AdmissionLayer, Binding, Env, InMemoryStore, WindowOptions};
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let layer = AdmissionLayer::window(
//!     WindowOptions::new()
//!         .binding("RATE_LIMIT_KV")
//!         .key_generator(tollgate::key::from_header("x-api-key"))
//!         .limit(100)
//!         .period(60),
//! )
//! .unwrap();
//!
//! let svc = layer.layer(service_fn(|_req: Request<()>| async {
//!     Ok::<_, Infallible>(Response::new(()))
//! }));
//!
//! let mut req = Request::builder().header("x-api-key", "tenant-1").body(()).unwrap();
//! req.extensions_mut().insert(Env::new().with("RATE_LIMIT_KV", Binding::store(InMemoryStore::new())));
//!
//! let response = svc.oneshot(req).await.unwrap();
//! assert_eq!(response.headers()["x-ratelimit-remaining"], "99");
//! # });
//! ```

pub mod binding;
pub mod clock;
pub mod context;
pub mod counter;
pub mod error;
pub mod handlers;
pub mod key;
pub mod middleware;
pub mod options;
pub mod prelude;
pub mod store;
pub mod strategy;

// Re-exports
pub use binding::{Binding, BindingError, BindingRef, LimitRequest, LimitResponse, LimiterBinding};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{Env, RequestContext};
pub use counter::{FixedWindow, WindowCounter, WindowOutcome, WindowPolicy};
pub use error::{AdmissionError, BackendError, Rejection};
pub use middleware::{AdmissionLayer, AdmissionService};
pub use options::{
    ConfigError, RawNumber, ServiceConfig, ServiceOptions, WindowConfig, WindowOptions,
    WindowSettings,
};
pub use store::{InMemoryStore, KvStore, StoredCounter};
pub use strategy::Strategy;

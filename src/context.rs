//! Per-request context handed to key generators, binding factories, and handlers.

use crate::binding::Binding;
use crate::clock::Clock;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request, Uri};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Request-scoped registry of named bindings.
///
/// Hosts insert an `Env` into the request extensions; named binding references are looked up
/// here by exact name. Clones are cheap since bindings are reference counted.
#[derive(Clone, Default)]
pub struct Env {
    bindings: HashMap<String, Binding>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, binding: Binding) -> Self {
        self.insert(name, binding);
        self
    }

    /// Register `binding` under `name`, replacing any previous entry.
    pub fn insert(&mut self, name: impl Into<String>, binding: Binding) {
        let name = name.into();
        if self.bindings.contains_key(&name) {
            tracing::debug!(target: "tollgate::context", name = %name, "binding replaced");
        }
        self.bindings.insert(name, binding);
    }

    /// Look up a binding by exact name.
    pub fn get(&self, name: &str) -> Option<Binding> {
        self.bindings.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.bindings.keys().collect();
        names.sort();
        f.debug_struct("Env").field("bindings", &names).finish()
    }
}

/// What the middleware knows about the request in flight.
///
/// Response headers set through [`RequestContext::set_headers`] are merged into the inner
/// service's response once it completes.
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    env: Env,
    response_headers: HeaderMap,
    clock: Arc<dyn Clock>,
}

impl RequestContext {
    /// Snapshot the parts of `req` the middleware needs. The [`Env`] extension is cloned if
    /// present, otherwise the context starts with an empty one.
    pub fn from_request<B>(req: &Request<B>, clock: Arc<dyn Clock>) -> Self {
        let env = req.extensions().get::<Env>().cloned().unwrap_or_default();
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            headers: req.headers().clone(),
            env,
            response_headers: HeaderMap::new(),
            clock,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A request header as UTF-8, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The request-scoped binding registry.
    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Set several response headers at once, replacing earlier values of the same names.
    pub fn set_headers<I>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (HeaderName, HeaderValue)>,
    {
        for (name, value) in headers {
            self.response_headers.insert(name, value);
        }
    }

    /// Headers queued for the response so far.
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub(crate) fn take_response_headers(&mut self) -> HeaderMap {
        std::mem::take(&mut self.response_headers)
    }

    /// Current unix time in seconds, from the middleware's clock.
    pub fn now_secs(&self) -> u64 {
        self.clock.now_secs()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("env", &self.env)
            .field("response_headers", &self.response_headers)
            .finish()
    }
}

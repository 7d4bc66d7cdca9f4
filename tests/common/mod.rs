#![allow(dead_code)]

use async_trait::async_trait;
use http::{Request, Response};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tollgate::{
    BackendError, Binding, Env, KvStore, LimitRequest, LimitResponse, LimiterBinding,
    WindowCounter, WindowOutcome, WindowPolicy,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError(pub String);

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestError: {}", self.0)
    }
}

impl std::error::Error for TestError {}

/// Limiter that answers a fixed verdict and records the keys it saw.
#[derive(Clone, Default)]
pub struct ScriptedLimiter {
    pub allow: bool,
    pub keys: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLimiter {
    pub fn allowing() -> Self {
        Self { allow: true, ..Default::default() }
    }

    pub fn denying() -> Self {
        Self { allow: false, ..Default::default() }
    }

    pub fn seen(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl LimiterBinding for ScriptedLimiter {
    async fn limit(&self, request: LimitRequest) -> Result<LimitResponse, BackendError> {
        self.keys.lock().unwrap().push(request.key);
        Ok(LimitResponse { success: self.allow })
    }
}

/// Counting primitive that returns a canned outcome and records storage keys.
#[derive(Clone)]
pub struct CannedCounter {
    pub outcome: WindowOutcome,
    pub keys: Arc<Mutex<Vec<String>>>,
}

impl CannedCounter {
    pub fn new(success: bool, remaining: u64, reset: u64) -> Self {
        Self { outcome: WindowOutcome { success, remaining, reset }, keys: Arc::default() }
    }

    pub fn seen(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl WindowCounter for CannedCounter {
    async fn hit(
        &self,
        _store: &dyn KvStore,
        key: &str,
        _policy: &WindowPolicy,
    ) -> Result<WindowOutcome, BackendError> {
        self.keys.lock().unwrap().push(key.to_string());
        Ok(self.outcome)
    }
}

/// Store whose every operation fails.
pub struct BrokenStore;

#[async_trait]
impl KvStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<tollgate::StoredCounter>, BackendError> {
        Err(BackendError::Unavailable("connection refused".into()))
    }

    async fn put(
        &self,
        _key: &str,
        _value: u64,
        _ttl: std::time::Duration,
    ) -> Result<(), BackendError> {
        Err(BackendError::Unavailable("connection refused".into()))
    }
}

pub fn request(env: Env) -> Request<()> {
    let mut req = Request::builder().uri("/").header("x-api-key", "tenant-1").body(()).unwrap();
    req.extensions_mut().insert(env);
    req
}

pub fn env_with(name: &str, binding: Binding) -> Env {
    Env::new().with(name, binding)
}

/// Downstream handler that counts calls and succeeds.
pub fn counting_ok(
    calls: Arc<AtomicUsize>,
) -> impl Fn(Request<()>) -> futures::future::Ready<Result<Response<()>, TestError>> + Clone {
    move |_req| {
        calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Ok(Response::new(())))
    }
}

/// Downstream handler that counts calls and fails.
pub fn counting_err(
    calls: Arc<AtomicUsize>,
) -> impl Fn(Request<()>) -> futures::future::Ready<Result<Response<()>, TestError>> + Clone {
    move |_req| {
        calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Err(TestError("downstream exploded".into())))
    }
}

pub fn now_secs() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs()
}

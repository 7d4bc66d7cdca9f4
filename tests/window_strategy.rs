mod common;

use common::*;
use http::header::RETRY_AFTER;
use http::{Request, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tollgate::handlers::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};
use tollgate::{
    AdmissionLayer, Binding, Env, InMemoryStore, ManualClock, Rejection, RequestContext,
    WindowOptions,
};
use tower::{service_fn, Layer, ServiceExt};

fn api_key(ctx: &RequestContext) -> Option<String> {
    ctx.header("x-api-key").map(str::to_string)
}

fn options(counter: CannedCounter) -> WindowOptions {
    WindowOptions::new()
        .binding("KV")
        .key_generator(api_key)
        .limit(5)
        .period(60)
        .interval(0)
        .counter(counter)
}

fn kv_env() -> Env {
    env_with("KV", Binding::store(InMemoryStore::new()))
}

fn header_u64(value: &http::HeaderValue) -> u64 {
    value.to_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn refusal_returns_429_with_retry_after_and_reset() {
    let calls = Arc::new(AtomicUsize::new(0));
    let layer = AdmissionLayer::window(options(CannedCounter::new(false, 0, 5))).unwrap();
    let svc = layer.layer(service_fn(counting_ok(calls.clone())));

    let before = now_secs();
    let err = svc.oneshot(request(kv_env())).await.unwrap_err();

    let rejection = err.rejection().expect("rate limit rejection");
    assert_eq!(rejection.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(rejection.message(), "Too Many Requests");
    assert_eq!(rejection.headers()[RETRY_AFTER], "5");
    assert_eq!(rejection.headers()[X_RATELIMIT_LIMIT], "5");
    assert_eq!(rejection.headers()[X_RATELIMIT_REMAINING], "0");
    assert!(header_u64(&rejection.headers()[X_RATELIMIT_RESET]) >= before + 5);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "downstream must be skipped");
}

#[tokio::test]
async fn success_runs_downstream_once_and_sets_headers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = CannedCounter::new(true, 4, 10);
    let layer = AdmissionLayer::window(options(counter.clone())).unwrap();
    let svc = layer.layer(service_fn(counting_ok(calls.clone())));

    let before = now_secs();
    let response = svc.oneshot(request(kv_env())).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.headers()[X_RATELIMIT_LIMIT], "5");
    assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "4");
    assert!(header_u64(&response.headers()[X_RATELIMIT_RESET]) >= before + 10);
    assert!(response.headers().get(RETRY_AFTER).is_none());
    assert_eq!(counter.seen(), vec!["rl:tenant-1".to_string()]);
}

#[tokio::test]
async fn downstream_failure_still_runs_success_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));
    let handled_clone = handled.clone();
    let layer = AdmissionLayer::window(options(CannedCounter::new(true, 4, 10)).success_handler(
        move |_ctx, limit, remaining, reset| {
            assert_eq!((limit, remaining, reset), (5, 4, 10));
            handled_clone.fetch_add(1, Ordering::SeqCst);
        },
    ))
    .unwrap();
    let svc = layer.layer(service_fn(counting_err(calls.clone())));

    let err = svc.oneshot(request(kv_env())).await.unwrap_err();

    assert_eq!(handled.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.into_inner(), Some(TestError("downstream exploded".into())));
}

#[tokio::test]
async fn falsy_keys_bypass_without_resolving_binding() {
    let calls = Arc::new(AtomicUsize::new(0));
    let resolutions = Arc::new(AtomicUsize::new(0));
    let resolutions_clone = resolutions.clone();
    let layer = AdmissionLayer::window(
        WindowOptions::new()
            .binding_factory(move |_ctx| {
                resolutions_clone.fetch_add(1, Ordering::SeqCst);
                async { None }
            })
            .key_generator(|_ctx| Some(String::new()))
            .limit(1)
            .period(60),
    )
    .unwrap();
    let svc = layer.layer(service_fn(counting_ok(calls.clone())));

    let response = svc.oneshot(request(Env::new())).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(resolutions.load(Ordering::SeqCst), 0);
    assert!(response.headers().get(X_RATELIMIT_LIMIT).is_none());
}

#[tokio::test]
async fn missing_store_is_a_binding_error_not_a_429() {
    let calls = Arc::new(AtomicUsize::new(0));
    let layer = AdmissionLayer::window(options(CannedCounter::new(true, 4, 10))).unwrap();
    let svc = layer.layer(service_fn(counting_ok(calls.clone())));

    let err = svc.oneshot(request(Env::new())).await.unwrap_err();

    assert!(err.is_binding());
    assert!(err.rejection().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn limiter_binding_lacks_store_capability() {
    let layer = AdmissionLayer::window(options(CannedCounter::new(true, 4, 10))).unwrap();
    let svc = layer.layer(service_fn(counting_ok(Arc::default())));
    let env = env_with("KV", Binding::limiter(ScriptedLimiter::allowing()));

    let err = svc.oneshot(request(env)).await.unwrap_err();

    let message = err.binding_error().expect("binding error").to_string();
    assert!(message.contains("store is required"), "{message}");
}

#[tokio::test]
async fn store_failures_surface_as_backend_errors() {
    let layer = AdmissionLayer::window(
        WindowOptions::new().binding("KV").key_generator(api_key).limit(5).period(60),
    )
    .unwrap();
    let svc = layer.layer(service_fn(counting_ok(Arc::default())));

    let err = svc.oneshot(request(env_with("KV", Binding::store(BrokenStore)))).await.unwrap_err();

    assert!(err.is_backend());
    assert!(err.to_string().contains("connection refused"));
}

#[tokio::test]
async fn custom_error_handler_shapes_rejection() {
    let layer = AdmissionLayer::window(options(CannedCounter::new(false, 0, 30)).error_handler(
        |_ctx, limit, _remaining, reset| {
            Rejection::new(StatusCode::SERVICE_UNAVAILABLE, format!("{limit} per window; retry in {reset}s"))
        },
    ))
    .unwrap();
    let svc = layer.layer(service_fn(counting_ok(Arc::default())));

    let err = svc.oneshot(request(kv_env())).await.unwrap_err();
    let response: http::Response<String> = err.into_response().unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body(), "5 per window; retry in 30s");
}

#[tokio::test]
async fn queued_headers_are_kept_but_rejection_headers_win() {
    let layer = AdmissionLayer::window(options(CannedCounter::new(false, 0, 5)).error_handler(
        |ctx, limit, remaining, reset| {
            ctx.set_headers([
                (http::HeaderName::from_static("x-quota"), http::HeaderValue::from_static("exhausted")),
                (RETRY_AFTER, http::HeaderValue::from_static("999")),
            ]);
            tollgate::handlers::window_error(ctx, limit, remaining, reset)
        },
    ))
    .unwrap();
    let svc = layer.layer(service_fn(counting_ok(Arc::default())));

    let err = svc.oneshot(request(kv_env())).await.unwrap_err();
    let rejection = err.rejection().expect("rejection");

    assert_eq!(rejection.headers()["x-quota"], "exhausted");
    assert_eq!(rejection.headers()[RETRY_AFTER], "5");
    assert_eq!(rejection.headers().get_all(RETRY_AFTER).iter().count(), 1);
    assert_eq!(rejection.headers()[X_RATELIMIT_LIMIT], "5");
}

#[tokio::test]
async fn fixed_window_end_to_end_with_manual_clock() {
    let clock = ManualClock::new(1_700_000_000_000);
    let store = InMemoryStore::with_clock(clock.clone());
    let env = env_with("KV", Binding::store(store));
    let layer = AdmissionLayer::window(
        WindowOptions::new()
            .binding("KV")
            .key_generator(api_key)
            .limit(2)
            .period(60)
            .interval(20)
            .clock(clock.clone()),
    )
    .unwrap();
    let svc = layer.layer(service_fn(counting_ok(Arc::default())));

    let first = svc.clone().oneshot(request(env.clone())).await.unwrap();
    assert_eq!(first.headers()[X_RATELIMIT_REMAINING], "1");
    assert_eq!(first.headers()[X_RATELIMIT_RESET], "1700000020");

    clock.advance(Duration::from_secs(25));
    let second = svc.clone().oneshot(request(env.clone())).await.unwrap();
    assert_eq!(second.headers()[X_RATELIMIT_REMAINING], "0");
    assert_eq!(second.headers()[X_RATELIMIT_RESET], "1700000040");

    let third = svc.clone().oneshot(request(env.clone())).await.unwrap_err();
    let rejection = third.rejection().unwrap();
    assert_eq!(rejection.headers()[RETRY_AFTER], "15");

    clock.advance(Duration::from_secs(35));
    let after_window = svc.oneshot(request(env)).await.unwrap();
    assert_eq!(after_window.headers()[X_RATELIMIT_REMAINING], "1");
}

#[tokio::test]
async fn another_request_shape_is_counted_separately() {
    let counter = CannedCounter::new(true, 3, 10);
    let layer = AdmissionLayer::window(options(counter.clone()).prefix("edge:")).unwrap();
    let svc = layer.layer(service_fn(counting_ok(Arc::default())));

    let mut req = Request::builder().header("x-api-key", "tenant-2").body(()).unwrap();
    req.extensions_mut().insert(kv_env());
    svc.oneshot(req).await.unwrap();

    assert_eq!(counter.seen(), vec!["edge:tenant-2".to_string()]);
}

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use permitgate::endpoint::{EndpointConfig, EndpointMethod, Endpoints, API_3};
use permitgate::metrics;
use permitgate::server::{build_router, ServeState, WorkerPool};
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct Harness {
    router: Router,
    endpoints: Arc<Endpoints>,
    shutdown: CancellationToken,
}

fn harness(endpoints: Endpoints, pool: WorkerPool) -> Harness {
    let endpoints = Arc::new(endpoints);
    let shutdown = CancellationToken::new();
    let state = ServeState::new(Arc::clone(&endpoints), Arc::new(pool), shutdown.clone());
    Harness {
        router: build_router(state),
        endpoints,
        shutdown,
    }
}

fn standard() -> Harness {
    harness(Endpoints::standard(), WorkerPool::new(200, 1000))
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(router: &Router, method: Method, uri: &str) -> Response {
    router.clone().oneshot(request(method, uri)).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn spawn_request(
    router: &Router,
    method: Method,
    uri: &'static str,
) -> tokio::task::JoinHandle<(StatusCode, Value)> {
    let router = router.clone();
    tokio::spawn(async move {
        let response = router.oneshot(request(method, uri)).await.unwrap();
        let status = response.status();
        (status, body_json(response).await)
    })
}

#[tokio::test]
async fn health_is_plain_up() {
    let harness = standard();
    let response = send(&harness.router, Method::GET, "/api/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(body_text(response).await, "UP");
}

#[tokio::test]
async fn idle_status_reports_full_capacity() {
    let harness = standard();
    let response = send(&harness.router, Method::GET, "/api/status").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "api1": { "max": 1000, "available": 1000 },
            "api2": { "max": 1000, "available": 1000 },
            "api3": { "max": 200, "available": 200 },
            "api4": { "max": 600, "available": 600 },
        })
    );
}

#[tokio::test]
async fn each_endpoint_answers_on_its_method() {
    let harness = standard();

    let cases = [
        (Method::GET, "/api/1", "1", None),
        (Method::POST, "/api/2", "2", None),
        (Method::PUT, "/api/3", "3", Some("bottleneck")),
        (Method::DELETE, "/api/4", "4", Some("complete")),
    ];
    for (method, uri, api, flag) in cases {
        let response = send(&harness.router, method, uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let body = body_json(response).await;
        assert_eq!(body["api"], api);
        assert_eq!(body["requestId"].as_str().unwrap().len(), 8);
        let max = harness.endpoints.get(api).unwrap().limiter().capacity() as u64;
        assert_eq!(body["available"].as_u64(), Some(max - 1));
        match flag {
            Some(key) => assert_eq!(body[key], true),
            None => {
                assert!(body.get("bottleneck").is_none());
                assert!(body.get("complete").is_none());
            }
        }
    }
}

#[tokio::test]
async fn wrong_method_is_not_gated() {
    let harness = standard();
    let response = send(&harness.router, Method::POST, "/api/1").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        harness.endpoints.get("1").unwrap().limiter().available_permits(),
        1000
    );
}

#[tokio::test]
async fn saturated_endpoint_rejects_excess() {
    let config = EndpointConfig::new("1", EndpointMethod::Get, "/api/1", 2, 400)
        .with_acquire_timeout(Duration::from_millis(100));
    let harness = harness(Endpoints::from_configs([config]), WorkerPool::new(200, 1000));

    let handles: Vec<_> = (0..3)
        .map(|_| spawn_request(&harness.router, Method::GET, "/api/1"))
        .collect();

    sleep(Duration::from_millis(150)).await;
    let health = send(&harness.router, Method::GET, "/api/health").await;
    assert_eq!(health.status(), StatusCode::OK);

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        match status {
            StatusCode::OK => accepted += 1,
            StatusCode::TOO_MANY_REQUESTS => {
                assert_eq!(body, json!({ "error": "Too many requests" }));
                rejected += 1;
            }
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!((accepted, rejected), (2, 1));
    assert_eq!(
        harness.endpoints.get("1").unwrap().limiter().available_permits(),
        2
    );
}

#[tokio::test]
async fn status_tracks_in_flight_bottleneck_requests() {
    let slow_api3 = API_3.with_work_duration(Duration::from_millis(600));
    let harness = harness(Endpoints::from_configs([slow_api3]), WorkerPool::new(200, 1000));

    let handles: Vec<_> = (0..5)
        .map(|_| spawn_request(&harness.router, Method::PUT, "/api/3"))
        .collect();

    let observed = timeout(Duration::from_secs(2), async {
        loop {
            let body = body_json(send(&harness.router, Method::GET, "/api/status").await).await;
            if body["api3"]["available"] == 195 {
                return body;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("status never showed five held permits");
    assert_eq!(observed["api3"]["max"], 200);

    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bottleneck"], true);
    }
    let body = body_json(send(&harness.router, Method::GET, "/api/status").await).await;
    assert_eq!(body["api3"], json!({ "max": 200, "available": 200 }));
}

#[tokio::test]
async fn shutdown_interrupts_in_flight_request() {
    let long = API_3.with_work_duration(Duration::from_secs(30));
    let harness = harness(Endpoints::from_configs([long]), WorkerPool::new(200, 1000));

    let handle = spawn_request(&harness.router, Method::PUT, "/api/3");
    let limiter = harness.endpoints.get("3").unwrap().limiter().clone();
    while limiter.available_permits() == 200 {
        sleep(Duration::from_millis(5)).await;
    }
    harness.shutdown.cancel();

    let (status, body) = handle.await.unwrap();
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Interrupted" }));
    assert_eq!(limiter.available_permits(), 200);
}

#[tokio::test]
async fn client_disconnect_releases_permit() {
    let long = API_3.with_work_duration(Duration::from_secs(30));
    let harness = harness(Endpoints::from_configs([long]), WorkerPool::new(200, 1000));

    let handle = spawn_request(&harness.router, Method::PUT, "/api/3");
    let limiter = harness.endpoints.get("3").unwrap().limiter().clone();
    while limiter.available_permits() == 200 {
        sleep(Duration::from_millis(5)).await;
    }
    handle.abort();
    let _ = handle.await;

    assert_eq!(limiter.available_permits(), 200);
}

#[tokio::test]
async fn full_worker_pool_sheds_with_503() {
    let slow = EndpointConfig::new("1", EndpointMethod::Get, "/api/1", 10, 400);
    let harness = harness(Endpoints::from_configs([slow]), WorkerPool::new(1, 0));

    let first = spawn_request(&harness.router, Method::GET, "/api/1");
    let limiter = harness.endpoints.get("1").unwrap().limiter().clone();
    while limiter.available_permits() == 10 {
        sleep(Duration::from_millis(5)).await;
    }

    let shed_before = metrics::shed_count();
    let shed = send(&harness.router, Method::GET, "/api/status").await;
    assert_eq!(shed.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(metrics::shed_count() > shed_before);
    assert_eq!(body_json(shed).await, json!({ "error": "Server busy" }));

    let health = send(&harness.router, Method::GET, "/api/health").await;
    assert_eq!(health.status(), StatusCode::OK);

    let (status, _) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let recovered = send(&harness.router, Method::GET, "/api/status").await;
    assert_eq!(recovered.status(), StatusCode::OK);
}

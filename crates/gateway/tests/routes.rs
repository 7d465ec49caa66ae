// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests over the full axum router (spec.md §8 scenarios 1, 5, 6)
//! using the in-memory cluster fake — no real network calls.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use vgate_cluster::FakeCluster;
use vgate_core::{FakeClock, InfrastructureSpec, WorkloadIdentity};
use vgate_gateway::drift::DriftReconciler;
use vgate_gateway::metrics::GatewayMetrics;
use vgate_gateway::routes::build_router;
use vgate_gateway::scaler::ActivityScaler;
use vgate_gateway::state::GatewayState;
use vgate_lifecycle::Lifecycle;
use vgate_model::{ModelCrdCoordinates, ModelRegistry};

fn model_json(served_name: &str) -> serde_json::Value {
    serde_json::json!({
        "spec": {
            "model_id": "meta-llama/Llama-3-8B",
            "served_name": served_name,
            "context_length": 4096,
            "memory_utilization": "0.9",
            "batched_tokens": 8192,
            "max_sequences": 256,
            "precision": "bfloat16",
            "prefix_caching": false,
            "tool_call_parser": null,
            "reasoning_parser": null,
        }
    })
}

fn infra() -> InfrastructureSpec {
    InfrastructureSpec {
        gpu_count: 1,
        cpu_offload_gb: 0,
        image: "vllm/vllm-openai:v0.6.0".to_string(),
        model_cache_path: "/mnt/model-cache".to_string(),
        compile_cache_path: "/mnt/compile-cache".to_string(),
        shared_memory_size: "8Gi".to_string(),
        api_key_secret_ref: None,
    }
}

fn test_state(fake: Arc<FakeCluster>) -> Arc<GatewayState<FakeCluster, FakeClock>> {
    test_state_with(fake, "http://127.0.0.1:1", false, Duration::from_secs(5))
}

fn test_state_with(
    fake: Arc<FakeCluster>,
    upstream_base_url: &str,
    log_output: bool,
    cold_start_budget: Duration,
) -> Arc<GatewayState<FakeCluster, FakeClock>> {
    fake.set_crd_items(vec![model_json("llama3")]);
    let registry = Arc::new(ModelRegistry::new(fake.clone(), ModelCrdCoordinates::default()));
    let identity = WorkloadIdentity::new("vllm", "vllm");
    let lifecycle = Lifecycle::with_timings(
        fake.clone(),
        registry.clone(),
        "llama3".to_string(),
        infra(),
        identity.clone(),
        cold_start_budget,
        Duration::from_millis(5),
    );
    let metrics = Arc::new(GatewayMetrics::new());
    let activity = Arc::new(vgate_core::ActivityClock::new(std::time::Instant::now()));
    let scaler = Arc::new(ActivityScaler::new(
        lifecycle.clone(),
        activity,
        FakeClock::new(),
        Duration::from_secs(300),
        Duration::from_secs(30),
        metrics.clone(),
    ));
    let drift = Arc::new(DriftReconciler::new(
        fake,
        lifecycle.clone(),
        registry.clone(),
        "llama3".to_string(),
        infra(),
        identity,
        Duration::from_secs(60),
        metrics.clone(),
    ));
    Arc::new(GatewayState {
        lifecycle,
        registry,
        scaler,
        drift,
        metrics,
        http_client: reqwest::Client::new(),
        upstream_base_url: upstream_base_url.to_string(),
        served_name: "llama3".to_string(),
        cold_start_budget,
        public_endpoint: String::new(),
        log_output,
    })
}

#[tokio::test]
async fn health_never_touches_the_backend() {
    let fake = Arc::new(FakeCluster::new());
    let state = test_state(fake.clone());
    let app = build_router(state);

    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(fake.create_workload_count(), 0);

    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["state"], "absent");
}

#[tokio::test]
async fn explicit_start_adopts_a_ready_workload_and_returns_200() {
    let fake = Arc::new(FakeCluster::new());
    fake.mark_ready(Default::default());
    let state = test_state(fake.clone());
    let app = build_router(state);

    let resp = app
        .oneshot(Request::builder().method("POST").uri("/operations/start").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(fake.create_workload_count(), 0, "an already-ready workload is adopted, not recreated");
}

#[tokio::test]
async fn explicit_start_failure_surfaces_500_with_start_failed_type() {
    // spec.md §6: `/operations/start` reports 500 on any start failure; the
    // 502 mapping for `StartFailed` applies to the gated proxy path waiting
    // on the start token (spec.md §4.3/§7), not this management endpoint.
    let fake = Arc::new(FakeCluster::new());
    fake.mark_failed("image pull backoff");
    let state = test_state(fake.clone());
    let app = build_router(state);

    let resp = app
        .oneshot(Request::builder().method("POST").uri("/operations/start").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["type"], "start_failed");
}

#[tokio::test]
async fn stop_on_an_absent_backend_is_idempotent() {
    let fake = Arc::new(FakeCluster::new());
    let state = test_state(fake.clone());
    let app = build_router(state);

    let resp = app
        .oneshot(Request::builder().method("POST").uri("/operations/stop").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(fake.delete_workload_count(), 0);
}

#[tokio::test]
async fn models_available_lists_the_declared_registry_entries() {
    let fake = Arc::new(FakeCluster::new());
    let state = test_state(fake);
    let app = build_router(state);

    let resp = app
        .oneshot(Request::builder().uri("/models/available").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["served_name"], "llama3");
}

#[tokio::test]
async fn models_running_reports_absent_state_before_any_start() {
    let fake = Arc::new(FakeCluster::new());
    let state = test_state(fake);
    let app = build_router(state);

    let resp = app
        .oneshot(Request::builder().uri("/models/running").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["state"], "absent");
    assert!(json.get("served_name").is_none());
}

/// Spin up a tiny real HTTP server standing in for the backend workload, so
/// the fallback route's streaming forward can be exercised end to end
/// instead of only unit-tested piece by piece.
async fn spawn_upstream() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let upstream = axum::Router::new().route(
        "/v1/completions",
        axum::routing::post(|| async { "upstream-response-body" }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, upstream).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn fallback_streams_the_response_body_from_a_ready_backend() {
    let upstream_base_url = spawn_upstream().await;
    let fake = Arc::new(FakeCluster::new());
    fake.mark_ready(Default::default());
    let state = test_state_with(fake, &upstream_base_url, false, Duration::from_secs(5));
    let app = build_router(state);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/completions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"upstream-response-body");
}

#[tokio::test]
async fn fallback_gates_on_a_cold_backend_before_forwarding() {
    let upstream_base_url = spawn_upstream().await;
    let fake = Arc::new(FakeCluster::new());
    // Never marked ready; the lifecycle start sequence polls until this
    // short cold-start budget expires.
    let state = test_state_with(fake.clone(), &upstream_base_url, false, Duration::from_millis(50));
    let app = build_router(state);

    let resp = app
        .oneshot(Request::builder().uri("/v1/completions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(fake.create_workload_count(), 1, "a cold request still triggers exactly one start attempt");
}

#[tokio::test]
async fn log_output_does_not_interfere_with_forwarding() {
    let upstream_base_url = spawn_upstream().await;
    let fake = Arc::new(FakeCluster::new());
    fake.mark_ready(Default::default());
    let state = test_state_with(fake, &upstream_base_url, true, Duration::from_secs(5));
    let app = build_router(state);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/completions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"upstream-response-body");
}

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use random_average::config::{Config, FetchMode};
use random_average::error::{CODE_BAD_REQUEST, CODE_SERVICE_UNAVAILABLE};
use random_average::fetcher::AverageService;
use random_average::testkit::{failure, rate_limited, success, ScriptedSource};
use random_average::upstream::RawResponse;
use random_average::{server, AppState};

fn state(mode: FetchMode, script: Vec<RawResponse>) -> (Arc<AppState>, Arc<ScriptedSource>) {
    let config = Config {
        mode,
        loop_stopped: true,
        ..Config::default()
    };
    let source = Arc::new(ScriptedSource::new(script));
    let state = Arc::new(AppState::with_source(&config, source.clone()));
    (state, source)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, Value) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_owned());
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, content_type, serde_json::from_slice(&bytes).unwrap())
}

async fn tick(state: &AppState) {
    match &state.service {
        AverageService::Polling(poller) => {
            poller.tick().await.unwrap();
        }
        AverageService::OnDemand(_) => panic!("expected poll mode"),
    }
}

#[tokio::test]
async fn healthcheck_responds_ok() {
    let (state, source) = state(FetchMode::Poll, vec![]);
    let app = server::create_router(state);

    let (status, content_type, body) = get(&app, "/healthcheck").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert_eq!(body, json!({ "status": "ok" }));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn poll_mode_reports_latest_average() {
    let (state, source) = state(FetchMode::Poll, vec![success(42.0), success(21.0)]);
    let app = server::create_router(Arc::clone(&state));

    let (status, _, body) = get(&app, "/api/random").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "random_average": 0.0 }));

    tick(&state).await;
    let (_, content_type, body) = get(&app, "/api/random").await;
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert_eq!(body["random_average"], 42.0);

    tick(&state).await;
    let (_, _, body) = get(&app, "/api/random").await;
    assert_eq!(body["random_average"], 31.5);

    // reads never reach the upstream in poll mode
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn on_demand_mode_rides_out_rate_limiting() {
    let (state, source) = state(
        FetchMode::OnDemand,
        vec![rate_limited(), rate_limited(), success(42.0)],
    );
    let app = server::create_router(state);

    let (status, _, body) = get(&app, "/api/random").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "random_average": 42.0 }));
    assert_eq!(source.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn on_demand_mode_maps_upstream_errors_to_status() {
    let cases = [
        (failure(CODE_SERVICE_UNAVAILABLE, None), StatusCode::SERVICE_UNAVAILABLE, "service unavailable".to_owned()),
        (failure(CODE_BAD_REQUEST, Some("spanner")), StatusCode::BAD_REQUEST, "spanner".to_owned()),
        (
            failure(42, Some("spanner")),
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"invalid server response: {"status":"error","code":42,"reason":"spanner"}"#.to_owned(),
        ),
    ];

    for (resp, expected_status, message) in cases {
        let (state, _) = state(FetchMode::OnDemand, vec![resp]);
        let app = server::create_router(state);

        let (status, _, body) = get(&app, "/api/random").await;
        assert_eq!(status, expected_status);
        assert_eq!(body["error"], message.as_str());
        assert_eq!(body["status"], expected_status.as_u16());
    }
}

#[tokio::test(start_paused = true)]
async fn on_demand_mode_reports_exhausted_retries() {
    let (state, source) = state(FetchMode::OnDemand, vec![rate_limited(); 6]);
    let app = server::create_router(state);

    let (status, _, body) = get(&app, "/api/random").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "failed to fetch after 6 attempts");
    assert_eq!(source.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn stats_reflect_upstream_calls() {
    let (state, _) = state(FetchMode::OnDemand, vec![rate_limited(), success(10.0)]);
    let app = server::create_router(state);

    get(&app, "/api/random").await;
    let (status, _, stats) = get(&app, "/api/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["average"], 10.0);
    assert_eq!(stats["samples"], 1);
    assert_eq!(stats["upstream"]["upstream_calls"], 2);
    assert_eq!(stats["upstream"]["rate_limited"], 1);
    assert_eq!(stats["upstream"]["successes"], 1);
    assert_eq!(stats["upstream"]["latency"]["count"], 2);
    assert!(stats["upstream"]["last_sample_at"].is_string());
}

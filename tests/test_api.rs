//! Tests for the REST API router.

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::{Reply, StubEngine, StubProvider};
use uicompare::api::{AppState, router};
use uicompare::run::types::RunId;

fn app(root: &std::path::Path, engine: StubEngine) -> Router {
    let orchestrator = common::orchestrator(root, engine, Some(StubProvider::answering("Nice spacing.")));
    router(Arc::new(AppState::new(Arc::new(orchestrator))), 1024 * 1024)
}

fn post_compare(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/compare")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn compare_missing_test_url_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, log) = StubEngine::passing();
    let app = app(dir.path(), engine);

    let resp = app
        .oneshot(post_compare(r#"{"referenceUrl": "https://example.com"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let json = json_body(resp).await;
    assert!(json["error"].as_str().unwrap().contains("testUrl"));
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn compare_returns_summary_and_serves_report() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _log) = StubEngine::new(Reply::Pass, Reply::Mismatch);
    let app = app(dir.path(), engine);

    let resp = app
        .clone()
        .oneshot(post_compare(
            r#"{"referenceUrl": "https://example.com", "testUrl": "https://staging.example.com", "viewportType": "tablet"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = json_body(resp).await;
    assert_eq!(json["state"], "ready");
    assert_eq!(json["outcome"], "differences_found");
    assert_eq!(json["viewport"], "tablet");
    assert_eq!(json["feedbackAttached"], true);
    assert_eq!(json["feedback"]["status"], "attached");
    assert_eq!(json["message"], "Comparison complete with feedback");
    let id = json["reportId"].as_str().unwrap().to_string();
    assert_eq!(json["reportUrl"], format!("/reports/{}", id));

    let resp = app.clone().oneshot(get(&format!("/reports/{}", id))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let location = resp.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert_eq!(location, format!("/data/html_report/{}/index.html", id));

    let resp = app.clone().oneshot(get(&location)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = resp.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&html).contains("llm_feedback.js"));

    let resp = app
        .clone()
        .oneshot(get(&format!("/data/html_report/{}/llm_feedback.json", id)))
        .await
        .unwrap();
    assert_eq!(json_body(resp).await["feedback"], "Nice spacing.");

    let resp = app.oneshot(get(&format!("/reports/{}/run", id))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let record = json_body(resp).await;
    assert_eq!(record["state"], "ready");
    assert_eq!(record["test_url"], "https://staging.example.com");
}

#[tokio::test]
async fn compare_engine_failure_is_server_error_with_report_id() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _log) = StubEngine::new(Reply::Fail("Chrome crashed"), Reply::Pass);
    let app = app(dir.path(), engine);

    let resp = app
        .oneshot(post_compare(
            r#"{"referenceUrl": "https://a.example", "testUrl": "https://b.example"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = json_body(resp).await;
    assert!(json["details"].as_str().unwrap().contains("Chrome crashed"));
    assert!(RunId::parse(json["reportId"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn unknown_report_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _log) = StubEngine::passing();
    let app = app(dir.path(), engine);

    let resp = app
        .clone()
        .oneshot(get(&format!("/reports/{}", RunId::new())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .oneshot(get(&format!("/reports/{}/run", RunId::new())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_report_id_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _log) = StubEngine::passing();
    let app = app(dir.path(), engine);

    let resp = app.oneshot(get("/reports/not-a-run")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_and_viewports() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _log) = StubEngine::passing();
    let app = app(dir.path(), engine);

    let resp = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "ok");

    let resp = app.oneshot(get("/viewports")).await.unwrap();
    let json = json_body(resp).await;
    let keys: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["desktop", "laptop", "tablet", "mobile", "mobileSmall"]);
}

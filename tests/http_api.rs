//! HTTP 接口：统一的 `{errno, error, data}` 响应

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::util::ServiceExt;

use fabula::infrastructure::events::EventPublisher;
use fabula::infrastructure::http::dto::JobDefaults;
use fabula::infrastructure::http::{build_router, AppState};
use fabula::infrastructure::memory::InMemoryJobQueue;
use fabula::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteJobRepository,
};

/// 不启动 worker，接收端由调用方持有
async fn app(queue_capacity: usize) -> (Router, mpsc::Receiver<String>) {
    let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let (queue, rx) = InMemoryJobQueue::channel(queue_capacity);
    let state = AppState::new(
        Arc::new(SqliteJobRepository::new(pool)),
        queue.arc(),
        EventPublisher::new().arc(),
    )
    .with_job_defaults(JobDefaults {
        book_count: 2,
        chapters_per_book: 4,
        ..JobDefaults::default()
    })
    .with_log_tail(10);
    (build_router(Arc::new(state)), rx)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn enqueue_body(project_id: &str) -> Value {
    json!({
        "project_id": project_id,
        "concept": {"title": "Tidebound", "premise": "A drowned empire rises.", "genre": "Fantasy"}
    })
}

#[tokio::test]
async fn test_ping() {
    let (app, _rx) = app(8).await;
    let (status, body) = call(&app, "GET", "/api/ping", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["errno"], 0);
    assert_eq!(body["error"], "");
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_enqueue_fills_defaults_and_reports_status() {
    let (app, mut rx) = app(8).await;
    let (_, body) = call(&app, "POST", "/api/job/enqueue", Some(enqueue_body("tide"))).await;
    assert_eq!(body["errno"], 0);
    assert_eq!(body["data"]["status"], "queued");
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();
    assert_eq!(rx.recv().await.as_deref(), Some(job_id.as_str()));

    let (_, body) = call(&app, "POST", "/api/job/status", Some(json!({"job_id": job_id}))).await;
    assert_eq!(body["errno"], 0);
    assert_eq!(body["data"]["project_id"], "tide");
    assert_eq!(body["data"]["config"]["book_count"], 2);
    assert_eq!(body["data"]["config"]["chapters_per_book"], 4);
    assert_eq!(body["data"]["config"]["preset"], "balanced");

    let (_, body) = call(&app, "POST", "/api/job/logs", Some(json!({"job_id": job_id}))).await;
    assert_eq!(body["errno"], 0);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["line"], "Job queued for project tide");
}

#[tokio::test]
async fn test_enqueue_validation_error_is_errno_400() {
    let (app, _rx) = app(8).await;
    let (status, body) = call(&app, "POST", "/api/job/enqueue", Some(enqueue_body("../etc"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["errno"], 400);
    assert!(body["error"].as_str().unwrap().contains("project_id"));
    assert!(body["data"].is_null());

    let mut request = enqueue_body("tide");
    request["preset"] = json!("turbo");
    let (_, body) = call(&app, "POST", "/api/job/enqueue", Some(request)).await;
    assert_eq!(body["errno"], 400);
}

#[tokio::test]
async fn test_unknown_job_is_errno_404() {
    let (app, _rx) = app(8).await;
    for uri in ["/api/job/status", "/api/job/pause", "/api/job/resume", "/api/job/delete"] {
        let (status, body) = call(&app, "POST", uri, Some(json!({"job_id": "nope"}))).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(body["errno"], 404, "{}", uri);
    }
}

#[tokio::test]
async fn test_control_conflicts_are_errno_409() {
    let (app, _rx) = app(8).await;
    let (_, body) = call(&app, "POST", "/api/job/enqueue", Some(enqueue_body("tide"))).await;
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

    // 排队中的任务无法恢复
    let (_, body) = call(&app, "POST", "/api/job/resume", Some(json!({"job_id": job_id}))).await;
    assert_eq!(body["errno"], 409);

    let (_, body) = call(&app, "POST", "/api/job/pause", Some(json!({"job_id": job_id}))).await;
    assert_eq!(body["errno"], 0);
    assert_eq!(body["data"]["status"], "paused");
    assert_eq!(body["data"]["deferred"], false);

    let (_, body) = call(&app, "POST", "/api/job/pause", Some(json!({"job_id": job_id}))).await;
    assert_eq!(body["errno"], 409);

    let (_, body) = call(&app, "POST", "/api/job/resume", Some(json!({"job_id": job_id}))).await;
    assert_eq!(body["errno"], 0);
    assert_eq!(body["data"]["previous_job_id"], job_id.as_str());
    assert!(body["data"]["resume_from"].is_null());
}

#[tokio::test]
async fn test_full_queue_is_errno_503() {
    let (app, _rx) = app(1).await;
    let (_, body) = call(&app, "POST", "/api/job/enqueue", Some(enqueue_body("tide"))).await;
    assert_eq!(body["errno"], 0);
    let (_, body) = call(&app, "POST", "/api/job/enqueue", Some(enqueue_body("tide"))).await;
    assert_eq!(body["errno"], 503);
}

#[tokio::test]
async fn test_list_filters_by_status_and_project() {
    let (app, _rx) = app(8).await;
    let (_, body) = call(&app, "POST", "/api/job/enqueue", Some(enqueue_body("tide"))).await;
    let first = body["data"]["job_id"].as_str().unwrap().to_string();
    call(&app, "POST", "/api/job/enqueue", Some(enqueue_body("ember"))).await;
    call(&app, "POST", "/api/job/cancel", Some(json!({"job_id": first}))).await;

    let (_, body) = call(&app, "GET", "/api/job/list", None).await;
    assert_eq!(body["data"]["total"], 2);

    let (_, body) = call(&app, "GET", "/api/job/list?status=cancelled", None).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["job_id"], first.as_str());

    let (_, body) = call(&app, "GET", "/api/job/list?project_id=ember", None).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["status"], "queued");

    let (_, body) = call(&app, "GET", "/api/job/list?status=sleeping", None).await;
    assert_eq!(body["errno"], 400);
}

#[tokio::test]
async fn test_delete_removes_job() {
    let (app, _rx) = app(8).await;
    let (_, body) = call(&app, "POST", "/api/job/enqueue", Some(enqueue_body("tide"))).await;
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

    let (_, body) = call(&app, "POST", "/api/job/delete", Some(json!({"job_id": job_id}))).await;
    assert_eq!(body, json!({"errno": 0, "error": "", "data": {}}));

    let (_, body) = call(&app, "POST", "/api/job/status", Some(json!({"job_id": job_id}))).await;
    assert_eq!(body["errno"], 404);
}

#[tokio::test]
async fn test_malformed_json_is_rejected_by_extractor() {
    let (app, _rx) = app(8).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/job/status")
        .header("content-type", "application/json")
        .body(Body::from("{broken"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

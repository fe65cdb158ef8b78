//! Integration tests for the agent HTTP API
//!
//! Repairs run against `true`/`false` in place of nodetool so the job
//! lifecycle can be exercised without a database node.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use repair_agent::{create_router, AppState};

const API_KEY: &str = "test-key";

fn app(nodetool: &str, data_dir: PathBuf) -> Router {
    create_router(Arc::new(AppState::new(
        API_KEY.to_string(),
        nodetool.to_string(),
        data_dir,
    )))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", API_KEY));
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let app = app("true", PathBuf::from("/nonexistent"));
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_api_key_is_rejected() {
    let app = app("true", PathBuf::from("/nonexistent"));
    let response = app
        .oneshot(
            Request::get("/repair/status/x")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_repair_job_lifecycle() {
    let app = app("true", PathBuf::from("/nonexistent"));

    let (status, body) = call(
        &app,
        "POST",
        "/repair/start",
        Some(json!({
            "keyspace": "ks",
            "tables": ["t1"],
            "ranges": [{"start_token": -5, "end_token": 5}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["job_status"], "Running");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let mut final_status = String::new();
    for _ in 0..200 {
        let (_, body) = call(&app, "GET", &format!("/repair/status/{}", job_id), None).await;
        final_status = body["job_status"].as_str().unwrap_or_default().to_string();
        if final_status != "Running" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(final_status, "Completed");
}

#[tokio::test]
async fn test_failed_repair_reports_failed() {
    let app = app("false", PathBuf::from("/nonexistent"));

    let (_, body) = call(
        &app,
        "POST",
        "/repair/start",
        Some(json!({
            "keyspace": "ks",
            "ranges": [{"start_token": 0, "end_token": 1}]
        })),
    )
    .await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let mut last = Value::Null;
    for _ in 0..200 {
        let (_, body) = call(&app, "GET", &format!("/repair/status/{}", job_id), None).await;
        if body["job_status"] != "Running" {
            last = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(last["job_status"], "Failed");
    assert!(last["error"].is_string());
}

#[tokio::test]
async fn test_repair_without_ranges_is_refused() {
    let app = app("true", PathBuf::from("/nonexistent"));
    let (_, body) = call(
        &app,
        "POST",
        "/repair/start",
        Some(json!({ "keyspace": "ks", "ranges": [] })),
    )
    .await;
    assert_eq!(body["success"], false);
    assert!(body.get("job_id").is_none());
}

#[tokio::test]
async fn test_unknown_job_status() {
    let app = app("true", PathBuf::from("/nonexistent"));
    let (status, body) = call(&app, "GET", "/repair/status/missing", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_kill_with_no_jobs() {
    let app = app("true", PathBuf::from("/nonexistent"));
    let (_, body) = call(&app, "POST", "/repair/kill", Some(json!({}))).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["killed"], 0);
}

#[tokio::test]
async fn test_tables_and_table_size() {
    let data = TempDir::new().unwrap();
    let table_dir = data
        .path()
        .join("ks")
        .join("users-5a1ff267ace03f128563cfae6103c65e");
    std::fs::create_dir_all(&table_dir).unwrap();
    std::fs::write(table_dir.join("md-1-big-Data.db"), vec![0u8; 64]).unwrap();

    let app = app("true", data.path().to_path_buf());

    let (_, body) = call(&app, "GET", "/storage/tables/ks", None).await;
    assert_eq!(body["data"], json!(["users"]));

    let (_, body) = call(
        &app,
        "POST",
        "/storage/table-size",
        Some(json!({ "keyspace": "ks", "table": "users" })),
    )
    .await;
    assert_eq!(body["data"]["size_bytes"], 64);
}

#[tokio::test]
async fn test_ring_of_empty_describering() {
    // `true` prints nothing, so the ring is empty but valid
    let app = app("true", PathBuf::from("/nonexistent"));
    let (_, body) = call(&app, "GET", "/storage/ring/ks", None).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["ranges"], json!([]));
}

#[tokio::test]
async fn test_names_outside_data_dir_are_refused() {
    let root = TempDir::new().unwrap();
    let data = root.path().join("data");
    std::fs::create_dir_all(data.join("ks")).unwrap();
    std::fs::create_dir_all(root.path().join("secret").join("private_dir")).unwrap();
    let app = app("true", data);

    let (_, body) = call(&app, "GET", "/storage/tables/..%2Fsecret", None).await;
    assert_eq!(body["success"], false);
    assert!(body.get("data").is_none());

    let (_, body) = call(
        &app,
        "POST",
        "/storage/table-size",
        Some(json!({ "keyspace": "../secret", "table": "private_dir" })),
    )
    .await;
    assert_eq!(body["success"], false);

    let (_, body) = call(&app, "GET", "/storage/ring/-h", None).await;
    assert_eq!(body["success"], false);

    let (_, body) = call(
        &app,
        "POST",
        "/repair/start",
        Some(json!({
            "keyspace": "ks",
            "tables": ["../t"],
            "ranges": [{ "start_token": 0, "end_token": 10 }]
        })),
    )
    .await;
    assert_eq!(body["success"], false);
    assert!(body.get("job_id").is_none());
}

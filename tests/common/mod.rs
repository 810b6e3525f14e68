//! An in-process server answering the two GitHub REST endpoints the collector uses.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use dora_metrics::config::{AppConfig, RepoId};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Deserialize)]
struct RunsParams {
    branch: String,
    per_page: u8,
}

#[derive(Default)]
pub struct FakeGitHub {
    pub pull_lookups: AtomicUsize,
}

async fn list_runs(
    Path((owner, repo)): Path<(String, String)>,
    Query(params): Query<RunsParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if owner != "acme" || repo != "shop" || params.branch != "main" || params.per_page != 100 {
        return Err((StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))));
    }

    Ok(Json(json!({
        "total_count": 6,
        "workflow_runs": [
            { "id": 6, "conclusion": "success", "head_sha": "aaa", "created_at": "2024-06-10T11:00:00Z", "name": "deploy" },
            { "id": 5, "conclusion": null, "head_sha": "yyy", "created_at": "2024-06-10T10:30:00Z" },
            { "id": 1, "conclusion": "success", "head_sha": "aaa", "created_at": "2024-06-10T10:00:00Z" },
            { "id": 2, "conclusion": "failure", "head_sha": "zzz", "created_at": "2024-06-09T09:00:00Z" },
            { "id": 3, "conclusion": "success", "head_sha": "bbb", "created_at": "2024-06-08T12:00:00Z" },
            { "id": 4, "conclusion": "success", "head_sha": "ccc", "created_at": "2024-05-01T00:00:00Z" }
        ]
    })))
}

async fn commit_pulls(
    State(state): State<Arc<FakeGitHub>>,
    Path((_owner, _repo, sha)): Path<(String, String, String)>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state.pull_lookups.fetch_add(1, Ordering::SeqCst);
    match sha.as_str() {
        "aaa" => Ok(Json(json!([
            { "number": 41, "merged_at": "2024-06-10T08:00:00Z", "state": "closed" },
            { "number": 42, "merged_at": "2024-06-01T08:00:00Z", "state": "closed" }
        ]))),
        "bbb" => Ok(Json(json!([]))),
        _ => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "message": format!("No commit found for SHA: {sha}") })),
        )),
    }
}

async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub async fn fake_github() -> (Arc<FakeGitHub>, AppConfig) {
    let state = Arc::new(FakeGitHub::default());
    let app = Router::new()
        .route("/repos/{owner}/{repo}/actions/runs", get(list_runs))
        .route("/repos/{owner}/{repo}/commits/{sha}/pulls", get(commit_pulls))
        .with_state(state.clone());
    let base_url = spawn_server(app).await;

    let mut config = AppConfig::for_repository(RepoId {
        owner: "acme".to_string(),
        repo: "shop".to_string(),
    });
    config.api_base_url = Some(base_url);
    config.request_timeout_seconds = 5;
    (state, config)
}

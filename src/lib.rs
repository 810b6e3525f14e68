pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod github;
pub mod history;
pub mod metrics;
pub mod types;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use config::AppConfig;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use types::MetricsSnapshot;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    repository: String,
}

/// Shared application state accessible to all request handlers.
pub struct AppState {
    /// Application configuration loaded from environment variables.
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    fn output_path(&self) -> PathBuf {
        self.config.output_path.clone()
    }
}

pub fn create_app(state: Arc<AppState>) -> Router {
    let dashboard = &state.config.dashboard_dir;
    let serve_dir =
        ServeDir::new(dashboard).not_found_service(ServeFile::new(dashboard.join("index.html")));

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/metrics/latest", get(get_latest_metrics))
        .route("/api/metrics/history", get(get_metrics_history))
        .fallback_service(serve_dir)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "dora-metrics",
        version: env!("CARGO_PKG_VERSION"),
        repository: state.config.repository.to_string(),
    })
}

pub async fn get_latest_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MetricsSnapshot>, (StatusCode, String)> {
    let mut snapshots = load_snapshots(&state).await?;
    match snapshots.pop() {
        Some(latest) => Ok(Json(latest)),
        None => Err((
            StatusCode::NOT_FOUND,
            "No metrics have been collected yet".to_string(),
        )),
    }
}

pub async fn get_metrics_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MetricsSnapshot>>, (StatusCode, String)> {
    load_snapshots(&state).await.map(Json)
}

async fn load_snapshots(
    state: &AppState,
) -> Result<Vec<MetricsSnapshot>, (StatusCode, String)> {
    let path = state.output_path();
    let result = tokio::task::spawn_blocking(move || history::read_snapshots(&path)).await;

    match result {
        Ok(Ok(snapshots)) => {
            tracing::debug!(count = snapshots.len(), "Returning snapshots");
            Ok(snapshots)
        }
        Ok(Err(e)) => {
            tracing::error!("Failed to read metrics file: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            ))
        }
        Err(e) => {
            tracing::error!("Metrics read task failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            ))
        }
    }
}

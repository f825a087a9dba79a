//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status (e.g., "ok", "degraded")
    pub status: String,
    /// Module name ("cardforge-ai")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Short git hash of the build
    pub git_hash: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Builds currently running
    pub active_builds: usize,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();
    let active_builds = state.cancellation_tokens.read().await.len();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "cardforge-ai".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        uptime_seconds,
        active_builds,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

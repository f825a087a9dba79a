//! Build API handlers
//!
//! POST /builds, GET /builds/:run_id, POST /builds/:run_id/cancel

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use cardforge_common::cards::parse_cards;
use cardforge_common::events::BuildProgress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{build_config_from, BuildOverrides};
use crate::error::{ApiError, ApiResult};
use crate::workflow::BuildPipeline;
use crate::AppState;

/// POST /builds request
#[derive(Debug, Deserialize)]
pub struct StartBuildRequest {
    /// Tab-separated `phrase<TAB>translation` lines
    pub cards_tsv: String,
    #[serde(flatten)]
    pub overrides: BuildOverrides,
}

/// POST /builds response
#[derive(Debug, Serialize, Deserialize)]
pub struct StartBuildResponse {
    pub run_id: String,
    pub card_count: usize,
    pub total_assets: usize,
    pub started_at: DateTime<Utc>,
}

/// GET /builds/:run_id response
#[derive(Debug, Serialize, Deserialize)]
pub struct BuildStatusResponse {
    pub run_id: String,
    pub progress: BuildProgress,
    /// Still accepting cancellation
    pub active: bool,
}

/// POST /builds/:run_id/cancel response
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelBuildResponse {
    pub run_id: String,
    pub progress: BuildProgress,
    pub cancel_requested_at: DateTime<Utc>,
}

/// POST /builds
///
/// Snapshot the settings, start the build in the background and return
/// 202 Accepted with its run id.
pub async fn start_build(
    State(state): State<AppState>,
    Json(request): Json<StartBuildRequest>,
) -> ApiResult<(StatusCode, Json<StartBuildResponse>)> {
    let cards = parse_cards(&request.cards_tsv);
    if cards.is_empty() {
        return Err(ApiError::BadRequest(
            "No cards found; expected phrase<TAB>translation lines".to_string(),
        ));
    }

    let mut overrides = request.overrides;
    if let Some(folder) = overrides.export_folder.take() {
        let root = super::export_root(&state.settings);
        overrides.export_folder = Some(super::confine_to_root(&root, &folder)?);
    }

    let config = Arc::new(build_config_from(&state.settings, &overrides));
    let run_id = config.resolve_run_id(Utc::now());

    let mut pipeline = BuildPipeline::new(config, state.generator.clone())
        .with_events(state.event_bus.clone());
    if let Some(ref mnemonics) = state.mnemonics {
        pipeline = pipeline.with_mnemonics(mnemonics.clone());
    }
    let total_assets = cards.len() * pipeline.asset_kinds().len();

    let cancel_token = CancellationToken::new();
    {
        let mut tokens = state.cancellation_tokens.write().await;
        if tokens.contains_key(&run_id) {
            return Err(ApiError::Conflict(format!("Build already running: {}", run_id)));
        }
        tokens.insert(run_id.clone(), cancel_token.clone());
    }

    let (progress_tx, progress_rx) = watch::channel(BuildProgress::new(total_assets));
    state
        .builds
        .write()
        .await
        .insert(run_id.clone(), progress_rx);
    let pipeline = pipeline.with_progress_watch(progress_tx);

    let response = StartBuildResponse {
        run_id: run_id.clone(),
        card_count: cards.len(),
        total_assets,
        started_at: Utc::now(),
    };

    let state_clone = state.clone();
    tokio::spawn(async move {
        tracing::info!(run_id = %run_id, "Background build task started");

        match pipeline.run(&run_id, &cards, &cancel_token).await {
            Ok(report) => {
                if let Some(ref err) = report.export_error {
                    state_clone
                        .record_error(format!("Export failed for {}: {}", run_id, err))
                        .await;
                }
                tracing::info!(
                    run_id = %run_id,
                    status = ?report.progress.status,
                    "Background build task completed"
                );
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "Background build task failed");
                state_clone
                    .record_error(format!("Build {} failed: {}", run_id, e))
                    .await;
            }
        }

        state_clone.cancellation_tokens.write().await.remove(&run_id);
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /builds/:run_id
pub async fn get_build_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<BuildStatusResponse>> {
    let progress = state
        .builds
        .read()
        .await
        .get(&run_id)
        .map(|rx| rx.borrow().clone())
        .ok_or_else(|| ApiError::NotFound(format!("Build not found: {}", run_id)))?;

    let active = state.cancellation_tokens.read().await.contains_key(&run_id);

    tracing::debug!(run_id = %run_id, completed = progress.completed, "Status query");

    Ok(Json(BuildStatusResponse {
        run_id,
        progress,
        active,
    }))
}

/// POST /builds/:run_id/cancel
///
/// Signals cooperative cancellation; the build stops at its next check point.
pub async fn cancel_build(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<CancelBuildResponse>> {
    let progress = state
        .builds
        .read()
        .await
        .get(&run_id)
        .map(|rx| rx.borrow().clone())
        .ok_or_else(|| ApiError::NotFound(format!("Build not found: {}", run_id)))?;

    let token = state.cancellation_tokens.read().await.get(&run_id).cloned();
    let Some(token) = token else {
        return Err(ApiError::Conflict(format!(
            "Build already finished: {} ({:?})",
            run_id, progress.status
        )));
    };

    token.cancel();
    tracing::info!(run_id = %run_id, "Build cancellation requested");

    Ok(Json(CancelBuildResponse {
        run_id,
        progress,
        cancel_requested_at: Utc::now(),
    }))
}

/// Build API routes
pub fn build_routes() -> Router<AppState> {
    Router::new()
        .route("/builds", post(start_build))
        .route("/builds/:run_id", get(get_build_status))
        .route("/builds/:run_id/cancel", post(cancel_build))
}

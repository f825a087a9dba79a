//! Standalone mnemonic endpoint
//!
//! POST /mnemonic runs one realtime session and returns (or saves) the WAV.

use axum::{extract::State, routing::post, Json, Router};
use base64::Engine;
use cardforge_common::events::CardforgeEvent;
use cardforge_common::Card;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /mnemonic request
#[derive(Debug, Deserialize)]
pub struct MnemonicRequest {
    pub word: String,
    /// Write the WAV here instead of returning it inline; must resolve
    /// inside the export folder
    #[serde(default)]
    pub out_path: Option<PathBuf>,
}

/// POST /mnemonic response
#[derive(Debug, Serialize, Deserialize)]
pub struct MnemonicResponse {
    pub word: String,
    pub wav_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<PathBuf>,
    /// Base64 WAV, present when `out_path` was not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
}

/// POST /mnemonic
pub async fn create_mnemonic(
    State(state): State<AppState>,
    Json(request): Json<MnemonicRequest>,
) -> ApiResult<Json<MnemonicResponse>> {
    let word = request.word.trim().to_string();
    if word.is_empty() {
        return Err(ApiError::BadRequest("word must not be empty".to_string()));
    }

    let out_path = request
        .out_path
        .as_deref()
        .map(|path| super::confine_to_root(&super::export_root(&state.settings), path))
        .transpose()?;

    let mnemonics = state
        .mnemonics
        .clone()
        .ok_or_else(|| ApiError::BadRequest("Mnemonic generation is not configured".to_string()))?;

    let card = Card::new(1, word.clone(), String::new());
    let result = mnemonics
        .generate_mnemonic(&card, &CancellationToken::new())
        .await;

    state.event_bus.emit_lossy(CardforgeEvent::MnemonicFinished {
        word: word.clone(),
        success: result.is_ok(),
        message: result.as_ref().err().map(|e| e.to_string()),
        timestamp: Utc::now(),
    });

    let wav = match result {
        Ok(wav) => wav,
        Err(e) => {
            state
                .record_error(format!("Mnemonic for '{}' failed: {}", word, e))
                .await;
            return Err(e.into());
        }
    };

    let mut response = MnemonicResponse {
        word,
        wav_bytes: wav.len(),
        saved_to: None,
        audio_base64: None,
    };

    match out_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    ApiError::Internal(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
            tokio::fs::write(&path, &wav).await.map_err(|e| {
                ApiError::Internal(format!("Failed to write {}: {}", path.display(), e))
            })?;
            tracing::info!(path = %path.display(), bytes = wav.len(), "Mnemonic saved");
            response.saved_to = Some(path);
        }
        None => {
            response.audio_base64 = Some(base64::engine::general_purpose::STANDARD.encode(&wav));
        }
    }

    Ok(Json(response))
}

/// Mnemonic API routes
pub fn mnemonic_routes() -> Router<AppState> {
    Router::new().route("/mnemonic", post(create_mnemonic))
}

//! cardforge-ai library interface
//!
//! Flashcard media generation: the batch build pipeline, the realtime
//! mnemonic client, and the HTTP/SSE surface over them.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod realtime;
pub mod services;
pub mod utils;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult, GenerationError, GenerationResult};

use axum::Router;
use cardforge_common::config::TomlConfig;
use cardforge_common::events::{BuildProgress, EventBus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::realtime::MnemonicGenerator;
use crate::services::MediaGenerator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// HTTP generation backend shared by all builds
    pub generator: Arc<dyn MediaGenerator>,
    /// Realtime mnemonic backend
    pub mnemonics: Option<Arc<dyn MnemonicGenerator>>,
    /// Settings each new build snapshots from
    pub settings: Arc<TomlConfig>,
    /// Latest progress per run id
    pub builds: Arc<RwLock<HashMap<String, watch::Receiver<BuildProgress>>>>,
    /// Cancellation tokens for running builds
    pub cancellation_tokens: Arc<RwLock<HashMap<String, CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        event_bus: EventBus,
        generator: Arc<dyn MediaGenerator>,
        settings: TomlConfig,
    ) -> Self {
        Self {
            event_bus,
            generator,
            mnemonics: None,
            settings: Arc::new(settings),
            builds: Arc::new(RwLock::new(HashMap::new())),
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_mnemonics(mut self, mnemonics: Arc<dyn MnemonicGenerator>) -> Self {
        self.mnemonics = Some(mnemonics);
        self
    }

    /// Record an error for `/health` diagnostics
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::build_routes())
        .merge(api::mnemonic_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
}

//! Server-Sent Events for build progress

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tracing::info;

use crate::AppState;

/// GET /events query
#[derive(Debug, Default, Deserialize)]
pub struct EventStreamQuery {
    /// Only forward events of this run
    pub run_id: Option<String>,
}

/// GET /events - SSE stream of `CardforgeEvent`
///
/// Streams BuildStarted, BuildProgressUpdate, AssetFailed, BuildCompleted,
/// BuildCancelled and MnemonicFinished.
pub async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventStreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(run_filter = ?query.run_id, "New SSE client connected");
    cardforge_common::sse::event_bus_sse_stream(&state.event_bus, query.run_id)
}

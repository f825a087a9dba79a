//! Server-Sent Events (SSE) utilities
//!
//! Forwards `EventBus` traffic to an SSE client.

use crate::events::EventBus;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Create an SSE stream of bus events, optionally restricted to one run
///
/// # Arguments
/// * `event_bus` - Bus to subscribe to
/// * `run_filter` - When set, only events carrying this run id are forwarded
///
/// # Example
/// ```rust,ignore
/// pub async fn event_stream(
///     State(state): State<AppState>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     cardforge_common::sse::event_bus_sse_stream(&state.event_bus, None)
/// }
/// ```
pub fn event_bus_sse_stream(
    event_bus: &EventBus,
    run_filter: Option<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected (run filter: {:?})", run_filter);

    let mut rx = event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(ref run_id) = run_filter {
                        if event.run_id() != Some(run_id.as_str()) {
                            continue;
                        }
                    }

                    let event_type = event.event_type().to_string();
                    match serde_json::to_string(&event) {
                        Ok(event_json) => {
                            debug!("SSE: Broadcasting event: {}", event_type);
                            yield Ok(Event::default().event(event_type).data(event_json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: Client lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

//! Event types for the cardforge event system
//!
//! Provides the shared event definitions and the `EventBus` used to publish
//! build progress to SSE clients and the CLI progress printer.

use crate::cards::AssetKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Terminal or running state of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuildStatus {
    Running,
    Done,
    Cancelled,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildStatus::Running)
    }
}

/// Running progress snapshot of a build
///
/// `total = cards × asset kinds per card`. Only the pipeline's aggregator
/// mutates this; everyone else sees clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub status: BuildStatus,
    /// Human-readable status line
    pub status_text: String,
}

impl BuildProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            status: BuildStatus::Running,
            status_text: format!("Generating 0/{}", total),
        }
    }

    /// Assets not yet processed (cancelled runs leave this non-zero)
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }

    /// Percentage complete (0.0 - 100.0)
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }
}

/// cardforge event types
///
/// Broadcast via `EventBus`; serialized with a `type` tag for SSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CardforgeEvent {
    /// Build accepted and started
    BuildStarted {
        run_id: String,
        card_count: usize,
        total_assets: usize,
        timestamp: DateTime<Utc>,
    },

    /// Progress after one card result was applied
    BuildProgressUpdate {
        run_id: String,
        progress: BuildProgress,
        timestamp: DateTime<Utc>,
    },

    /// One asset of one card failed (after retries)
    AssetFailed {
        run_id: String,
        card_index: usize,
        asset: AssetKind,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Build reached Done; export outcome reported separately from card failures
    BuildCompleted {
        run_id: String,
        progress: BuildProgress,
        deck_path: Option<String>,
        export_error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Build stopped by cancellation
    BuildCancelled {
        run_id: String,
        progress: BuildProgress,
        timestamp: DateTime<Utc>,
    },

    /// A standalone mnemonic session finished
    MnemonicFinished {
        word: String,
        success: bool,
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl CardforgeEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            CardforgeEvent::BuildStarted { .. } => "BuildStarted",
            CardforgeEvent::BuildProgressUpdate { .. } => "BuildProgressUpdate",
            CardforgeEvent::AssetFailed { .. } => "AssetFailed",
            CardforgeEvent::BuildCompleted { .. } => "BuildCompleted",
            CardforgeEvent::BuildCancelled { .. } => "BuildCancelled",
            CardforgeEvent::MnemonicFinished { .. } => "MnemonicFinished",
        }
    }

    /// Run id for build events, `None` for standalone events
    pub fn run_id(&self) -> Option<&str> {
        match self {
            CardforgeEvent::BuildStarted { run_id, .. }
            | CardforgeEvent::BuildProgressUpdate { run_id, .. }
            | CardforgeEvent::AssetFailed { run_id, .. }
            | CardforgeEvent::BuildCompleted { run_id, .. }
            | CardforgeEvent::BuildCancelled { run_id, .. } => Some(run_id),
            CardforgeEvent::MnemonicFinished { .. } => None,
        }
    }
}

/// Broadcast bus for `CardforgeEvent`
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CardforgeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lag and lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CardforgeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CardforgeEvent,
    ) -> Result<usize, broadcast::error::SendError<CardforgeEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CardforgeEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit_lossy(CardforgeEvent::BuildProgressUpdate {
            run_id: "run_1".to_string(),
            progress: BuildProgress::new(4),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "BuildProgressUpdate");
        assert_eq!(event.run_id(), Some("run_1"));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit(CardforgeEvent::MnemonicFinished {
            word: "lune".to_string(),
            success: true,
            message: None,
            timestamp: Utc::now(),
        })
        .is_err());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = CardforgeEvent::BuildCancelled {
            run_id: "run_1".to_string(),
            progress: BuildProgress::new(2),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BuildCancelled");
        assert_eq!(json["progress"]["status"], "RUNNING");
    }

    #[test]
    fn test_progress_math() {
        let mut progress = BuildProgress::new(4);
        assert_eq!(progress.remaining(), 4);
        progress.completed = 1;
        assert_eq!(progress.percentage(), 25.0);
        assert_eq!(BuildProgress::new(0).percentage(), 100.0);
    }
}

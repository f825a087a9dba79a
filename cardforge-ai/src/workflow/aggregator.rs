//! Build result aggregator
//!
//! The only writer of build progress and name maps. Card units send one
//! immutable [`CardResult`] each over an mpsc channel; the aggregator applies
//! them one at a time, so counters and maps need no locks.

use cardforge_common::events::{BuildProgress, CardforgeEvent, EventBus};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::models::{AssetOutcome, CardResult, NameMaps};

/// Fan-out of progress to the event bus and an optional latest-value watch
#[derive(Clone, Default)]
pub struct ProgressPublisher {
    events: Option<EventBus>,
    latest: Option<Arc<watch::Sender<BuildProgress>>>,
}

impl ProgressPublisher {
    pub fn new(events: Option<EventBus>, latest: Option<Arc<watch::Sender<BuildProgress>>>) -> Self {
        Self { events, latest }
    }

    pub fn emit(&self, event: CardforgeEvent) {
        if let Some(ref bus) = self.events {
            bus.emit_lossy(event);
        }
    }

    pub fn update_latest(&self, progress: &BuildProgress) {
        if let Some(ref latest) = self.latest {
            latest.send_replace(progress.clone());
        }
    }
}

/// Owns the progress counters and name maps of one run
pub struct Aggregator {
    run_id: String,
    progress: BuildProgress,
    names: NameMaps,
    publisher: ProgressPublisher,
}

impl Aggregator {
    pub fn new(run_id: impl Into<String>, total: usize, publisher: ProgressPublisher) -> Self {
        let progress = BuildProgress::new(total);
        publisher.update_latest(&progress);
        Self {
            run_id: run_id.into(),
            progress,
            names: NameMaps::default(),
            publisher,
        }
    }

    /// Apply one card result
    ///
    /// `completed` grows once per processed asset kind, `failed` once per
    /// failed one; cancelled assets touch neither.
    pub fn apply(&mut self, result: CardResult) {
        for (kind, outcome) in result.outcomes() {
            if !outcome.is_processed() {
                continue;
            }
            self.progress.completed += 1;

            if let Some(filename) = outcome.filename() {
                self.names.record(result.card_id, kind, filename);
            }

            if let AssetOutcome::Failed(message) = outcome {
                self.progress.failed += 1;
                warn!(
                    run_id = %self.run_id,
                    card_index = result.card_index,
                    asset = %kind,
                    error = %message,
                    "Asset generation failed"
                );
                self.publisher.emit(CardforgeEvent::AssetFailed {
                    run_id: self.run_id.clone(),
                    card_index: result.card_index,
                    asset: kind,
                    message: message.clone(),
                    timestamp: Utc::now(),
                });
            }
        }

        self.progress.status_text = running_status_text(&self.progress);
        debug!(
            run_id = %self.run_id,
            card_index = result.card_index,
            completed = self.progress.completed,
            failed = self.progress.failed,
            total = self.progress.total,
            "Card result applied"
        );

        self.publisher.update_latest(&self.progress);
        self.publisher.emit(CardforgeEvent::BuildProgressUpdate {
            run_id: self.run_id.clone(),
            progress: self.progress.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn progress(&self) -> &BuildProgress {
        &self.progress
    }

    pub fn names(&self) -> &NameMaps {
        &self.names
    }

    pub fn into_parts(self) -> (BuildProgress, NameMaps) {
        (self.progress, self.names)
    }
}

fn running_status_text(progress: &BuildProgress) -> String {
    if progress.failed == 0 {
        format!("Generating {}/{}", progress.completed, progress.total)
    } else {
        format!(
            "Generating {}/{} ({} failed)",
            progress.completed, progress.total, progress.failed
        )
    }
}

/// Drain `results` into `aggregator` until every sender is dropped
pub async fn run_aggregator(
    mut aggregator: Aggregator,
    mut results: mpsc::Receiver<CardResult>,
) -> Aggregator {
    while let Some(result) = results.recv().await {
        aggregator.apply(result);
    }
    aggregator
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardforge_common::AssetKind;
    use uuid::Uuid;

    fn result(image: AssetOutcome, audio: AssetOutcome) -> CardResult {
        CardResult {
            card_id: Uuid::new_v4(),
            card_index: 1,
            image,
            audio,
            mnemonic: None,
        }
    }

    #[test]
    fn test_partial_failure_counts() {
        let mut agg = Aggregator::new("run", 2, ProgressPublisher::default());
        let r = result(
            AssetOutcome::Failed("500".to_string()),
            AssetOutcome::Generated("run_0001_audio.mp3".to_string()),
        );
        let id = r.card_id;
        agg.apply(r);

        assert_eq!(agg.progress().completed, 2);
        assert_eq!(agg.progress().failed, 1);
        assert_eq!(agg.names().get(&id, AssetKind::Image), None);
        assert_eq!(
            agg.names().get(&id, AssetKind::Audio),
            Some("run_0001_audio.mp3")
        );
        assert_eq!(agg.progress().status_text, "Generating 2/2 (1 failed)");
    }

    #[test]
    fn test_cancelled_assets_not_counted() {
        let mut agg = Aggregator::new("run", 2, ProgressPublisher::default());
        agg.apply(result(
            AssetOutcome::Existing("a.jpg".to_string()),
            AssetOutcome::Cancelled,
        ));

        assert_eq!(agg.progress().completed, 1);
        assert_eq!(agg.progress().failed, 0);
        assert_eq!(agg.progress().remaining(), 1);
    }

    #[tokio::test]
    async fn test_publishes_events_and_latest() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let (latest_tx, latest_rx) = watch::channel(BuildProgress::new(0));

        let publisher = ProgressPublisher::new(Some(bus), Some(Arc::new(latest_tx)));
        let (tx, results) = mpsc::channel(4);
        tx.send(result(
            AssetOutcome::Failed("boom".to_string()),
            AssetOutcome::Generated("b.mp3".to_string()),
        ))
        .await
        .unwrap();
        drop(tx);

        let agg = run_aggregator(Aggregator::new("run-x", 2, publisher), results).await;
        assert_eq!(agg.progress().completed, 2);
        assert_eq!(latest_rx.borrow().completed, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "AssetFailed");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event_type(), "BuildProgressUpdate");
        assert_eq!(second.run_id(), Some("run-x"));
    }
}

//! Batch build pipeline
//!
//! Drives media generation for an ordered card list to completion or
//! cancellation, then exports the deck.
//!
//! # Architecture
//! - Cards are split into contiguous groups of `group_size`; groups run one
//!   after another, the cards of a group concurrently
//! - Each card unit resolves its image, audio (and mnemonic) branches
//!   concurrently; every branch ends in an [`AssetOutcome`], never an error
//! - Units send one [`CardResult`] each to a single aggregator, the only
//!   writer of progress and name maps
//!
//! # Cancellation
//! Checked at each group boundary, before each asset call and between retry
//! attempts. Calls already in flight run to completion so media files are
//! never left half-written.

use cardforge_common::events::{BuildProgress, BuildStatus, CardforgeEvent, EventBus};
use cardforge_common::{AssetKind, Card};
use chrono::Utc;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::aggregator::{run_aggregator, Aggregator, ProgressPublisher};
use crate::error::{GenerationError, GenerationResult};
use crate::models::build_config::{ExistingMediaPolicy, IMAGE_OUTPUT_FORMAT};
use crate::models::{AssetOutcome, BuildConfig, CardResult, NameMaps};
use crate::realtime::MnemonicGenerator;
use crate::services::{
    copy_media_to_anki, export_deck, ExportOptions, ImageRequest, MediaGenerator, MediaStore,
    SpeechRequest,
};
use crate::utils::retry_with_policy;

/// Final outcome of a build run
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub run_id: String,
    pub progress: BuildProgress,
    pub names: NameMaps,
    /// Deck file, when the export step ran and succeeded
    pub deck_path: Option<PathBuf>,
    /// Rows written to the deck file
    pub exported_rows: usize,
    /// Export failure, reported apart from per-asset failures
    pub export_error: Option<String>,
}

impl BuildReport {
    pub fn is_cancelled(&self) -> bool {
        self.progress.status == BuildStatus::Cancelled
    }
}

/// Batch build pipeline
pub struct BuildPipeline {
    config: Arc<BuildConfig>,
    generator: Arc<dyn MediaGenerator>,
    mnemonics: Option<Arc<dyn MnemonicGenerator>>,
    events: Option<EventBus>,
    latest: Option<Arc<watch::Sender<BuildProgress>>>,
}

impl BuildPipeline {
    /// Create a pipeline over a frozen configuration snapshot
    pub fn new(config: Arc<BuildConfig>, generator: Arc<dyn MediaGenerator>) -> Self {
        Self {
            config,
            generator,
            mnemonics: None,
            events: None,
            latest: None,
        }
    }

    /// Enable the mnemonic asset kind (only used when the config includes mnemonics)
    pub fn with_mnemonics(mut self, mnemonics: Arc<dyn MnemonicGenerator>) -> Self {
        self.mnemonics = Some(mnemonics);
        self
    }

    /// Publish progress events on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Keep `latest` updated with the current progress snapshot
    pub fn with_progress_watch(mut self, latest: watch::Sender<BuildProgress>) -> Self {
        self.latest = Some(Arc::new(latest));
        self
    }

    /// Asset kinds this pipeline will generate per card
    pub fn asset_kinds(&self) -> Vec<AssetKind> {
        let mut kinds = self.config.asset_kinds();
        if self.mnemonics.is_none() {
            kinds.retain(|k| *k != AssetKind::Mnemonic);
        }
        kinds
    }

    fn mnemonics_enabled(&self) -> bool {
        self.asset_kinds().contains(&AssetKind::Mnemonic)
    }

    /// Run a build for `cards` under `run_id`
    ///
    /// Per-asset failures are counted, never returned. `Err` only when the
    /// media directory cannot be created, before any generation starts.
    pub async fn run(
        &self,
        run_id: &str,
        cards: &[Card],
        cancel: &CancellationToken,
    ) -> GenerationResult<BuildReport> {
        let started = Instant::now();
        if self.config.include_mnemonics && self.mnemonics.is_none() {
            warn!(run_id = %run_id, "Mnemonics requested but no mnemonic generator configured");
        }

        let kinds_per_card = self.asset_kinds().len();
        let total = cards.len() * kinds_per_card;
        let group_size = self.config.group_size.max(1);
        let publisher = ProgressPublisher::new(self.events.clone(), self.latest.clone());

        let media = MediaStore::new(self.config.media_dir());
        media.ensure_dir().await?;

        info!(
            run_id = %run_id,
            cards = cards.len(),
            total_assets = total,
            group_size,
            media_dir = %media.dir().display(),
            "Build started"
        );
        publisher.emit(CardforgeEvent::BuildStarted {
            run_id: run_id.to_string(),
            card_count: cards.len(),
            total_assets: total,
            timestamp: Utc::now(),
        });

        let (results_tx, results_rx) = mpsc::channel::<CardResult>(group_size);
        let aggregator = Aggregator::new(run_id, total, publisher.clone());

        let producer = async {
            let results_tx = results_tx;
            let group_count = cards.len().div_ceil(group_size);

            for (group_index, group) in cards.chunks(group_size).enumerate() {
                if cancel.is_cancelled() {
                    info!(
                        run_id = %run_id,
                        group = group_index + 1,
                        groups = group_count,
                        "Cancellation observed at group boundary"
                    );
                    break;
                }

                debug!(
                    run_id = %run_id,
                    group = group_index + 1,
                    groups = group_count,
                    cards = group.len(),
                    "Starting group"
                );

                let units = group.iter().map(|card| {
                    let results_tx = results_tx.clone();
                    let media = &media;
                    async move {
                        let result = self.process_card(run_id, card, media, cancel).await;
                        if results_tx.send(result).await.is_err() {
                            error!(card_index = card.index, "Aggregator closed before result was sent");
                        }
                    }
                });
                join_all(units).await;
            }
        };

        let (aggregator, ()) = tokio::join!(run_aggregator(aggregator, results_rx), producer);
        let (mut progress, names) = aggregator.into_parts();

        let cancelled = cancel.is_cancelled() && progress.completed < progress.total;

        // Export
        let mut report = BuildReport {
            run_id: run_id.to_string(),
            progress: progress.clone(),
            names,
            deck_path: None,
            exported_rows: 0,
            export_error: None,
        };

        if cancelled && progress.completed == 0 {
            info!(run_id = %run_id, "Cancelled before any asset completed, skipping export");
        } else {
            self.export(&mut report, cards, cancelled).await;
        }

        // Final status
        progress.status = if cancelled {
            BuildStatus::Cancelled
        } else {
            BuildStatus::Done
        };
        progress.status_text = final_status_text(&progress, report.export_error.as_deref());
        report.progress = progress.clone();

        info!(
            run_id = %run_id,
            status = ?progress.status,
            completed = progress.completed,
            failed = progress.failed,
            total = progress.total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "{}",
            progress.status_text
        );

        publisher.update_latest(&progress);
        let event = if cancelled {
            CardforgeEvent::BuildCancelled {
                run_id: run_id.to_string(),
                progress,
                timestamp: Utc::now(),
            }
        } else {
            CardforgeEvent::BuildCompleted {
                run_id: run_id.to_string(),
                progress,
                deck_path: report
                    .deck_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
                export_error: report.export_error.clone(),
                timestamp: Utc::now(),
            }
        };
        publisher.emit(event);

        Ok(report)
    }

    /// Write the deck and, when configured, copy media into Anki
    async fn export(&self, report: &mut BuildReport, cards: &[Card], cancelled: bool) {
        let deck_path = self.config.deck_path(&report.run_id);
        let options = ExportOptions {
            include_mnemonics: self.mnemonics_enabled(),
            only_cards_with_media: cancelled,
        };

        match export_deck(&deck_path, cards, &report.names, options).await {
            Ok(rows) => {
                report.deck_path = Some(deck_path);
                report.exported_rows = rows;
            }
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, "Deck export failed");
                report.export_error = Some(e.to_string());
                return;
            }
        }

        if let Some(ref anki_dir) = self.config.anki_media_folder {
            let media_dir = self.config.media_dir();
            match copy_media_to_anki(&media_dir, anki_dir, report.names.filenames()).await {
                Ok(copied) => info!(run_id = %report.run_id, copied, "Anki media copy finished"),
                Err(e) => warn!(run_id = %report.run_id, error = %e, "Anki media copy failed"),
            }
        }
    }

    /// One card unit: all asset branches concurrently, one result
    async fn process_card(
        &self,
        run_id: &str,
        card: &Card,
        media: &MediaStore,
        cancel: &CancellationToken,
    ) -> CardResult {
        let image = self.resolve_asset(run_id, card, AssetKind::Image, media, cancel);
        let audio = self.resolve_asset(run_id, card, AssetKind::Audio, media, cancel);
        let mnemonic = async {
            if self.mnemonics_enabled() {
                Some(
                    self.resolve_asset(run_id, card, AssetKind::Mnemonic, media, cancel)
                        .await,
                )
            } else {
                None
            }
        };

        let (image, audio, mnemonic) = tokio::join!(image, audio, mnemonic);

        CardResult {
            card_id: card.id,
            card_index: card.index,
            image,
            audio,
            mnemonic,
        }
    }

    /// Existing-media check, retried generation, atomic write
    async fn resolve_asset(
        &self,
        run_id: &str,
        card: &Card,
        kind: AssetKind,
        media: &MediaStore,
        cancel: &CancellationToken,
    ) -> AssetOutcome {
        if cancel.is_cancelled() {
            return AssetOutcome::Cancelled;
        }

        let filename = self.config.media_filename(run_id, card.index, kind);
        if self.config.existing_media == ExistingMediaPolicy::Skip && media.exists(&filename).await
        {
            debug!(file = %filename, "Reusing existing media");
            return AssetOutcome::Existing(filename);
        }

        let label = format!("{} #{:04}", kind, card.index);
        let generated = retry_with_policy(&label, self.config.retry_policy(), cancel, || {
            self.generate(card, kind)
        })
        .await;

        match generated {
            Ok(bytes) => match media.write_atomic(&filename, &bytes).await {
                Ok(_) => AssetOutcome::Generated(filename),
                Err(e) => AssetOutcome::Failed(e.to_string()),
            },
            Err(GenerationError::Cancelled) => AssetOutcome::Cancelled,
            Err(e) => AssetOutcome::Failed(e.to_string()),
        }
    }

    /// One generation attempt for one asset
    async fn generate(&self, card: &Card, kind: AssetKind) -> GenerationResult<Vec<u8>> {
        let config = &self.config;
        match kind {
            AssetKind::Image => {
                let request = ImageRequest {
                    model: config.image_model.clone(),
                    prompt: config.image_prompt(card),
                    size: config.image_size.clone(),
                    quality: config.image_quality.clone(),
                    output_format: IMAGE_OUTPUT_FORMAT.to_string(),
                };
                self.generator.generate_image(&request).await
            }
            AssetKind::Audio => {
                let instructions = config.audio_instructions.trim();
                let request = SpeechRequest {
                    model: config.tts_model.clone(),
                    voice: config.voice.clone(),
                    input: card.phrase.clone(),
                    format: config.audio_format.clone(),
                    instructions: (!instructions.is_empty()).then(|| instructions.to_string()),
                };
                self.generator.synthesize_speech(&request).await
            }
            AssetKind::Mnemonic => {
                let Some(ref mnemonics) = self.mnemonics else {
                    return Err(GenerationError::SessionFailed(
                        "no mnemonic generator configured".to_string(),
                    ));
                };
                // A session already started is not interrupted by build cancellation
                mnemonics
                    .generate_mnemonic(card, &CancellationToken::new())
                    .await
            }
        }
    }
}

fn final_status_text(progress: &BuildProgress, export_error: Option<&str>) -> String {
    let mut text = match progress.status {
        BuildStatus::Cancelled => format!(
            "Cancelled: {}/{} assets processed, {} failed",
            progress.completed, progress.total, progress.failed
        ),
        _ => format!(
            "Done: {}/{} assets, {} failed",
            progress.completed, progress.total, progress.failed
        ),
    };
    if let Some(err) = export_error {
        text.push_str(&format!("; export failed: {}", err));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_status_text() {
        let mut progress = BuildProgress::new(4);
        progress.completed = 4;
        progress.failed = 1;
        progress.status = BuildStatus::Done;
        assert_eq!(final_status_text(&progress, None), "Done: 4/4 assets, 1 failed");

        progress.status = BuildStatus::Cancelled;
        progress.completed = 2;
        assert_eq!(
            final_status_text(&progress, Some("disk full")),
            "Cancelled: 2/4 assets processed, 1 failed; export failed: disk full"
        );
    }
}

//! Deck exporter
//!
//! Writes `<export>/<runId>.tsv`, one row per card:
//! `phrase, translation, image-tag, audio-tag[, mnemonic-tag]`.
//! Media references are bare filenames (Anki resolves them against its
//! `collection.media` folder); a missing asset leaves its column empty.

use cardforge_common::{AssetKind, Card};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::error::{GenerationError, GenerationResult};
use crate::models::NameMaps;

/// Export options
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Emit the fifth (mnemonic) column
    pub include_mnemonics: bool,
    /// Skip cards without any media (used for cancelled runs)
    pub only_cards_with_media: bool,
}

/// Replace characters that would break the TSV row structure
fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

fn image_tag(filename: Option<&str>) -> String {
    filename
        .map(|f| format!("<img src=\"{}\">", f))
        .unwrap_or_default()
}

fn sound_tag(filename: Option<&str>) -> String {
    filename
        .map(|f| format!("[sound:{}]", f))
        .unwrap_or_default()
}

fn render_row(card: &Card, names: &NameMaps, include_mnemonics: bool) -> String {
    let id: &Uuid = &card.id;
    let mut columns = vec![
        sanitize_field(&card.phrase),
        sanitize_field(&card.translation),
        image_tag(names.get(id, AssetKind::Image)),
        sound_tag(names.get(id, AssetKind::Audio)),
    ];
    if include_mnemonics {
        columns.push(sound_tag(names.get(id, AssetKind::Mnemonic)));
    }
    columns.join("\t")
}

/// Render the deck file contents; returns `(contents, row_count)`
pub fn render_deck(cards: &[Card], names: &NameMaps, options: ExportOptions) -> (String, usize) {
    let mut contents = String::new();
    let mut rows = 0;

    for card in cards {
        if options.only_cards_with_media && !names.has_any(&card.id) {
            continue;
        }
        contents.push_str(&render_row(card, names, options.include_mnemonics));
        contents.push('\n');
        rows += 1;
    }

    (contents, rows)
}

/// Write the deck to `deck_path` (temp + rename); returns the row count
pub async fn export_deck(
    deck_path: &Path,
    cards: &[Card],
    names: &NameMaps,
    options: ExportOptions,
) -> GenerationResult<usize> {
    let (contents, rows) = render_deck(cards, names, options);

    if let Some(parent) = deck_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            GenerationError::Export(format!(
                "Failed to create export folder {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = deck_path.with_extension("tsv.tmp");
    tokio::fs::write(&temp_path, contents.as_bytes())
        .await
        .map_err(|e| {
            GenerationError::Export(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;

    if let Err(e) = tokio::fs::rename(&temp_path, deck_path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(GenerationError::Export(format!(
            "Failed to move deck into {}: {}",
            deck_path.display(),
            e
        )));
    }

    info!(deck = %deck_path.display(), rows, "Deck exported");
    Ok(rows)
}

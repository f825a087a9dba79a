//! Per-card outcome passed from worker units to the aggregator

use cardforge_common::AssetKind;
use std::collections::HashMap;
use uuid::Uuid;

/// Resolved outcome of one asset of one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    /// Freshly generated and written under this filename
    Generated(String),
    /// Already present at the deterministic path and reused
    Existing(String),
    /// Failed after retries; message is the final error
    Failed(String),
    /// Cancellation observed before the asset was processed
    Cancelled,
}

impl AssetOutcome {
    /// Filename when the asset is available for export
    pub fn filename(&self) -> Option<&str> {
        match self {
            AssetOutcome::Generated(name) | AssetOutcome::Existing(name) => Some(name),
            AssetOutcome::Failed(_) | AssetOutcome::Cancelled => None,
        }
    }

    /// Whether the asset counts towards `completed`
    pub fn is_processed(&self) -> bool {
        !matches!(self, AssetOutcome::Cancelled)
    }
}

/// Immutable result of one card unit
///
/// Produced once by a worker, consumed once by the aggregator.
#[derive(Debug, Clone)]
pub struct CardResult {
    pub card_id: Uuid,
    pub card_index: usize,
    pub image: AssetOutcome,
    pub audio: AssetOutcome,
    /// `None` when mnemonics are not part of the build
    pub mnemonic: Option<AssetOutcome>,
}

impl CardResult {
    /// Outcomes in asset-kind order
    pub fn outcomes(&self) -> Vec<(AssetKind, &AssetOutcome)> {
        let mut outcomes = vec![
            (AssetKind::Image, &self.image),
            (AssetKind::Audio, &self.audio),
        ];
        if let Some(ref mnemonic) = self.mnemonic {
            outcomes.push((AssetKind::Mnemonic, mnemonic));
        }
        outcomes
    }
}

/// Card id → media filename, one map per asset kind
///
/// Insert-only: an entry exists only for an asset that was generated or
/// already present, and is never replaced or removed during a run.
#[derive(Debug, Clone, Default)]
pub struct NameMaps {
    pub image_names: HashMap<Uuid, String>,
    pub audio_names: HashMap<Uuid, String>,
    pub mnemonic_names: HashMap<Uuid, String>,
}

impl NameMaps {
    fn map(&self, kind: AssetKind) -> &HashMap<Uuid, String> {
        match kind {
            AssetKind::Image => &self.image_names,
            AssetKind::Audio => &self.audio_names,
            AssetKind::Mnemonic => &self.mnemonic_names,
        }
    }

    /// Record a filename; returns false if the card already had one
    pub fn record(&mut self, card_id: Uuid, kind: AssetKind, filename: &str) -> bool {
        let map = match kind {
            AssetKind::Image => &mut self.image_names,
            AssetKind::Audio => &mut self.audio_names,
            AssetKind::Mnemonic => &mut self.mnemonic_names,
        };
        if map.contains_key(&card_id) {
            return false;
        }
        map.insert(card_id, filename.to_string());
        true
    }

    pub fn get(&self, card_id: &Uuid, kind: AssetKind) -> Option<&str> {
        self.map(kind).get(card_id).map(String::as_str)
    }

    /// Whether the card has at least one media file
    pub fn has_any(&self, card_id: &Uuid) -> bool {
        self.image_names.contains_key(card_id)
            || self.audio_names.contains_key(card_id)
            || self.mnemonic_names.contains_key(card_id)
    }

    /// All recorded filenames
    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.image_names
            .values()
            .chain(self.audio_names.values())
            .chain(self.mnemonic_names.values())
            .map(String::as_str)
    }
}

//! Build configuration snapshot
//!
//! A `BuildConfig` is frozen when a build starts and shared as
//! `Arc<BuildConfig>`; editing settings afterwards never reaches a running build.

use cardforge_common::{AssetKind, Card};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::utils::retry::RetryPolicy;

pub const DEFAULT_IMAGE_PROMPT_TEMPLATE: &str = "Create a simple, memorable illustration that conveys the meaning of \"{translation}\" (\"{phrase}\"). Do not include any text or letters in the image.";
pub const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
pub const DEFAULT_IMAGE_QUALITY: &str = "medium";
pub const DEFAULT_TTS_MODEL: &str = "gpt-4o-mini-tts";
pub const DEFAULT_VOICE: &str = "alloy";
pub const DEFAULT_AUDIO_FORMAT: &str = "mp3";
pub const DEFAULT_GROUP_SIZE: usize = 10;
pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECONDS: u64 = 2;

/// Images are always requested as JPEG and stored as `img.jpg`
pub const IMAGE_OUTPUT_FORMAT: &str = "jpeg";
pub const IMAGE_EXTENSION: &str = "jpg";
/// Mnemonic PCM is wrapped into WAV before it is written
pub const MNEMONIC_EXTENSION: &str = "wav";

/// What to do when a media file already exists at the deterministic path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingMediaPolicy {
    /// Reuse the existing file; no network call is made for it
    #[default]
    Skip,
    /// Regenerate and replace the file
    Overwrite,
}

/// Immutable configuration for one build run
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Template with `{phrase}` and `{translation}` placeholders
    pub image_prompt_template: String,
    /// Appended to every image prompt when non-empty
    pub global_image_style: String,
    pub image_model: String,
    pub image_size: String,
    pub image_quality: String,
    pub tts_model: String,
    pub voice: String,
    /// Speech output format; also the audio file extension
    pub audio_format: String,
    /// Optional speaking-style instructions for the TTS model
    pub audio_instructions: String,
    /// Cards per concurrent group
    pub group_size: usize,
    /// Attempts per asset (1 = no retry)
    pub retry_count: u32,
    pub retry_delay: Duration,
    /// Generate a spoken mnemonic per card as a third asset
    pub include_mnemonics: bool,
    pub existing_media: ExistingMediaPolicy,
    /// Human label, prefix of generated run ids
    pub run_label: String,
    /// Explicit run id, set to resume a previous run
    pub run_id: Option<String>,
    /// Receives `<runId>.tsv` and `media/`
    pub export_folder: PathBuf,
    /// Optional Anki `collection.media` folder for the post-build copy
    pub anki_media_folder: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            image_prompt_template: DEFAULT_IMAGE_PROMPT_TEMPLATE.to_string(),
            global_image_style: String::new(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            image_size: DEFAULT_IMAGE_SIZE.to_string(),
            image_quality: DEFAULT_IMAGE_QUALITY.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            audio_format: DEFAULT_AUDIO_FORMAT.to_string(),
            audio_instructions: String::new(),
            group_size: DEFAULT_GROUP_SIZE,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECONDS),
            include_mnemonics: false,
            existing_media: ExistingMediaPolicy::Skip,
            run_label: "deck".to_string(),
            run_id: None,
            export_folder: cardforge_common::config::default_export_folder(),
            anki_media_folder: None,
        }
    }
}

impl BuildConfig {
    /// Asset kinds generated per card, in export column order
    pub fn asset_kinds(&self) -> Vec<AssetKind> {
        let mut kinds = vec![AssetKind::Image, AssetKind::Audio];
        if self.include_mnemonics {
            kinds.push(AssetKind::Mnemonic);
        }
        kinds
    }

    /// Expand the prompt template for a card, appending the global style
    pub fn image_prompt(&self, card: &Card) -> String {
        let prompt = self
            .image_prompt_template
            .replace("{phrase}", &card.phrase)
            .replace("{translation}", &card.translation);

        let style = self.global_image_style.trim();
        if style.is_empty() {
            prompt
        } else {
            format!("{}\n\nStyle: {}", prompt, style)
        }
    }

    /// Explicit run id, or `<label>_<YYYYMMDD-HHMMSS>-<6 hex>`
    ///
    /// The random suffix keeps two builds started in the same second from
    /// sharing media filenames.
    pub fn resolve_run_id(&self, now: DateTime<Utc>) -> String {
        if let Some(ref run_id) = self.run_id {
            if !run_id.trim().is_empty() {
                return sanitize_label(run_id);
            }
        }
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}_{}-{}",
            sanitize_label(&self.run_label),
            now.format("%Y%m%d-%H%M%S"),
            &suffix[..6]
        )
    }

    pub fn media_dir(&self) -> PathBuf {
        self.export_folder.join("media")
    }

    pub fn deck_path(&self, run_id: &str) -> PathBuf {
        self.export_folder.join(format!("{}.tsv", run_id))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, self.retry_delay)
    }

    /// File extension for an asset kind
    pub fn extension(&self, kind: AssetKind) -> &str {
        match kind {
            AssetKind::Image => IMAGE_EXTENSION,
            AssetKind::Audio => &self.audio_format,
            AssetKind::Mnemonic => MNEMONIC_EXTENSION,
        }
    }

    /// `<runId>_<0000-padded index>_<kind>.<ext>`
    pub fn media_filename(&self, run_id: &str, card_index: usize, kind: AssetKind) -> String {
        format!(
            "{}_{:04}_{}.{}",
            run_id,
            card_index,
            kind.file_segment(),
            self.extension(kind)
        )
    }
}

/// Keep `[A-Za-z0-9_-]`, replace everything else with `-`
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();

    if cleaned.is_empty() {
        "deck".to_string()
    } else {
        cleaned
    }
}

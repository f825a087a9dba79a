//! Configuration resolution for cardforge-ai
//!
//! Turns the TOML file, environment and per-request overrides into the
//! immutable snapshots the core consumes (`BuildConfig`, `RealtimeConfig`,
//! `ClientOptions`).
//!
//! **Priority:** overrides (CLI flags / request body) → ENV → TOML → defaults

use cardforge_common::config::{anki_media_folder_for_profile, TomlConfig};
use cardforge_common::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{BuildConfig, ExistingMediaPolicy};
use crate::realtime::RealtimeConfig;
use crate::services::ClientOptions;

/// Environment variable holding the generation API key
pub const API_KEY_ENV: &str = "CARDFORGE_API_KEY";

/// Resolve the API key from the environment, then TOML
///
/// The key itself is never logged, only its source.
pub fn resolve_api_key(toml_config: &TomlConfig) -> Result<String> {
    let env_key = std::env::var(API_KEY_ENV).ok();
    select_api_key(env_key, toml_config.api_key.as_deref())
}

/// Pick a key from the two sources (ENV wins)
pub fn select_api_key(env_key: Option<String>, toml_key: Option<&str>) -> Result<String> {
    let env_key = env_key.filter(|k| is_valid_key(k));
    let toml_key = toml_key.filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("API key found in both environment and TOML config. Using environment.");
    }

    if let Some(key) = env_key {
        info!("API key loaded from environment variable");
        return Ok(key.trim().to_string());
    }

    if let Some(key) = toml_key {
        info!("API key loaded from TOML config");
        return Ok(key.trim().to_string());
    }

    Err(Error::Config(format!(
        "API key not configured. Please configure using one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: api_key = \"your-key\" in cardforge.toml",
        API_KEY_ENV
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Per-build overrides from CLI flags or an HTTP request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildOverrides {
    pub run_label: Option<String>,
    pub run_id: Option<String>,
    pub export_folder: Option<PathBuf>,
    pub include_mnemonics: Option<bool>,
    pub group_size: Option<usize>,
    pub overwrite_existing_media: Option<bool>,
    pub global_image_style: Option<String>,
    pub voice: Option<String>,
    pub retry_count: Option<u32>,
}

/// Freeze a `BuildConfig` from TOML settings plus overrides
pub fn build_config_from(toml_config: &TomlConfig, overrides: &BuildOverrides) -> BuildConfig {
    let defaults = BuildConfig::default();
    let generation = &toml_config.generation;

    let overwrite = overrides
        .overwrite_existing_media
        .or(generation.overwrite_existing_media)
        .unwrap_or(false);

    BuildConfig {
        image_prompt_template: generation
            .image_prompt_template
            .clone()
            .unwrap_or(defaults.image_prompt_template),
        global_image_style: overrides
            .global_image_style
            .clone()
            .or_else(|| generation.global_image_style.clone())
            .unwrap_or(defaults.global_image_style),
        image_model: generation.image_model.clone().unwrap_or(defaults.image_model),
        image_size: generation.image_size.clone().unwrap_or(defaults.image_size),
        image_quality: generation
            .image_quality
            .clone()
            .unwrap_or(defaults.image_quality),
        tts_model: generation.tts_model.clone().unwrap_or(defaults.tts_model),
        voice: overrides
            .voice
            .clone()
            .or_else(|| generation.voice.clone())
            .unwrap_or(defaults.voice),
        audio_format: generation
            .audio_format
            .clone()
            .unwrap_or(defaults.audio_format),
        audio_instructions: generation
            .audio_instructions
            .clone()
            .unwrap_or(defaults.audio_instructions),
        group_size: overrides
            .group_size
            .or(generation.group_size)
            .unwrap_or(defaults.group_size)
            .max(1),
        retry_count: overrides
            .retry_count
            .or(generation.retry_count)
            .unwrap_or(defaults.retry_count)
            .max(1),
        retry_delay: generation
            .retry_delay_seconds
            .map(Duration::from_secs)
            .unwrap_or(defaults.retry_delay),
        include_mnemonics: overrides
            .include_mnemonics
            .or(generation.include_mnemonics)
            .unwrap_or(defaults.include_mnemonics),
        existing_media: if overwrite {
            ExistingMediaPolicy::Overwrite
        } else {
            ExistingMediaPolicy::Skip
        },
        run_label: overrides
            .run_label
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(defaults.run_label),
        run_id: overrides.run_id.clone().filter(|r| !r.trim().is_empty()),
        export_folder: overrides
            .export_folder
            .clone()
            .or_else(|| toml_config.export_folder.clone())
            .unwrap_or(defaults.export_folder),
        anki_media_folder: resolve_anki_media_folder(toml_config),
    }
}

/// Explicit `anki_media_folder`, else the folder of `anki_profile`
pub fn resolve_anki_media_folder(toml_config: &TomlConfig) -> Option<PathBuf> {
    if let Some(ref folder) = toml_config.anki_media_folder {
        return Some(folder.clone());
    }
    toml_config
        .anki_profile
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .and_then(anki_media_folder_for_profile)
}

pub fn client_options_from(toml_config: &TomlConfig) -> ClientOptions {
    let mut options = ClientOptions::default();
    if let Some(ref base_url) = toml_config.api_base_url {
        options.base_url = base_url.clone();
    }
    options.max_requests_per_second = toml_config.generation.max_requests_per_second;
    options
}

pub fn realtime_config_from(toml_config: &TomlConfig) -> RealtimeConfig {
    let mut config = RealtimeConfig::default();
    let generation = &toml_config.generation;

    if let Some(ref url) = toml_config.realtime_url {
        config.url = url.clone();
    }
    if let Some(ref model) = generation.realtime_model {
        config.model = model.clone();
    }
    // Separate from the TTS voice: several TTS voices do not exist in realtime
    if let Some(ref voice) = generation.realtime_voice {
        config.voice = voice.clone();
    }
    if let Some(ref instructions) = generation.mnemonic_instructions {
        config.instructions = instructions.clone();
    }
    if let Some(ref events) = generation.completion_events {
        let events: HashSet<String> = events
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
        if events.is_empty() {
            warn!("completion_events is empty, keeping the default set");
        } else {
            config.completion_events = events;
        }
    }
    config
}

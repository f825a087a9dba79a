//! Configuration loading and path resolution
//!
//! cardforge reads a single TOML file, `<config_dir>/cardforge/cardforge.toml`.
//! Every field is optional: a missing file or a missing key falls back to the
//! built-in defaults, so a fresh install starts without any configuration.
//!
//! Priority order applied by the binaries:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables (`CARDFORGE_*`)
//! 3. TOML config file
//! 4. Built-in defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "CARDFORGE_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// API key for the generation backend
    ///
    /// Prefer the `CARDFORGE_API_KEY` environment variable. cardforge only
    /// reads this file and never writes the key back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the HTTP generation API (default: OpenAI v1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    /// WebSocket URL of the realtime endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime_url: Option<String>,

    /// Folder receiving `<runId>.tsv` and `media/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_folder: Option<PathBuf>,

    /// Anki `collection.media` folder to copy generated media into after a build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anki_media_folder: Option<PathBuf>,

    /// Anki profile name, used to locate `collection.media` when
    /// `anki_media_folder` is not set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anki_profile: Option<String>,

    /// HTTP server port for `serve`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Generation defaults (prompt, voice, concurrency, retry)
    #[serde(default)]
    pub generation: GenerationSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[generation]` table: optional overrides of the build defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_prompt_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_image_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_model: Option<String>,
    /// Realtime voice; TTS-only voices are rejected by the realtime endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_voice: Option<String>,
    /// Event types that end a realtime response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_events: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnemonic_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_mnemonics: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwrite_existing_media: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests_per_second: Option<u32>,
}

/// Resolve the config file path
///
/// `CARDFORGE_CONFIG` wins; otherwise the platform config dir
/// (`~/.config` on Linux, `~/Library/Application Support` on macOS).
pub fn config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("cardforge").join("cardforge.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load TOML config, degrading to defaults when the file is missing
///
/// A file that exists but does not parse is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Default export folder: `~/Documents/Cardforge` (falls back to `./cardforge-export`)
pub fn default_export_folder() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .map(|d| d.join("Cardforge"))
        .unwrap_or_else(|| PathBuf::from("./cardforge-export"))
}

/// Locate an Anki profile's `collection.media` folder
///
/// Anki keeps profiles under `<data_dir>/Anki2/<profile>`. Returns `None` when
/// the folder does not exist; the caller treats the copy step as optional.
pub fn anki_media_folder_for_profile(profile: &str) -> Option<PathBuf> {
    let folder = dirs::data_dir()?
        .join("Anki2")
        .join(profile)
        .join("collection.media");
    folder.is_dir().then_some(folder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_generation_table() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cardforge.toml");
        std::fs::write(
            &path,
            "[generation]\nvoice = \"nova\"\ngroup_size = 4\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = load_toml_config(&path).unwrap();
        assert_eq!(config.generation.voice.as_deref(), Some("nova"));
        assert_eq!(config.generation.group_size, Some(4));
        assert_eq!(config.generation.retry_count, None);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cardforge.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
    }
}

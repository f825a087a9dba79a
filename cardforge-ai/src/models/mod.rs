//! Data models for cardforge-ai

pub mod build_config;
pub mod card_result;

pub use build_config::{BuildConfig, ExistingMediaPolicy};
pub use card_result::{AssetOutcome, CardResult, NameMaps};

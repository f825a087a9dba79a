//! # cardforge common library
//!
//! Shared code for the cardforge crates:
//! - Error types
//! - TOML configuration loading
//! - Card model and TSV input parsing
//! - Event types and the broadcast `EventBus`
//! - SSE forwarding of bus events

pub mod cards;
pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use cards::{AssetKind, Card};
pub use error::{Error, Result};

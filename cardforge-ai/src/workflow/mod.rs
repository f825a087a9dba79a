//! Deck build workflow
//!
//! - [`build_pipeline`]: grouped, concurrent, retrying generation of card media
//! - [`aggregator`]: single consumer applying card results to progress and name maps

pub mod aggregator;
pub mod build_pipeline;

pub use aggregator::{Aggregator, ProgressPublisher};
pub use build_pipeline::{BuildPipeline, BuildReport};

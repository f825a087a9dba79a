//! Utility modules for cardforge-ai

pub mod retry;

pub use retry::{retry_with_policy, RetryPolicy};

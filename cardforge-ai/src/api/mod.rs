//! HTTP API handlers for cardforge-ai
//!
//! REST endpoints for builds and mnemonics plus an SSE progress stream.

pub mod builds;
pub mod health;
pub mod mnemonic;
pub mod sse;

pub use builds::build_routes;
pub use health::health_routes;
pub use mnemonic::mnemonic_routes;
pub use sse::event_stream;

use cardforge_common::config::{default_export_folder, TomlConfig};
use std::path::{Component, Path, PathBuf};

use crate::error::{ApiError, ApiResult};

/// Folder HTTP clients may write into
pub fn export_root(settings: &TomlConfig) -> PathBuf {
    settings
        .export_folder
        .clone()
        .unwrap_or_else(default_export_folder)
}

/// Resolve a client-supplied path inside `root`
///
/// Relative paths are taken relative to `root`. Absolute paths must already
/// lie under it. `..` components are rejected outright, so the check is
/// purely lexical and never touches the filesystem.
pub fn confine_to_root(root: &Path, requested: &Path) -> ApiResult<PathBuf> {
    let escapes = requested
        .components()
        .any(|c| matches!(c, Component::ParentDir));
    if escapes {
        return Err(ApiError::BadRequest(format!(
            "Path must not contain '..': {}",
            requested.display()
        )));
    }

    let resolved = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };

    if !resolved.starts_with(root) {
        return Err(ApiError::BadRequest(format!(
            "Path must be inside the export folder {}: {}",
            root.display(),
            requested.display()
        )));
    }
    Ok(resolved)
}

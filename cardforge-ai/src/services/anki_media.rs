//! Post-build copy of generated media into an Anki `collection.media` folder
//!
//! The folder must already exist (Anki creates it per profile); files with
//! the same name are replaced.

use std::path::Path;
use tracing::{info, warn};

use crate::error::{GenerationError, GenerationResult};

/// Copy `filenames` from `media_dir` into `anki_media_dir`
///
/// Missing sources are skipped with a warning. Returns the number of files copied.
pub async fn copy_media_to_anki<'a, I>(
    media_dir: &Path,
    anki_media_dir: &Path,
    filenames: I,
) -> GenerationResult<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let is_dir = tokio::fs::metadata(anki_media_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(GenerationError::Export(format!(
            "Anki media folder not found: {}",
            anki_media_dir.display()
        )));
    }

    let mut copied = 0;
    for filename in filenames {
        let source = media_dir.join(filename);
        if !source.is_file() {
            warn!(file = %filename, "Media file missing, not copied to Anki");
            continue;
        }

        tokio::fs::copy(&source, anki_media_dir.join(filename))
            .await
            .map_err(|e| {
                GenerationError::Export(format!("Failed to copy {} into Anki: {}", filename, e))
            })?;
        copied += 1;
    }

    info!(
        anki_media = %anki_media_dir.display(),
        copied,
        "Media copied to Anki collection"
    );
    Ok(copied)
}

//! Service modules for deck builds
//!
//! Generation client, media storage, deck export and the Anki media copy.

pub mod anki_media;
pub mod exporter;
pub mod generation_client;
pub mod media_store;

pub use anki_media::copy_media_to_anki;
pub use exporter::{export_deck, render_deck, ExportOptions};
pub use generation_client::{
    ClientOptions, ImageRequest, MediaGenerator, OpenAiClient, SpeechRequest,
    DEFAULT_API_BASE_URL,
};
pub use media_store::MediaStore;

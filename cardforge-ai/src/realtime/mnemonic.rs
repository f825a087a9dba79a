//! Spoken mnemonics
//!
//! A mnemonic is one realtime session per card; the PCM16 output is wrapped
//! into a WAV container before it reaches the media folder.

use async_trait::async_trait;
use cardforge_common::Card;
use std::io::Cursor;
use tokio_util::sync::CancellationToken;

use super::session::{RealtimeConfig, RealtimeSession};
use crate::error::{GenerationError, GenerationResult};

/// Realtime audio is 24 kHz mono PCM16
pub const REALTIME_SAMPLE_RATE: u32 = 24_000;

/// Produces WAV-encoded mnemonic audio for a card
#[async_trait]
pub trait MnemonicGenerator: Send + Sync {
    async fn generate_mnemonic(
        &self,
        card: &Card,
        cancel: &CancellationToken,
    ) -> GenerationResult<Vec<u8>>;
}

/// `MnemonicGenerator` backed by a fresh realtime session per call
#[derive(Debug)]
pub struct RealtimeMnemonicGenerator {
    api_key: String,
    config: RealtimeConfig,
}

impl RealtimeMnemonicGenerator {
    pub fn new(api_key: String, config: RealtimeConfig) -> Self {
        Self { api_key, config }
    }
}

#[async_trait]
impl MnemonicGenerator for RealtimeMnemonicGenerator {
    async fn generate_mnemonic(
        &self,
        card: &Card,
        cancel: &CancellationToken,
    ) -> GenerationResult<Vec<u8>> {
        let session = RealtimeSession::new(self.api_key.clone(), self.config.clone());
        let output = session.run(&card.phrase, cancel).await?;
        pcm16_to_wav(&output.audio_pcm, REALTIME_SAMPLE_RATE)
    }
}

/// Wrap little-endian mono PCM16 into a WAV file; a trailing odd byte is dropped
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> GenerationResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut buffer, spec)
            .map_err(|e| GenerationError::Io(format!("WAV header: {}", e)))?;
        for chunk in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))
                .map_err(|e| GenerationError::Io(format!("WAV sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| GenerationError::Io(format!("WAV finalize: {}", e)))?;
    }

    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_to_wav() {
        let pcm: Vec<u8> = [0i16, 1000, -1000, i16::MAX]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        let wav = pcm16_to_wav(&pcm, REALTIME_SAMPLE_RATE).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 1000, -1000, i16::MAX]);
    }

    #[test]
    fn test_odd_trailing_byte_dropped() {
        let wav = pcm16_to_wav(&[1, 0, 7], 16_000).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.len(), 1);
    }
}

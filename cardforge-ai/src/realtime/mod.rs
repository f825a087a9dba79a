//! Realtime streaming client for spoken mnemonics

pub mod mnemonic;
pub mod protocol;
pub mod session;

pub use mnemonic::{pcm16_to_wav, MnemonicGenerator, RealtimeMnemonicGenerator};
pub use protocol::{ClientCommand, ServerEvent, DEFAULT_COMPLETION_EVENTS};
pub use session::{
    RealtimeConfig, RealtimeOutput, RealtimeSession, RealtimeSessionState, SessionPhase,
};

//! Realtime session state machine
//!
//! One WebSocket exchange producing spoken audio plus text for a single word:
//!
//! ```text
//! Connecting → AwaitingSessionReady → SessionConfigured → AwaitingItemAck
//!            → AwaitingResponse → Completed
//! ```
//!
//! `Failed` and `TimedOut` are reachable from every non-terminal phase.
//!
//! The session-ready and item-ack waits are advisory: when they elapse the
//! session moves on regardless. Only the overall deadline, measured from the
//! start of the connect, is fatal. All waits are receive-with-timeout on the
//! socket; nothing polls.

use base64::Engine;
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{ClientCommand, ServerEvent, DEFAULT_COMPLETION_EVENTS};
use crate::error::{GenerationError, GenerationResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";
pub const DEFAULT_MNEMONIC_INSTRUCTIONS: &str = "You create short, vivid mnemonics. When given \"Target: <word>\", say the word clearly, then give one memorable sentence that links its sound to its meaning. Keep it under 15 seconds.";

/// Realtime session configuration
#[derive(Clone)]
pub struct RealtimeConfig {
    /// WebSocket endpoint; `?model=` is appended when `model` is non-empty
    pub url: String,
    pub model: String,
    pub voice: String,
    pub instructions: String,
    /// Advisory wait for `session.created`/`session.updated`
    pub session_ready_wait: Duration,
    /// Advisory wait for `conversation.item.created`
    pub item_ack_wait: Duration,
    /// Overall bound from connect to completion
    pub response_timeout: Duration,
    /// Event types that complete the response
    pub completion_events: HashSet<String>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REALTIME_URL.to_string(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            voice: "alloy".to_string(),
            instructions: DEFAULT_MNEMONIC_INSTRUCTIONS.to_string(),
            session_ready_wait: Duration::from_secs(20),
            item_ack_wait: Duration::from_secs(3),
            response_timeout: Duration::from_secs(45),
            completion_events: DEFAULT_COMPLETION_EVENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("response_timeout", &self.response_timeout)
            .finish_non_exhaustive()
    }
}

impl RealtimeConfig {
    pub fn endpoint_url(&self) -> String {
        if self.model.is_empty() {
            return self.url.clone();
        }
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}model={}", self.url, separator, self.model)
    }
}

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    AwaitingSessionReady,
    SessionConfigured,
    AwaitingItemAck,
    AwaitingResponse,
    Completed,
    Failed,
    TimedOut,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Completed | SessionPhase::Failed | SessionPhase::TimedOut
        )
    }
}

/// Mutable state of one session
#[derive(Debug, Clone)]
pub struct RealtimeSessionState {
    pub phase: SessionPhase,
    /// Decoded PCM16 audio
    pub audio: Vec<u8>,
    pub text: String,
    pub terminal_error: Option<String>,
}

impl Default for RealtimeSessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Connecting,
            audio: Vec::new(),
            text: String::new(),
            terminal_error: None,
        }
    }
}

impl RealtimeSessionState {
    fn transition(&mut self, phase: SessionPhase) {
        debug!(from = ?self.phase, to = ?phase, "Realtime phase change");
        self.phase = phase;
    }

    fn fail(&mut self, phase: SessionPhase, error: &GenerationError) {
        self.transition(phase);
        self.terminal_error = Some(error.to_string());
    }
}

/// Result of a completed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeOutput {
    /// PCM16 mono little-endian audio
    pub audio_pcm: Vec<u8>,
    pub text: String,
}

/// How an awaited step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    /// The awaited event arrived
    Arrived,
    /// The advisory wait elapsed
    Elapsed,
    /// A completion event arrived
    Completed,
}

/// Event the current step waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Awaited {
    SessionReady,
    ItemAck,
    Completion,
}

/// One-shot realtime generation
pub struct RealtimeSession {
    api_key: String,
    config: RealtimeConfig,
}

impl fmt::Debug for RealtimeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeSession")
            .field("config", &self.config)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl RealtimeSession {
    pub fn new(api_key: String, config: RealtimeConfig) -> Self {
        Self { api_key, config }
    }

    /// Run a session for `word` with fresh state
    pub async fn run(
        &self,
        word: &str,
        cancel: &CancellationToken,
    ) -> GenerationResult<RealtimeOutput> {
        let mut state = RealtimeSessionState::default();
        self.run_with_state(word, cancel, &mut state).await
    }

    /// Run a session for `word`, leaving the final phase and buffers in `state`
    pub async fn run_with_state(
        &self,
        word: &str,
        cancel: &CancellationToken,
        state: &mut RealtimeSessionState,
    ) -> GenerationResult<RealtimeOutput> {
        let started = Instant::now();
        let deadline = started + self.config.response_timeout;

        let result = self.drive(word, cancel, state, deadline).await;

        match &result {
            Ok(output) => info!(
                word = %word,
                audio_bytes = output.audio_pcm.len(),
                text_chars = output.text.chars().count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Realtime session completed"
            ),
            Err(e) => warn!(
                word = %word,
                phase = ?state.phase,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "Realtime session failed"
            ),
        }

        result
    }

    async fn drive(
        &self,
        word: &str,
        cancel: &CancellationToken,
        state: &mut RealtimeSessionState,
        deadline: Instant,
    ) -> GenerationResult<RealtimeOutput> {
        if cancel.is_cancelled() {
            state.fail(SessionPhase::Failed, &GenerationError::Cancelled);
            return Err(GenerationError::Cancelled);
        }

        state.transition(SessionPhase::Connecting);
        let mut ws = match self.connect(deadline).await {
            Ok(ws) => ws,
            Err(e) => {
                let phase = match e {
                    GenerationError::TimedOut(_) => SessionPhase::TimedOut,
                    _ => SessionPhase::Failed,
                };
                state.fail(phase, &e);
                return Err(e);
            }
        };

        let result = self.converse(&mut ws, word, cancel, state, deadline).await;
        let _ = ws.close(None).await;

        match result {
            Ok(()) => {
                if state.audio.is_empty() {
                    state.terminal_error = Some(GenerationError::NoAudioReceived.to_string());
                    return Err(GenerationError::NoAudioReceived);
                }
                Ok(RealtimeOutput {
                    audio_pcm: std::mem::take(&mut state.audio),
                    text: state.text.clone(),
                })
            }
            Err(e) => {
                if !state.phase.is_terminal() {
                    state.fail(SessionPhase::Failed, &e);
                }
                Err(e)
            }
        }
    }

    async fn connect(&self, deadline: Instant) -> GenerationResult<WsStream> {
        let mut request = self.config.endpoint_url().into_client_request()?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| GenerationError::Network("API key is not a valid header value".to_string()))?;
        request.headers_mut().insert("Authorization", auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        match tokio::time::timeout_at(deadline, tokio_tungstenite::connect_async(request)).await {
            Ok(Ok((ws, _response))) => {
                debug!(url = %self.config.url, "Realtime socket connected");
                Ok(ws)
            }
            Ok(Err(e)) => Err(GenerationError::Network(format!("Realtime connect failed: {}", e))),
            Err(_) => Err(self.timed_out()),
        }
    }

    /// Handshake, submit, and accumulate until completion
    async fn converse(
        &self,
        ws: &mut WsStream,
        word: &str,
        cancel: &CancellationToken,
        state: &mut RealtimeSessionState,
        deadline: Instant,
    ) -> GenerationResult<()> {
        send(ws, &ClientCommand::session_update(&self.config.voice, &self.config.instructions))
            .await?;
        state.transition(SessionPhase::AwaitingSessionReady);

        // A completion seen during an advisory wait still lets the remaining
        // commands go out; only the final completion wait is skipped.
        let mut completed = false;

        let ready_until = Instant::now() + self.config.session_ready_wait;
        match self
            .await_event(ws, cancel, state, Awaited::SessionReady, ready_until, deadline)
            .await?
        {
            WaitOutcome::Completed => completed = true,
            WaitOutcome::Elapsed => {
                debug!("No session acknowledgment, continuing");
            }
            WaitOutcome::Arrived => {}
        }
        if !completed {
            state.transition(SessionPhase::SessionConfigured);
        }

        send(ws, &ClientCommand::target_word(word)).await?;

        if !completed {
            state.transition(SessionPhase::AwaitingItemAck);
            let ack_until = Instant::now() + self.config.item_ack_wait;
            match self
                .await_event(ws, cancel, state, Awaited::ItemAck, ack_until, deadline)
                .await?
            {
                WaitOutcome::Completed => completed = true,
                WaitOutcome::Elapsed => {
                    debug!("No item acknowledgment, requesting response anyway");
                }
                WaitOutcome::Arrived => {}
            }
        }

        send(ws, &ClientCommand::response_create()).await?;

        if completed {
            debug!("Completion arrived before the response request");
            return self.complete(state);
        }

        state.transition(SessionPhase::AwaitingResponse);
        self.await_event(ws, cancel, state, Awaited::Completion, deadline, deadline)
            .await?;
        self.complete(state)
    }

    fn complete(&self, state: &mut RealtimeSessionState) -> GenerationResult<()> {
        state.transition(SessionPhase::Completed);
        Ok(())
    }

    fn timed_out(&self) -> GenerationError {
        GenerationError::TimedOut(self.config.response_timeout.as_millis() as u64)
    }

    /// Receive events until `awaited` arrives, a completion arrives, or
    /// `wait_until` passes. Deltas are accumulated along the way.
    async fn await_event(
        &self,
        ws: &mut WsStream,
        cancel: &CancellationToken,
        state: &mut RealtimeSessionState,
        awaited: Awaited,
        wait_until: Instant,
        deadline: Instant,
    ) -> GenerationResult<WaitOutcome> {
        let until = wait_until.min(deadline);

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    state.fail(SessionPhase::Failed, &GenerationError::Cancelled);
                    return Err(GenerationError::Cancelled);
                }
                frame = tokio::time::timeout_at(until, ws.next()) => frame,
            };

            let message = match frame {
                Err(_) if until >= deadline => {
                    let err = self.timed_out();
                    state.fail(SessionPhase::TimedOut, &err);
                    return Err(err);
                }
                Err(_) => return Ok(WaitOutcome::Elapsed),
                Ok(None) => {
                    return Err(GenerationError::Network(
                        "Realtime socket closed before completion".to_string(),
                    ))
                }
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(message))) => message,
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    return Err(GenerationError::Network(format!(
                        "Realtime socket closed by server: {}",
                        frame.map(|f| f.reason.to_string()).unwrap_or_default()
                    )))
                }
                _ => continue,
            };

            let event = match ServerEvent::decode(text.as_str(), &self.config.completion_events) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Ignoring undecodable realtime frame");
                    continue;
                }
            };

            match event {
                ServerEvent::Error(message) => {
                    let err = GenerationError::SessionFailed(message);
                    state.fail(SessionPhase::Failed, &err);
                    return Err(err);
                }
                ServerEvent::Completed(event_type) => {
                    debug!(event = %event_type, "Realtime completion event");
                    return Ok(WaitOutcome::Completed);
                }
                ServerEvent::AudioDelta(chunk) => {
                    match base64::engine::general_purpose::STANDARD.decode(chunk.as_bytes()) {
                        Ok(bytes) => state.audio.extend_from_slice(&bytes),
                        Err(e) => warn!(error = %e, "Dropping undecodable audio chunk"),
                    }
                }
                ServerEvent::TextDelta(chunk) => state.text.push_str(&chunk),
                ServerEvent::SessionReady if awaited == Awaited::SessionReady => {
                    return Ok(WaitOutcome::Arrived)
                }
                ServerEvent::ItemCreated if awaited == Awaited::ItemAck => {
                    return Ok(WaitOutcome::Arrived)
                }
                ServerEvent::SessionReady | ServerEvent::ItemCreated => {}
                ServerEvent::Unrecognized(event_type) => {
                    debug!(event = %event_type, "Ignoring realtime event");
                }
            }
        }
    }
}

async fn send(ws: &mut WsStream, command: &ClientCommand) -> GenerationResult<()> {
    let json = command.to_json()?;
    ws.send(Message::Text(json.into())).await?;
    debug!(command = command.type_name(), "Realtime command sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        let mut config = RealtimeConfig::default();
        assert_eq!(
            config.endpoint_url(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview"
        );

        config.url = "ws://127.0.0.1:9000/rt?x=1".to_string();
        config.model = "m".to_string();
        assert_eq!(config.endpoint_url(), "ws://127.0.0.1:9000/rt?x=1&model=m");

        config.model.clear();
        assert_eq!(config.endpoint_url(), "ws://127.0.0.1:9000/rt?x=1");
    }

    #[test]
    fn test_terminal_phases() {
        assert!(SessionPhase::Completed.is_terminal());
        assert!(SessionPhase::TimedOut.is_terminal());
        assert!(!SessionPhase::AwaitingItemAck.is_terminal());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let session = RealtimeSession::new("sk-secret".to_string(), RealtimeConfig::default());
        assert!(!format!("{:?}", session).contains("sk-secret"));
    }

    #[tokio::test]
    async fn test_cancelled_before_connect() {
        let session = RealtimeSession::new("k".to_string(), RealtimeConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut state = RealtimeSessionState::default();
        let result = session.run_with_state("lune", &cancel, &mut state).await;

        assert_eq!(result.unwrap_err(), GenerationError::Cancelled);
        assert_eq!(state.phase, SessionPhase::Failed);
    }
}

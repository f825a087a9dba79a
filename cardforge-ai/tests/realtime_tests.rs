//! Realtime session tests against a scripted local WebSocket server

use base64::Engine;
use cardforge_ai::error::GenerationError;
use cardforge_ai::realtime::{
    MnemonicGenerator, RealtimeConfig, RealtimeMnemonicGenerator, RealtimeSession,
    RealtimeSessionState, SessionPhase,
};
use cardforge_common::Card;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Server behavior: events sent on connect, replies per received command type
#[derive(Default)]
struct Script {
    on_connect: Vec<Value>,
    replies: HashMap<&'static str, Vec<Value>>,
}

impl Script {
    fn reply(mut self, command: &'static str, events: Vec<Value>) -> Self {
        self.replies.insert(command, events);
        self
    }
}

/// What the server observed
struct Observed {
    commands: Vec<String>,
    authorization: Option<String>,
}

async fn spawn_server(script: Script) -> (String, JoinHandle<Observed>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();

        let mut authorization = None;
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            authorization = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok(response)
        };
        let mut ws = accept_hdr_async(stream, callback).await.unwrap();

        for event in &script.on_connect {
            ws.send(Message::Text(event.to_string().into())).await.unwrap();
        }

        let mut commands = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            let command = value["type"].as_str().unwrap_or_default().to_string();

            if let Some(events) = script.replies.get(command.as_str()) {
                for event in events {
                    if ws.send(Message::Text(event.to_string().into())).await.is_err() {
                        break;
                    }
                }
            }
            commands.push(command);
        }

        Observed {
            commands,
            authorization,
        }
    });

    (format!("ws://{}/v1/realtime", addr), handle)
}

fn test_config(url: String) -> RealtimeConfig {
    RealtimeConfig {
        url,
        session_ready_wait: Duration::from_millis(200),
        item_ack_wait: Duration::from_millis(100),
        response_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn audio_delta(bytes: &[u8]) -> Value {
    json!({
        "type": "response.audio.delta",
        "delta": base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}

fn full_script() -> Script {
    Script {
        on_connect: vec![json!({"type": "session.created"})],
        ..Default::default()
    }
    .reply("session.update", vec![json!({"type": "session.updated"})])
    .reply(
        "conversation.item.create",
        vec![json!({"type": "conversation.item.created"})],
    )
    .reply(
        "response.create",
        vec![
            audio_delta(&[1, 0, 2, 0]),
            json!({"type": "response.audio_transcript.delta", "delta": "Luna, "}),
            audio_delta(&[3, 0]),
            json!({"type": "response.audio_transcript.delta", "delta": "the moon."}),
            json!({"type": "response.done"}),
        ],
    )
}

#[tokio::test]
async fn test_session_completes_with_audio_and_text() {
    let (url, server) = spawn_server(full_script()).await;
    let session = RealtimeSession::new("sk-test".to_string(), test_config(url));

    let mut state = RealtimeSessionState::default();
    let output = session
        .run_with_state("lune", &CancellationToken::new(), &mut state)
        .await
        .unwrap();

    assert_eq!(output.audio_pcm, vec![1, 0, 2, 0, 3, 0]);
    assert_eq!(output.text, "Luna, the moon.");
    assert_eq!(state.phase, SessionPhase::Completed);

    let observed = server.await.unwrap();
    assert_eq!(
        observed.commands,
        vec!["session.update", "conversation.item.create", "response.create"]
    );
    assert_eq!(observed.authorization.as_deref(), Some("Bearer sk-test"));
}

#[tokio::test]
async fn test_missing_acknowledgments_still_request_response() {
    // No session.created and no item ack: both advisory waits elapse
    let script = Script::default().reply(
        "response.create",
        vec![audio_delta(&[9, 9]), json!({"type": "response.done"})],
    );
    let (url, server) = spawn_server(script).await;
    let session = RealtimeSession::new("k".to_string(), test_config(url));

    let output = session
        .run("lune", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(output.audio_pcm, vec![9, 9]);

    let observed = server.await.unwrap();
    assert_eq!(observed.commands.last().map(String::as_str), Some("response.create"));
}

#[tokio::test]
async fn test_no_completion_times_out_within_bound() {
    let script = full_script().reply("response.create", vec![audio_delta(&[1, 2])]);
    let (url, server) = spawn_server(script).await;
    let config = RealtimeConfig {
        response_timeout: Duration::from_millis(800),
        ..test_config(url)
    };
    let session = RealtimeSession::new("k".to_string(), config);

    let started = Instant::now();
    let mut state = RealtimeSessionState::default();
    let result = session
        .run_with_state("lune", &CancellationToken::new(), &mut state)
        .await;

    assert!(matches!(result, Err(GenerationError::TimedOut(_))));
    assert_eq!(state.phase, SessionPhase::TimedOut);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(800), "timed out early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(800) + Duration::from_secs(2));
    server.await.unwrap();
}

#[tokio::test]
async fn test_error_event_fails_session() {
    let script = full_script().reply(
        "response.create",
        vec![json!({"type": "error", "error": {"message": "quota exceeded"}})],
    );
    let (url, server) = spawn_server(script).await;
    let session = RealtimeSession::new("k".to_string(), test_config(url));

    let mut state = RealtimeSessionState::default();
    let result = session
        .run_with_state("lune", &CancellationToken::new(), &mut state)
        .await;

    assert_eq!(
        result.unwrap_err(),
        GenerationError::SessionFailed("quota exceeded".to_string())
    );
    assert_eq!(state.phase, SessionPhase::Failed);
    assert_eq!(state.terminal_error.as_deref().map(|e| e.contains("quota")), Some(true));
    server.await.unwrap();
}

#[tokio::test]
async fn test_completion_without_audio() {
    let script = full_script().reply(
        "response.create",
        vec![
            json!({"type": "response.text.delta", "delta": "silence"}),
            json!({"type": "response.done"}),
        ],
    );
    let (url, server) = spawn_server(script).await;
    let session = RealtimeSession::new("k".to_string(), test_config(url));

    let result = session.run("lune", &CancellationToken::new()).await;

    assert_eq!(result.unwrap_err(), GenerationError::NoAudioReceived);
    server.await.unwrap();
}

#[tokio::test]
async fn test_early_completion_still_sends_remaining_commands() {
    let script = Script {
        on_connect: vec![audio_delta(&[5, 5]), json!({"type": "response.done"})],
        ..Default::default()
    };
    let (url, server) = spawn_server(script).await;
    let session = RealtimeSession::new("k".to_string(), test_config(url));

    let mut state = RealtimeSessionState::default();
    let output = session
        .run_with_state("lune", &CancellationToken::new(), &mut state)
        .await
        .unwrap();
    assert_eq!(output.audio_pcm, vec![5, 5]);
    assert_eq!(state.phase, SessionPhase::Completed);

    let observed = server.await.unwrap();
    assert_eq!(
        observed.commands,
        vec!["session.update", "conversation.item.create", "response.create"]
    );
}

#[tokio::test]
async fn test_completion_during_item_wait_still_requests_response() {
    // Completion arrives before any item acknowledgment
    let script = Script::default().reply(
        "conversation.item.create",
        vec![audio_delta(&[4, 4]), json!({"type": "response.done"})],
    );
    let (url, server) = spawn_server(script).await;
    let session = RealtimeSession::new("k".to_string(), test_config(url));

    let started = Instant::now();
    let output = session
        .run("lune", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(output.audio_pcm, vec![4, 4]);
    // The final completion wait is skipped
    assert!(started.elapsed() < Duration::from_secs(2));

    let observed = server.await.unwrap();
    assert_eq!(
        observed.commands,
        vec!["session.update", "conversation.item.create", "response.create"]
    );
}

#[tokio::test]
async fn test_configured_completion_event() {
    let script = full_script().reply(
        "response.create",
        vec![
            audio_delta(&[7, 0]),
            json!({"type": "custom.finished"}),
            // Never reached
            audio_delta(&[8, 0]),
        ],
    );
    let (url, server) = spawn_server(script).await;
    let config = RealtimeConfig {
        completion_events: ["custom.finished".to_string()].into_iter().collect(),
        ..test_config(url)
    };
    let session = RealtimeSession::new("k".to_string(), config);

    let output = session
        .run("lune", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(output.audio_pcm, vec![7, 0]);
    server.await.unwrap();
}

#[tokio::test]
async fn test_mnemonic_generator_returns_wav() {
    let (url, server) = spawn_server(full_script()).await;
    let generator = RealtimeMnemonicGenerator::new("k".to_string(), test_config(url));

    let wav = generator
        .generate_mnemonic(&Card::new(1, "lune", "moon"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");
    server.await.unwrap();
}

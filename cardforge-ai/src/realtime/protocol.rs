//! Realtime wire protocol
//!
//! Outgoing commands are a serde-tagged enum. Incoming JSON is decoded once
//! at the socket boundary into [`ServerEvent`]; types the session does not
//! act on become [`ServerEvent::Unrecognized`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{GenerationError, GenerationResult};

/// Event types that complete a response unless configured otherwise
pub const DEFAULT_COMPLETION_EVENTS: &[&str] = &[
    "response.done",
    "response.text.done",
    "response.audio_transcript.done",
    "response.output_audio_transcript.done",
];

const SESSION_READY_EVENTS: &[&str] = &["session.created", "session.updated"];
const ITEM_ACK_EVENT: &str = "conversation.item.created";
const ERROR_EVENT: &str = "error";
const AUDIO_DELTA_EVENTS: &[&str] = &["response.audio.delta", "response.output_audio.delta"];
const TEXT_DELTA_EVENTS: &[&str] = &[
    "response.text.delta",
    "response.output_text.delta",
    "response.audio_transcript.delta",
    "response.output_audio_transcript.delta",
];

// ============================================================================
// Client → server
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionSettings },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseSettings },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSettings {
    pub modalities: Vec<String>,
    pub voice: String,
    pub instructions: String,
    pub output_audio_format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSettings {
    pub modalities: Vec<String>,
}

fn audio_and_text() -> Vec<String> {
    vec!["audio".to_string(), "text".to_string()]
}

impl ClientCommand {
    /// Session configuration: audio + text output as raw PCM16
    pub fn session_update(voice: &str, instructions: &str) -> Self {
        ClientCommand::SessionUpdate {
            session: SessionSettings {
                modalities: audio_and_text(),
                voice: voice.to_string(),
                instructions: instructions.to_string(),
                output_audio_format: "pcm16".to_string(),
            },
        }
    }

    /// User message framing the target word
    pub fn target_word(word: &str) -> Self {
        ClientCommand::ConversationItemCreate {
            item: ConversationItem {
                item_type: "message".to_string(),
                role: "user".to_string(),
                content: vec![ContentPart {
                    part_type: "input_text".to_string(),
                    text: format!("Target: {}", word),
                }],
            },
        }
    }

    pub fn response_create() -> Self {
        ClientCommand::ResponseCreate {
            response: ResponseSettings {
                modalities: audio_and_text(),
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ClientCommand::SessionUpdate { .. } => "session.update",
            ClientCommand::ConversationItemCreate { .. } => "conversation.item.create",
            ClientCommand::ResponseCreate { .. } => "response.create",
        }
    }

    pub fn to_json(&self) -> GenerationResult<String> {
        serde_json::to_string(self).map_err(|e| {
            GenerationError::MalformedResponse(format!("Failed to encode {}: {}", self.type_name(), e))
        })
    }
}

// ============================================================================
// Server → client
// ============================================================================

/// Server event, as far as the session cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// `session.created` / `session.updated`
    SessionReady,
    /// `conversation.item.created`
    ItemCreated,
    /// Base64 PCM16 chunk
    AudioDelta(String),
    /// Text or transcript chunk
    TextDelta(String),
    /// One of the configured completion event types
    Completed(String),
    /// Server-reported error with its message
    Error(String),
    /// Anything else; carries the event type for logging
    Unrecognized(String),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    error: Option<RawError>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl ServerEvent {
    /// Decode one text frame
    ///
    /// Completion names are checked after `error` and before the delta
    /// types, so a configured name always terminates the response.
    pub fn decode(text: &str, completion_events: &HashSet<String>) -> GenerationResult<Self> {
        let raw: RawEvent = serde_json::from_str(text)
            .map_err(|e| GenerationError::MalformedResponse(format!("Invalid server event: {}", e)))?;

        let event_type = raw.event_type.as_str();

        if event_type == ERROR_EVENT {
            let message = raw
                .error
                .and_then(|e| e.message.or(e.code))
                .unwrap_or_else(|| "unknown realtime error".to_string());
            return Ok(ServerEvent::Error(message));
        }

        if completion_events.contains(event_type) {
            return Ok(ServerEvent::Completed(raw.event_type));
        }

        let event = if AUDIO_DELTA_EVENTS.contains(&event_type) {
            ServerEvent::AudioDelta(raw.delta.unwrap_or_default())
        } else if TEXT_DELTA_EVENTS.contains(&event_type) {
            ServerEvent::TextDelta(raw.delta.unwrap_or_default())
        } else if SESSION_READY_EVENTS.contains(&event_type) {
            ServerEvent::SessionReady
        } else if event_type == ITEM_ACK_EVENT {
            ServerEvent::ItemCreated
        } else {
            ServerEvent::Unrecognized(raw.event_type)
        };

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> HashSet<String> {
        DEFAULT_COMPLETION_EVENTS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_session_update_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&ClientCommand::session_update("alloy", "Be brief").to_json().unwrap())
                .unwrap();

        assert_eq!(json["type"], "session.update");
        assert_eq!(json["session"]["modalities"], json!(["audio", "text"]));
        assert_eq!(json["session"]["voice"], "alloy");
        assert_eq!(json["session"]["output_audio_format"], "pcm16");
    }

    #[test]
    fn test_target_word_shape() {
        let json = serde_json::to_value(ClientCommand::target_word("lune")).unwrap();
        assert_eq!(json["type"], "conversation.item.create");
        assert_eq!(json["item"]["type"], "message");
        assert_eq!(json["item"]["role"], "user");
        assert_eq!(json["item"]["content"][0]["type"], "input_text");
        assert_eq!(json["item"]["content"][0]["text"], "Target: lune");
    }

    #[test]
    fn test_decode_known_events() {
        let set = defaults();
        assert_eq!(
            ServerEvent::decode(r#"{"type":"session.created","session":{}}"#, &set).unwrap(),
            ServerEvent::SessionReady
        );
        assert_eq!(
            ServerEvent::decode(r#"{"type":"conversation.item.created"}"#, &set).unwrap(),
            ServerEvent::ItemCreated
        );
        assert_eq!(
            ServerEvent::decode(r#"{"type":"response.output_audio.delta","delta":"AAA="}"#, &set)
                .unwrap(),
            ServerEvent::AudioDelta("AAA=".to_string())
        );
        assert_eq!(
            ServerEvent::decode(r#"{"type":"response.audio_transcript.delta","delta":"Moon"}"#, &set)
                .unwrap(),
            ServerEvent::TextDelta("Moon".to_string())
        );
        assert_eq!(
            ServerEvent::decode(r#"{"type":"error","error":{"message":"bad key"}}"#, &set).unwrap(),
            ServerEvent::Error("bad key".to_string())
        );
    }

    #[test]
    fn test_completion_set_is_configurable() {
        let only_done: HashSet<String> = ["response.done".to_string()].into_iter().collect();
        let frame = r#"{"type":"response.text.done","text":"x"}"#;

        assert_eq!(
            ServerEvent::decode(frame, &defaults()).unwrap(),
            ServerEvent::Completed("response.text.done".to_string())
        );
        assert_eq!(
            ServerEvent::decode(frame, &only_done).unwrap(),
            ServerEvent::Unrecognized("response.text.done".to_string())
        );
    }

    #[test]
    fn test_decode_unrecognized_and_invalid() {
        let set = defaults();
        assert_eq!(
            ServerEvent::decode(r#"{"type":"rate_limits.updated"}"#, &set).unwrap(),
            ServerEvent::Unrecognized("rate_limits.updated".to_string())
        );
        assert!(matches!(
            ServerEvent::decode("not json", &set),
            Err(GenerationError::MalformedResponse(_))
        ));
    }
}

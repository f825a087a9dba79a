//! Generation API client
//!
//! Stateless HTTP wrapper for the two generation endpoints consumed by a build:
//! - `POST {base}/images/generations` → base64 image payload
//! - `POST {base}/audio/speech` → raw audio bytes
//!
//! One request/response exchange per call. No retries here; the build
//! pipeline layers `utils::retry` on top.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use crate::error::{GenerationError, GenerationResult};

/// Default API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Default timeout for generation requests (image generation is slow)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest server message kept in a `RemoteService` error
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Image generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub quality: String,
    pub output_format: String,
}

/// Text-to-speech request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechRequest {
    pub model: String,
    pub voice: String,
    pub input: String,
    /// Audio container/codec, e.g. "mp3"
    #[serde(rename = "response_format")]
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Media generation backend
///
/// Implemented by `OpenAiClient`; tests substitute scripted stubs.
#[async_trait]
pub trait MediaGenerator: Send + Sync {
    /// Generate one image and return its decoded bytes
    async fn generate_image(&self, request: &ImageRequest) -> GenerationResult<Vec<u8>>;

    /// Synthesize speech and return the audio bytes
    async fn synthesize_speech(&self, request: &SpeechRequest) -> GenerationResult<Vec<u8>>;
}

/// Client options
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout: Duration,
    /// Client-side request rate limit; `None` disables limiting
    pub max_requests_per_second: Option<u32>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_requests_per_second: None,
        }
    }
}

/// HTTP client for an OpenAI-compatible generation API
pub struct OpenAiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: Option<governor::DefaultDirectRateLimiter>,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish()
    }
}

impl OpenAiClient {
    /// Create a client for `options.base_url`
    pub fn new(api_key: String, options: ClientOptions) -> GenerationResult<Self> {
        let http_client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| GenerationError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let rate_limiter = options
            .max_requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rps| governor::RateLimiter::direct(governor::Quota::per_second(rps)));

        Ok(Self {
            http_client,
            api_key,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            rate_limiter,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn wait_for_quota(&self) {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.until_ready().await;
        }
    }

    /// POST JSON and return the response if its status is a success
    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> GenerationResult<reqwest::Response> {
        self.wait_for_quota().await;

        let response = self
            .http_client
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::Network(format!("{} request failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::RemoteService {
                status_code: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl MediaGenerator for OpenAiClient {
    async fn generate_image(&self, request: &ImageRequest) -> GenerationResult<Vec<u8>> {
        debug!(
            model = %request.model,
            size = %request.size,
            quality = %request.quality,
            prompt_length = request.prompt.len(),
            "Requesting image generation"
        );

        let body = ImageGenerationBody {
            model: &request.model,
            prompt: &request.prompt,
            size: &request.size,
            quality: &request.quality,
            output_format: &request.output_format,
            n: 1,
        };

        let response = self.post_json("images/generations", &body).await?;
        let payload: ImageGenerationResponse = response.json().await.map_err(|e| {
            GenerationError::MalformedResponse(format!("Failed to parse image response: {}", e))
        })?;

        decode_image_payload(payload)
    }

    async fn synthesize_speech(&self, request: &SpeechRequest) -> GenerationResult<Vec<u8>> {
        debug!(
            model = %request.model,
            voice = %request.voice,
            format = %request.format,
            input_length = request.input.len(),
            "Requesting speech synthesis"
        );

        let response = self.post_json("audio/speech", request).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerationError::Network(format!("Failed to read speech body: {}", e)))?;

        if bytes.is_empty() {
            return Err(GenerationError::MalformedResponse(
                "Speech response body is empty".to_string(),
            ));
        }

        Ok(bytes.to_vec())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ImageGenerationBody<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    quality: &'a str,
    output_format: &'a str,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn decode_image_payload(payload: ImageGenerationResponse) -> GenerationResult<Vec<u8>> {
    let Some(encoded) = payload.data.into_iter().find_map(|d| d.b64_json) else {
        return Err(GenerationError::MalformedResponse(
            "Image response has no b64_json payload".to_string(),
        ));
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| GenerationError::MalformedResponse(format!("Invalid base64 image: {}", e)))?;

    if bytes.is_empty() {
        return Err(GenerationError::MalformedResponse(
            "Image payload is empty".to_string(),
        ));
    }

    Ok(bytes)
}

/// Server message from `{"error": {"message": ...}}`, or the raw body
fn extract_error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.error.message;
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

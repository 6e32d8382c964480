//! Generative model access.
//!
//! `TextModel` and `ImageModel` are the seams the pipeline is tested
//! through; `GeminiClient` is the production implementation speaking the
//! Gemini `generateContent` REST surface.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bon::Builder;
use governor::{
    RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub type ModelRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;

/// Errors produced by model calls.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("missing GOOGLE_AI_API_KEY or GEMINI_API_KEY environment variable")]
    MissingApiKey,
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model API returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("model response contained no candidates")]
    NoCandidates,
    #[error("model response contained no text part")]
    MissingTextPayload,
    #[error("model response contained no image part")]
    MissingImagePayload,
    #[error("model returned undecodable image data: {0}")]
    InvalidImagePayload(#[from] base64::DecodeError),
    #[error("{0}")]
    Message(String),
}

impl ModelError {
    pub fn message(msg: impl Into<String>) -> Self {
        ModelError::Message(msg.into())
    }
}

/// One generated raster image, already decoded from the wire encoding.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate_text(&self, system: &str, prompt: &str) -> Result<String, ModelError>;
}

#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, ModelError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

/// Client for the Gemini `generateContent` endpoint.
///
/// One instance serves both the text and the image model; the rate limiter
/// (when provided) paces every outbound call.
#[derive(Clone, Builder)]
pub struct GeminiClient {
    #[builder(into)]
    api_key: String,
    #[builder(into)]
    text_model: String,
    #[builder(into)]
    image_model: String,
    #[builder(into, default = GEMINI_BASE_URL.to_string())]
    base_url: String,
    #[builder(default = default_http_client())]
    http: Client,
    limiter: Option<Arc<ModelRateLimiter>>,
    #[builder(default = 0.7)]
    temperature: f32,
    #[builder(default = DEFAULT_MAX_OUTPUT_TOKENS)]
    max_output_tokens: u32,
}

fn default_http_client() -> Client {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .expect("default HTTP client must build")
}

impl GeminiClient {
    /// Construct from environment credentials, matching the deployment
    /// convention of `GOOGLE_AI_API_KEY` with `GEMINI_API_KEY` as fallback.
    pub fn from_env(
        text_model: impl Into<String>,
        image_model: impl Into<String>,
        limiter: Option<Arc<ModelRateLimiter>>,
    ) -> Result<Self, ModelError> {
        let api_key = std::env::var("GOOGLE_AI_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| ModelError::MissingApiKey)?;

        Ok(Self::builder()
            .api_key(api_key)
            .text_model(text_model)
            .image_model(image_model)
            .maybe_limiter(limiter)
            .build())
    }

    async fn invoke(
        &self,
        model: &str,
        request: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse, ModelError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn generate_text(&self, system: &str, prompt: &str) -> Result<String, ModelError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![RequestPart { text: prompt }],
            }],
            system_instruction: (!system.is_empty()).then(|| Content {
                role: None,
                parts: vec![RequestPart { text: system }],
            }),
            generation_config: Some(GenerationConfig {
                temperature: Some(self.temperature),
                max_output_tokens: Some(self.max_output_tokens),
                response_modalities: None,
            }),
        };

        let response = self.invoke(&self.text_model, &request).await?;
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or(ModelError::NoCandidates)?;

        let text = candidate
            .content
            .into_iter()
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(ModelError::MissingTextPayload);
        }

        debug!(model = %self.text_model, chars = text.len(), "text generation complete");
        Ok(text)
    }
}

#[async_trait]
impl ImageModel for GeminiClient {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, ModelError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![RequestPart { text: prompt }],
            }],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                temperature: Some(self.temperature),
                max_output_tokens: None,
                response_modalities: Some(vec!["IMAGE", "TEXT"]),
            }),
        };

        let response = self.invoke(&self.image_model, &request).await?;
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or(ModelError::NoCandidates)?;

        let inline = candidate
            .content
            .into_iter()
            .flat_map(|content| content.parts)
            .filter_map(|part| part.inline_data)
            .next()
            .ok_or(ModelError::MissingImagePayload)?;

        let bytes = BASE64_STANDARD.decode(inline.data.as_bytes())?;
        debug!(
            model = %self.image_model,
            mime_type = %inline.mime_type,
            size = bytes.len(),
            "image generation complete"
        );

        Ok(GeneratedImage {
            bytes,
            mime_type: inline.mime_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization_uses_camel_case() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![RequestPart { text: "hello" }],
            }],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                temperature: Some(0.0),
                max_output_tokens: Some(64),
                response_modalities: Some(vec!["IMAGE", "TEXT"]),
            }),
        };

        let encoded = serde_json::to_value(&request).expect("serializes");
        let config = &encoded["generationConfig"];
        assert_eq!(config["maxOutputTokens"], 64);
        assert_eq!(config["responseModalities"][0], "IMAGE");
        assert!(encoded.get("systemInstruction").is_none());
    }

    #[test]
    fn response_deserialization_accepts_inline_data() {
        let raw = r#"{
            "candidates": [
                { "content": { "parts": [
                    { "text": "caption" },
                    { "inlineData": { "mimeType": "image/png", "data": "aGk=" } }
                ] } }
            ]
        }"#;

        let parsed: GenerateContentResponse = serde_json::from_str(raw).expect("parses");
        let parts = &parsed.candidates[0].content.as_ref().expect("content").parts;
        assert_eq!(parts[0].text.as_deref(), Some("caption"));
        let inline = parts[1].inline_data.as_ref().expect("inline data");
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(BASE64_STANDARD.decode(&inline.data).expect("decodes"), b"hi");
    }

    #[test]
    fn empty_candidate_lists_deserialize() {
        let parsed: GenerateContentResponse = serde_json::from_str("{}").expect("parses");
        assert!(parsed.candidates.is_empty());
    }
}

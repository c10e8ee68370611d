//! OpenAI-compatible adapters (OpenAI, xAI Grok, and other gateways that
//! speak the same API).

use super::ProviderClient;
use super::http::HttpBase;
use crate::error::ProviderError;
use crate::models::{GenerationRequest, Payload};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

/// Chat completions in JSON mode.
pub struct OpenAiChatClient {
    base: HttpBase,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(base: HttpBase, model: &str) -> Self {
        Self {
            base,
            model: model.to_string(),
        }
    }

    fn body(&self, request: &GenerationRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if !request.system_instruction.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: request.system_instruction.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.user_instruction.clone(),
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
            response_format: (!request.schema.is_empty()).then_some(ResponseFormat { kind: "json_object" }),
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiChatClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    fn timeout(&self) -> Duration {
        self.base.timeout
    }

    #[instrument(level = "info", skip_all, fields(provider = %self.base.id, model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Payload, ProviderError> {
        let api_key = self.base.require_api_key()?;
        let url = self.base.build_url("/chat/completions");
        let body = self.body(request);

        info!(messages = body.messages.len(), "Sending chat completion request");
        let response: ChatResponse = self
            .base
            .send_json(self.base.http.post(&url).bearer_auth(api_key).json(&body))
            .await?;
        payload_from_chat(response)
    }
}

/// Resolve a chat response into a payload.
///
/// Gateways that pre-parse JSON mode output put it in `message.parsed`; that
/// wins over the raw `content` string.
pub fn payload_from_chat(response: ChatResponse) -> Result<Payload, ProviderError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .ok_or_else(|| ProviderError::empty_content("response contained no choices"))?;

    if let Some(Value::Object(map)) = message.parsed {
        return Ok(Payload::Structured(map));
    }

    match message.content {
        Some(content) if !content.trim().is_empty() => Ok(Payload::RawText(content)),
        _ => match message.refusal {
            Some(refusal) => Err(ProviderError::empty_content(format!("model refused: {refusal}"))),
            None => Err(ProviderError::empty_content("message has no content")),
        },
    }
}

/// `/images/generations` (xAI Grok image models).
pub struct OpenAiImageClient {
    base: HttpBase,
    model: String,
}

impl OpenAiImageClient {
    pub fn new(base: HttpBase, model: &str) -> Self {
        Self {
            base,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiImageClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    fn timeout(&self) -> Duration {
        self.base.timeout
    }

    #[instrument(level = "info", skip_all, fields(provider = %self.base.id, model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Payload, ProviderError> {
        let api_key = self.base.require_api_key()?;
        let url = self.base.build_url("/images/generations");
        let body = ImageRequest {
            model: self.model.clone(),
            prompt: request.user_instruction.clone(),
            n: 1,
            response_format: "url",
        };

        info!(prompt_chars = body.prompt.chars().count(), "Sending image generation request");
        let response: ImageResponse = self
            .base
            .send_json(self.base.http.post(&url).bearer_auth(api_key).json(&body))
            .await?;
        payload_from_images(response)
    }
}

/// Resolve an image generation response into a payload.
pub fn payload_from_images(response: ImageResponse) -> Result<Payload, ProviderError> {
    let image = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::empty_content("response contained no images"))?;

    if let Some(url) = image.url.filter(|u| !u.trim().is_empty()) {
        let url = Url::parse(&url)
            .map_err(|e| ProviderError::invalid_schema(format!("image url `{url}` is invalid: {e}")))?;
        return Ok(Payload::ImageUrl(url));
    }

    match image.b64_json {
        Some(data) if !data.trim().is_empty() => {
            let bytes = BASE64
                .decode(data.trim())
                .map_err(|e| ProviderError::invalid_schema(format!("b64_json is not base64: {e}")))?;
            Ok(Payload::ImageBytes {
                bytes,
                mime: "image/jpeg".to_string(),
            })
        }
        _ => Err(ProviderError::empty_content("image entry has neither url nor b64_json")),
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    parsed: Option<Value>,
    refusal: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    n: u8,
    response_format: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

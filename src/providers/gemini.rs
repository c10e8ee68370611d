//! Google Gemini `generateContent` adapters for JSON text and for images.

use super::ProviderClient;
use super::http::HttpBase;
use crate::error::ProviderError;
use crate::models::{GenerationRequest, Payload};
use async_trait::async_trait;
use base64::Engine;
use reqwest::RequestBuilder;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, instrument};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// POST to `generateContent`, key in a header so it never appears in a URL.
fn generate_request(base: &HttpBase, model: &str, api_key: &str) -> RequestBuilder {
    base.http
        .post(base.build_url(&format!("/models/{model}:generateContent")))
        .header(API_KEY_HEADER, api_key)
}

/// Gemini in JSON response mode.
pub struct GeminiChatClient {
    base: HttpBase,
    model: String,
}

impl GeminiChatClient {
    pub fn new(base: HttpBase, model: &str) -> Self {
        Self {
            base,
            model: model.to_string(),
        }
    }

    fn body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.user_instruction }]
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_output_tokens,
                "responseMimeType": "application/json"
            }
        });
        if !request.system_instruction.trim().is_empty() {
            body["systemInstruction"] = json!({
                "parts": [{ "text": request.system_instruction }]
            });
        }
        body
    }
}

#[async_trait]
impl ProviderClient for GeminiChatClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    fn timeout(&self) -> Duration {
        self.base.timeout
    }

    #[instrument(level = "info", skip_all, fields(provider = %self.base.id, model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Payload, ProviderError> {
        let api_key = self.base.require_api_key()?;
        let post = generate_request(&self.base, &self.model, api_key);

        info!("Sending generateContent request");
        let response: GenerateContentResponse = self.base.send_json(post.json(&self.body(request))).await?;
        text_from_response(response)
    }
}

/// Gemini with the IMAGE response modality, 16:9.
pub struct GeminiImageClient {
    base: HttpBase,
    model: String,
}

impl GeminiImageClient {
    pub fn new(base: HttpBase, model: &str) -> Self {
        Self {
            base,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ProviderClient for GeminiImageClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    fn timeout(&self) -> Duration {
        self.base.timeout
    }

    #[instrument(level = "info", skip_all, fields(provider = %self.base.id, model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Payload, ProviderError> {
        let api_key = self.base.require_api_key()?;
        let post = generate_request(&self.base, &self.model, api_key);
        let body = json!({
            "contents": [{ "parts": [{ "text": request.user_instruction }] }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": "16:9" }
            }
        });

        info!("Sending image generateContent request");
        let response: GenerateContentResponse =
            self.base.send_json(post.json(&body)).await?;
        image_from_response(response)
    }
}

/// First text part of the first candidate.
pub fn text_from_response(response: GenerateContentResponse) -> Result<Payload, ProviderError> {
    if let Some(reason) = response.blocked_reason() {
        return Err(ProviderError::empty_content(format!("prompt blocked: {reason}")));
    }
    response
        .into_parts()
        .find_map(|p| p.text.filter(|t| !t.trim().is_empty()))
        .map(Payload::RawText)
        .ok_or_else(|| ProviderError::empty_content("response has no text part"))
}

/// First inline-data part, base64-decoded.
pub fn image_from_response(response: GenerateContentResponse) -> Result<Payload, ProviderError> {
    if let Some(reason) = response.blocked_reason() {
        return Err(ProviderError::empty_content(format!("prompt blocked: {reason}")));
    }
    let inline = response
        .into_parts()
        .find_map(|p| p.inline_data)
        .ok_or_else(|| ProviderError::empty_content("response has no inline image data"))?;
    let bytes = BASE64
        .decode(inline.data.trim())
        .map_err(|e| ProviderError::invalid_schema(format!("inline data is not base64: {e}")))?;
    Ok(Payload::ImageBytes {
        bytes,
        mime: inline.mime_type,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    fn blocked_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_deref())
    }

    fn into_parts(self) -> impl Iterator<Item = Part> {
        self.candidates
            .into_iter()
            .take(1)
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default = "default_mime")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn default_mime() -> String {
    "image/png".to_string()
}

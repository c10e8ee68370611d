//! Hugging Face text-to-image inference (FLUX and friends).

use super::ProviderClient;
use super::http::HttpBase;
use crate::error::ProviderError;
use crate::models::{GenerationRequest, Payload};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument};

pub const WIDTH: u32 = 1344;
pub const HEIGHT: u32 = 768;
pub const INFERENCE_STEPS: u32 = 26;
pub const GUIDANCE_SCALE: f32 = 7.0;

pub struct HuggingFaceImageClient {
    base: HttpBase,
    model: String,
}

impl HuggingFaceImageClient {
    pub fn new(base: HttpBase, model: &str) -> Self {
        Self {
            base,
            model: model.to_string(),
        }
    }

    fn body<'a>(&self, request: &'a GenerationRequest) -> InferenceRequest<'a> {
        InferenceRequest {
            inputs: &request.user_instruction,
            parameters: InferenceParameters {
                negative_prompt: request.negative_prompt.as_deref().filter(|n| !n.trim().is_empty()),
                width: WIDTH,
                height: HEIGHT,
                num_inference_steps: INFERENCE_STEPS,
                guidance_scale: GUIDANCE_SCALE,
            },
        }
    }
}

#[async_trait]
impl ProviderClient for HuggingFaceImageClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    fn timeout(&self) -> Duration {
        self.base.timeout
    }

    #[instrument(level = "info", skip_all, fields(provider = %self.base.id, model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Payload, ProviderError> {
        let api_key = self.base.require_api_key()?;
        let url = self.base.build_url(&self.model);

        info!(width = WIDTH, height = HEIGHT, "Sending text-to-image request");
        let (bytes, mime) = self
            .base
            .send_bytes(
                self.base
                    .http
                    .post(&url)
                    .bearer_auth(api_key)
                    .header("Accept", "image/png")
                    .json(&self.body(request)),
            )
            .await?;
        payload_from_body(bytes, &mime)
    }
}

/// A 200 with a JSON body is an error or a "model loading" notice, not an image.
pub fn payload_from_body(bytes: Vec<u8>, mime: &str) -> Result<Payload, ProviderError> {
    let mime = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
    if mime == "application/json" {
        let text = String::from_utf8_lossy(&bytes);
        return Err(ProviderError::invalid_schema(format!(
            "expected image bytes, got JSON: {}",
            crate::utils::truncate_for_log(text.trim(), 200)
        )));
    }
    if bytes.is_empty() {
        return Err(ProviderError::empty_content("empty image body"));
    }
    Ok(Payload::ImageBytes { bytes, mime })
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters<'a>,
}

#[derive(Serialize)]
struct InferenceParameters<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    width: u32,
    height: u32,
    num_inference_steps: u32,
    guidance_scale: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use url::Url;

    fn client() -> HuggingFaceImageClient {
        let base = HttpBase {
            id: "flux".to_string(),
            base_url: Url::parse("https://router.huggingface.co/hf-inference/models").unwrap(),
            api_key: Some("hf_test".to_string()),
            api_key_env: None,
            timeout: Duration::from_secs(60),
            http: reqwest::Client::new(),
        };
        HuggingFaceImageClient::new(base, "black-forest-labs/FLUX.1-schnell")
    }

    #[test]
    fn test_body_carries_landscape_parameters_and_negative_prompt() {
        let request = GenerationRequest {
            system_instruction: String::new(),
            user_instruction: "harbor at dawn".to_string(),
            schema: vec![],
            temperature: 0.0,
            max_output_tokens: 0,
            negative_prompt: Some("text, logo".to_string()),
        };
        let client = client();
        let body = serde_json::to_value(client.body(&request)).unwrap();
        assert_eq!(body["inputs"], "harbor at dawn");
        assert_eq!(body["parameters"]["width"], 1344);
        assert_eq!(body["parameters"]["height"], 768);
        assert_eq!(body["parameters"]["num_inference_steps"], 26);
        assert_eq!(body["parameters"]["negative_prompt"], "text, logo");
        assert_eq!(
            client.base.build_url(&client.model),
            "https://router.huggingface.co/hf-inference/models/black-forest-labs/FLUX.1-schnell"
        );
    }

    #[test]
    fn test_json_body_is_rejected() {
        let err = payload_from_body(br#"{"error":"Model is loading"}"#.to_vec(), "application/json; charset=utf-8")
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidSchema);
        assert!(err.detail.contains("Model is loading"));
    }

    #[test]
    fn test_image_body_passes_through() {
        let payload = payload_from_body(vec![0x89, b'P', b'N', b'G'], "image/png").unwrap();
        assert!(matches!(payload, Payload::ImageBytes { ref mime, .. } if mime == "image/png"));
        assert_eq!(payload_from_body(vec![], "image/png").unwrap_err().kind, FailureKind::EmptyContent);
    }
}

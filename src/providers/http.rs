//! Shared HTTP plumbing for provider adapters.
//!
//! Adapters only build a request body and decode a success body; sending,
//! authentication and mapping transport errors and HTTP statuses onto
//! [`FailureKind`](crate::error::FailureKind) happen here, so every backend
//! classifies failures the same way.

use crate::config::ProviderConfig;
use crate::error::{ConfigError, ProviderError};
use crate::utils::truncate_for_log;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Connection settings common to every adapter.
#[derive(Clone, Debug)]
pub struct HttpBase {
    pub id: String,
    pub base_url: Url,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout: Duration,
    pub http: Client,
}

impl HttpBase {
    pub fn from_config(config: &ProviderConfig, http: Client) -> Result<Self, ConfigError> {
        let raw = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.kind.default_base_url().to_string());
        let base_url = Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl {
            provider: config.id.clone(),
            url: raw.clone(),
        })?;

        Ok(Self {
            id: config.id.clone(),
            base_url,
            api_key: config.resolve_api_key(),
            api_key_env: config.api_key_env.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            http,
        })
    }

    /// Join `path` onto the base url without losing the base's own path.
    pub fn build_url(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    pub fn require_api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::unknown(format!(
                    "no API key configured (set {})",
                    self.api_key_env.as_deref().unwrap_or("api_key_env")
                ))
            })
    }

    /// Send and return the response if its status is a success.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        debug!(provider = %self.id, %status, "Provider responded");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify_status(status, &body);
        warn!(provider = %self.id, %status, kind = %err.kind, "Provider returned an error status");
        Err(err)
    }

    /// Send and decode a JSON success body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let body = self
            .send(request)
            .await?
            .text()
            .await
            .map_err(classify_reqwest)?;
        decode_json(&body)
    }

    /// Send and return the raw body plus its declared content type.
    pub async fn send_bytes(&self, request: RequestBuilder) -> Result<(Vec<u8>, String), ProviderError> {
        let response = self.send(request).await?;
        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await.map_err(classify_reqwest)?;
        Ok((bytes.to_vec(), mime))
    }
}

/// Decode a provider envelope; failures are schema failures.
pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_schema(format!(
            "undecodable response envelope ({e}): {}",
            truncate_for_log(body, 200)
        ))
    })
}

/// Map an HTTP error status onto a failure kind.
///
/// 429 and quota wording mean throttling; 408 and 5xx are transport-level;
/// everything else (bad key, bad request, content policy) is unknown.
pub fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let detail = format!("HTTP {}: {}", status.as_u16(), truncate_for_log(body.trim(), 200));
    let lowered = body.to_lowercase();

    if status == StatusCode::TOO_MANY_REQUESTS
        || lowered.contains("resource_exhausted")
        || lowered.contains("rate limit")
    {
        ProviderError::rate_limited(detail)
    } else if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        ProviderError::transport(detail)
    } else {
        ProviderError::unknown(detail)
    }
}

/// Map a `reqwest` error raised before or while reading a response.
///
/// The request URL is stripped first: some backends authenticate through
/// the query string and failure details end up in logs.
pub fn classify_reqwest(e: reqwest::Error) -> ProviderError {
    let e = e.without_url();
    if e.is_decode() {
        ProviderError::invalid_schema(e.to_string())
    } else if e.is_builder() {
        ProviderError::unknown(e.to_string())
    } else {
        ProviderError::transport(e.to_string())
    }
}

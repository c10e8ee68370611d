//! Permanent storage for generated images.
//!
//! Provider image links expire and raw bytes have nowhere to live, so every
//! winning image is copied to an [`ImageStore`] exactly once. There is no
//! fallback across stores: an upload failure fails the image task.

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::models::GeneratedImage;
use crate::utils::{slugify, truncate_for_log};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

const SLUG_MAX: usize = 48;
const BASE_TAGS: &[&str] = &["ai-generated", "photojournalism", "documentary", "landscape", "16:9"];

/// What an upload is about; used for naming and tagging.
#[derive(Debug, Clone)]
pub struct UploadMeta {
    pub topic: String,
    pub provider: String,
    pub generated_at: DateTime<Utc>,
}

impl UploadMeta {
    pub fn new(topic: &str, provider: &str) -> Self {
        Self {
            topic: topic.to_string(),
            provider: provider.to_string(),
            generated_at: Utc::now(),
        }
    }

    /// `news_{topic slug}_{UTC timestamp}_{provider}`
    pub fn public_id(&self) -> String {
        let slug: String = slugify(&self.topic, '_').chars().take(SLUG_MAX).collect();
        let slug = slug.trim_end_matches('_');
        let slug = if slug.is_empty() { "image" } else { slug };
        format!(
            "news_{slug}_{}_{}",
            self.generated_at.format("%Y%m%d_%H%M%S"),
            slugify(&self.provider, '_')
        )
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = BASE_TAGS.iter().map(|t| t.to_string()).collect();
        tags.insert(2, self.provider.clone());
        tags
    }
}

/// Copies a generated image somewhere permanent and returns its URL.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, image: &GeneratedImage, meta: &UploadMeta) -> Result<String, StorageError>;
}

/// Cloudinary unsigned upload through an upload preset.
pub struct CloudinaryStore {
    config: StorageConfig,
    http: Client,
}

impl CloudinaryStore {
    pub fn new(config: StorageConfig, http: Client) -> Self {
        Self { config, http }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            urlencoding::encode(&self.config.cloud_name)
        )
    }

    /// Form fields for one upload. Bytes travel as a data URI; remote links
    /// are fetched by Cloudinary itself.
    pub fn form(&self, image: &GeneratedImage, meta: &UploadMeta) -> Vec<(&'static str, String)> {
        let file = match image {
            GeneratedImage::Bytes { bytes, mime } => format!("data:{mime};base64,{}", BASE64.encode(bytes)),
            GeneratedImage::Url(url) => url.to_string(),
        };
        vec![
            ("file", file),
            ("upload_preset", self.config.upload_preset.clone()),
            ("folder", self.config.folder.clone()),
            ("public_id", meta.public_id()),
            ("tags", meta.tags().join(",")),
        ]
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

#[async_trait]
impl ImageStore for CloudinaryStore {
    #[instrument(level = "info", skip_all, fields(provider = %meta.provider, folder = %self.config.folder))]
    async fn upload(&self, image: &GeneratedImage, meta: &UploadMeta) -> Result<String, StorageError> {
        let response = self
            .http
            .post(self.endpoint())
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .form(&self.form(image, meta))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body: truncate_for_log(body.trim(), 300),
            });
        }

        let parsed: UploadResponse = serde_json::from_str(&body).map_err(|_| StorageError::MissingField("secure_url"))?;
        let url = parsed
            .secure_url
            .or(parsed.url)
            .filter(|u| !u.trim().is_empty())
            .ok_or(StorageError::MissingField("secure_url"))?;

        info!(%url, public_id = %meta.public_id(), "Image uploaded");
        Ok(url)
    }
}

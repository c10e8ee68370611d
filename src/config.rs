//! YAML configuration: provider clients, per-task chains, policy limits and
//! image storage.
//!
//! ```yaml
//! providers:
//!   - id: openai
//!     kind: openai_chat
//!     model: gpt-4o-mini
//!     api_key_env: OPENAI_API_KEY
//! chains:
//!   article: [openai]
//!   image_prompt: [openai]
//!   image: [flux]
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, instrument};

/// Which wire protocol a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiChat,
    OpenaiImage,
    GeminiChat,
    GeminiImage,
    HuggingFaceImage,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenaiChat | ProviderKind::OpenaiImage => "https://api.openai.com/v1",
            ProviderKind::GeminiChat | ProviderKind::GeminiImage => {
                "https://generativelanguage.googleapis.com/v1beta"
            }
            ProviderKind::HuggingFaceImage => "https://router.huggingface.co/hf-inference/models",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts on rate limiting; 0 disables the retry wrapper.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl ProviderConfig {
    /// The API key from the configured environment variable, if set and non-blank.
    pub fn resolve_api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        std::env::var(var).ok().filter(|v| !v.trim().is_empty())
    }
}

fn default_timeout_secs() -> u64 {
    90
}

fn default_max_retries() -> u32 {
    2
}

/// Ordered provider ids per task.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainsConfig {
    pub article: Vec<String>,
    pub image_prompt: Vec<String>,
    pub image: Vec<String>,
}

/// Length caps, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub title: usize,
    pub summary: usize,
    pub body: usize,
    pub prompt: usize,
    pub negative: usize,
    /// Cap on the fully composed prompt sent to image models.
    pub image_prompt: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            title: 150,
            summary: 320,
            body: 12_000,
            prompt: 1024,
            negative: 1024,
            image_prompt: 950,
        }
    }
}

/// Smallest accepted negative-list cap; the human guard terms must fit.
pub const MIN_NEGATIVE_LEN: usize = 64;
/// Smallest accepted composed image prompt; the framing rules must fit.
pub const MIN_IMAGE_PROMPT_LEN: usize = 300;

impl Limits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("title", self.title),
            ("summary", self.summary),
            ("body", self.body),
            ("prompt", self.prompt),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidLimit {
                    name,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.negative < MIN_NEGATIVE_LEN {
            return Err(ConfigError::InvalidLimit {
                name: "negative",
                reason: format!("must be at least {MIN_NEGATIVE_LEN}"),
            });
        }
        if self.image_prompt < MIN_IMAGE_PROMPT_LEN {
            return Err(ConfigError::InvalidLimit {
                name: "image_prompt",
                reason: format!("must be at least {MIN_IMAGE_PROMPT_LEN}"),
            });
        }
        Ok(())
    }
}

/// Cloudinary unsigned-upload settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub cloud_name: String,
    pub upload_preset: String,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_storage_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_folder() -> String {
    "ai_news_images".to_string()
}

fn default_storage_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub providers: Vec<ProviderConfig>,
    pub chains: ChainsConfig,
    #[serde(default)]
    pub limits: Limits,
    /// Topic words that permit people in generated images. Replaces the
    /// built-in list when set.
    #[serde(default)]
    pub human_keywords: Option<Vec<String>>,
    /// Required unless the image stage is skipped.
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

impl AppConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that don't need any client built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.id.as_str()) {
                return Err(ConfigError::DuplicateProvider(provider.id.clone()));
            }
            // a zero timeout fails every call before it is sent
            if provider.timeout_secs == 0 {
                return Err(ConfigError::ZeroTimeout(provider.id.clone()));
            }
        }
        if self.storage.as_ref().is_some_and(|s| s.timeout_secs == 0) {
            return Err(ConfigError::ZeroTimeout("storage".to_string()));
        }

        for (name, ids) in [
            ("article", &self.chains.article),
            ("image_prompt", &self.chains.image_prompt),
            ("image", &self.chains.image),
        ] {
            if ids.is_empty() {
                return Err(ConfigError::EmptyChain(name.to_string()));
            }
            if let Some(missing) = ids.iter().find(|id| !seen.contains(id.as_str())) {
                return Err(ConfigError::UnknownProvider {
                    chain: name.to_string(),
                    provider: missing.clone(),
                });
            }
        }

        self.limits.validate()
    }
}

#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = AppConfig::from_yaml(&yaml)?;
    debug!(
        providers = config.providers.len(),
        article_chain = ?config.chains.article,
        image_prompt_chain = ?config.chains.image_prompt,
        image_chain = ?config.chains.image,
        "Loaded configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
providers:
  - id: openai
    kind: openai_chat
    model: gpt-4o-mini
    api_key_env: OPENAI_API_KEY
  - id: grok
    kind: openai_chat
    model: grok-3-mini
    base_url: https://api.x.ai/v1
    api_key_env: XAI_API_KEY
    max_retries: 0
  - id: flux
    kind: hugging_face_image
    model: black-forest-labs/FLUX.1-schnell
    timeout_secs: 120
chains:
  article: [openai, grok]
  image_prompt: [grok, openai]
  image: [flux]
limits:
  body: 8000
storage:
  cloud_name: demo
  upload_preset: news_unsigned
"#;

    #[test]
    fn test_parses_full_config_with_defaults() {
        let config = AppConfig::from_yaml(YAML).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.providers[0].kind, ProviderKind::OpenaiChat);
        assert_eq!(config.providers[0].timeout_secs, 90);
        assert_eq!(config.providers[0].max_retries, 2);
        assert_eq!(config.providers[1].max_retries, 0);
        assert_eq!(config.providers[2].timeout_secs, 120);
        assert_eq!(config.chains.image_prompt, vec!["grok", "openai"]);

        assert_eq!(config.limits.body, 8000);
        assert_eq!(config.limits.title, 150);
        assert_eq!(config.limits.image_prompt, 950);

        let storage = config.storage.unwrap();
        assert_eq!(storage.folder, "ai_news_images");
        assert!(config.human_keywords.is_none());
    }

    #[test]
    fn test_unknown_provider_in_chain_is_rejected() {
        let yaml = YAML.replace("image: [flux]", "image: [dalle]");
        let err = AppConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider { ref chain, ref provider } if chain == "image" && provider == "dalle"));
    }

    #[test]
    fn test_empty_chain_is_rejected() {
        let yaml = YAML.replace("article: [openai, grok]", "article: []");
        assert!(matches!(AppConfig::from_yaml(&yaml).unwrap_err(), ConfigError::EmptyChain(ref c) if c == "article"));
    }

    #[test]
    fn test_duplicate_provider_is_rejected() {
        let yaml = YAML.replace("id: grok", "id: openai");
        assert!(matches!(AppConfig::from_yaml(&yaml).unwrap_err(), ConfigError::DuplicateProvider(_)));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let yaml = YAML.replace("timeout_secs: 120", "timeout_secs: 0");
        assert!(matches!(AppConfig::from_yaml(&yaml).unwrap_err(), ConfigError::ZeroTimeout(ref id) if id == "flux"));

        let yaml = YAML.replace("upload_preset: news_unsigned", "upload_preset: news_unsigned\n  timeout_secs: 0");
        assert!(matches!(AppConfig::from_yaml(&yaml).unwrap_err(), ConfigError::ZeroTimeout(ref id) if id == "storage"));
    }

    #[test]
    fn test_unknown_kind_is_a_yaml_error() {
        let yaml = YAML.replace("kind: hugging_face_image", "kind: dall_e");
        assert!(matches!(AppConfig::from_yaml(&yaml).unwrap_err(), ConfigError::Yaml(_)));
    }

    #[test]
    fn test_negative_limit_must_fit_guard_terms() {
        let limits = Limits {
            negative: 10,
            ..Limits::default()
        };
        assert!(matches!(limits.validate(), Err(ConfigError::InvalidLimit { name: "negative", .. })));

        let limits = Limits {
            title: 0,
            ..Limits::default()
        };
        assert!(matches!(limits.validate(), Err(ConfigError::InvalidLimit { name: "title", .. })));
    }

    #[test]
    fn test_api_key_resolution_ignores_blank_and_missing() {
        let mut provider = AppConfig::from_yaml(YAML).unwrap().providers.remove(0);
        provider.api_key_env = Some("NEWSDESK_TEST_DEFINITELY_UNSET".to_string());
        assert_eq!(provider.resolve_api_key(), None);
        provider.api_key_env = None;
        assert_eq!(provider.resolve_api_key(), None);
        assert_eq!(provider.kind.default_base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config("/nonexistent/newsdesk.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

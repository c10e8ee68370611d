//! AI provider clients behind one uniform capability.
//!
//! Every backend (chat models used for articles and image prompts, image
//! models) implements [`ProviderClient`]: take a [`GenerationRequest`], return
//! a [`Payload`] or a classified [`ProviderError`]. Clients are built once at
//! startup into a [`ProviderRegistry`]; each task resolves its ordered
//! [`ProviderChain`] from the registry by id.
//!
//! # Submodules
//!
//! | Module | Backend | Payload |
//! |--------|---------|---------|
//! | [`openai`] | OpenAI-compatible chat and image APIs (OpenAI, xAI) | text / structured / image |
//! | [`gemini`] | Google Gemini `generateContent` | text / image bytes |
//! | [`hugging_face`] | Hugging Face text-to-image inference | image bytes |
//! | [`retry`] | Decorator adding bounded backoff on rate limits | - |
//! | [`http`] | Shared request plumbing and status classification | - |

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{ConfigError, ProviderError};
use crate::models::{GenerationRequest, Payload};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub mod gemini;
pub mod http;
pub mod hugging_face;
pub mod openai;
pub mod retry;

#[cfg(test)]
pub mod testing;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// One AI backend.
///
/// Implementations are stateless per call: credentials and endpoints are fixed
/// at construction, so a client can be shared across tasks behind an `Arc`.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable id used in chains, logs and result records.
    fn id(&self) -> &str;

    /// Upper bound for one [`generate`](Self::generate) call.
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Payload, ProviderError>;
}

/// An ordered, non-empty list of providers to try for one task.
#[derive(Clone)]
pub struct ProviderChain {
    name: String,
    clients: Vec<Arc<dyn ProviderClient>>,
}

impl ProviderChain {
    pub fn new(name: &str, clients: Vec<Arc<dyn ProviderClient>>) -> Result<Self, ConfigError> {
        if clients.is_empty() {
            return Err(ConfigError::EmptyChain(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            clients,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Clients in the order they are tried.
    pub fn clients(&self) -> &[Arc<dyn ProviderClient>] {
        &self.clients
    }

    pub fn ids(&self) -> Vec<&str> {
        self.clients.iter().map(|c| c.id()).collect()
    }
}

impl fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderChain")
            .field("name", &self.name)
            .field("providers", &self.ids())
            .finish()
    }
}

/// All provider clients known to the process, by id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one client per configured provider.
    ///
    /// Clients whose API key is not set are still registered; they fail at
    /// call time and the chain moves on.
    pub fn from_configs(configs: &[ProviderConfig]) -> Result<Self, ConfigError> {
        let http = reqwest::Client::new();
        let mut registry = Self::new();

        for config in configs {
            let base = http::HttpBase::from_config(config, http.clone())?;
            let client: Arc<dyn ProviderClient> = match config.kind {
                ProviderKind::OpenaiChat => Arc::new(openai::OpenAiChatClient::new(base, &config.model)),
                ProviderKind::OpenaiImage => Arc::new(openai::OpenAiImageClient::new(base, &config.model)),
                ProviderKind::GeminiChat => Arc::new(gemini::GeminiChatClient::new(base, &config.model)),
                ProviderKind::GeminiImage => Arc::new(gemini::GeminiImageClient::new(base, &config.model)),
                ProviderKind::HuggingFaceImage => {
                    Arc::new(hugging_face::HuggingFaceImageClient::new(base, &config.model))
                }
            };

            let client = if config.max_retries > 0 {
                Arc::new(retry::Retrying::new(client, config.max_retries, Duration::from_secs(1)))
                    as Arc<dyn ProviderClient>
            } else {
                client
            };

            debug!(
                provider = %config.id,
                kind = ?config.kind,
                model = %config.model,
                max_retries = config.max_retries,
                "Registered provider"
            );
            registry.insert(client)?;
        }

        info!(count = configs.len(), "Provider registry built");
        Ok(registry)
    }

    pub fn insert(&mut self, client: Arc<dyn ProviderClient>) -> Result<(), ConfigError> {
        let id = client.id().to_string();
        if self.clients.contains_key(&id) {
            return Err(ConfigError::DuplicateProvider(id));
        }
        self.clients.insert(id, client);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(id).cloned()
    }

    /// Resolve an ordered list of ids into a chain.
    pub fn chain(&self, name: &str, ids: &[String]) -> Result<ProviderChain, ConfigError> {
        let clients = ids
            .iter()
            .map(|id| {
                self.get(id).ok_or_else(|| ConfigError::UnknownProvider {
                    chain: name.to_string(),
                    provider: id.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        ProviderChain::new(name, clients)
    }
}

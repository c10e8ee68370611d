//! Scripted in-memory providers for tests.

use super::{ProviderChain, ProviderClient};
use crate::error::ProviderError;
use crate::models::{GenerationRequest, Payload};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Provider that replays a fixed script of responses and counts its calls.
pub struct ScriptedProvider {
    id: String,
    script: Mutex<VecDeque<Result<Payload, ProviderError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    timeout: Duration,
}

impl ScriptedProvider {
    pub fn new(id: &str, script: Vec<Result<Payload, ProviderError>>) -> Arc<Self> {
        Arc::new(Self::build(id, script, None))
    }

    /// One successful text response carrying `value` as JSON.
    pub fn json(id: &str, value: serde_json::Value) -> Arc<Self> {
        Self::new(id, vec![Ok(Payload::RawText(value.to_string()))])
    }

    pub fn failing(id: &str, error: ProviderError) -> Arc<Self> {
        Self::new(id, vec![Err(error)])
    }

    /// Sleeps `delay` before answering; reports `timeout` as its limit.
    pub fn slow(id: &str, delay: Duration, timeout: Duration, script: Vec<Result<Payload, ProviderError>>) -> Arc<Self> {
        let mut provider = Self::build(id, script, Some(delay));
        provider.timeout = timeout;
        Arc::new(provider)
    }

    fn build(id: &str, script: Vec<Result<Payload, ProviderError>>, delay: Option<Duration>) -> Self {
        Self {
            id: id.to_string(),
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay,
            timeout: super::DEFAULT_TIMEOUT,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Payload, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(ProviderError::unknown("script exhausted")))
    }
}

/// Chain over scripted providers, in the given order.
pub fn chain(name: &str, providers: &[Arc<ScriptedProvider>]) -> ProviderChain {
    let clients = providers
        .iter()
        .map(|p| p.clone() as Arc<dyn ProviderClient>)
        .collect();
    ProviderChain::new(name, clients).expect("non-empty test chain")
}

/// A minimal valid JPEG header, enough for signature sniffing.
pub fn jpeg_bytes() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F']
}

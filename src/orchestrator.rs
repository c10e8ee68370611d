//! Ordered fallback across a provider chain.
//!
//! Providers are tried strictly one after another. The first response that
//! survives validation and normalization wins and nothing after it is
//! called; every failure before it is recorded, not raised.

use crate::error::{ChainExhausted, ProviderError, ProviderFailure};
use crate::models::{GenerationRequest, Payload};
use crate::providers::ProviderChain;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

/// A successful chain run.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    pub value: T,
    /// Id of the provider that produced `value`.
    pub provider: String,
    /// Attempts that failed before the winner, in order.
    pub failures: Vec<ProviderFailure>,
}

/// Drive `chain` until one provider's payload passes `validate` then
/// `normalize`.
///
/// Each call is bounded by the client's own timeout; running out is a
/// transport failure.
///
/// # Arguments
///
/// * `request` - The prompt and output contract, sent unchanged to every provider
/// * `chain` - Providers in the order they are tried
/// * `validate` - Turns a raw payload into checked fields, or classifies why it can't
/// * `normalize` - Applies length and content policy; receives the provider id
///   so records can carry it
///
/// # Returns
///
/// The first normalized value with the failures that preceded it, or
/// [`ChainExhausted`] listing every failure in attempt order.
#[instrument(level = "info", skip_all, fields(chain = %chain.name(), providers = chain.clients().len()))]
pub async fn execute<V, T, FV, FN>(
    request: &GenerationRequest,
    chain: &ProviderChain,
    validate: FV,
    normalize: FN,
) -> Result<Generated<T>, ChainExhausted>
where
    FV: Fn(Payload) -> Result<V, ProviderError>,
    FN: Fn(V, &str) -> Result<T, ProviderError>,
{
    let mut failures = Vec::with_capacity(chain.clients().len());

    for (index, client) in chain.clients().iter().enumerate() {
        let id = client.id();
        let t0 = Instant::now();
        let limit = client.timeout();

        let attempt = match timeout(limit, client.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::transport(format!("no response within {}s", limit.as_secs()))),
        }
        .and_then(&validate)
        .and_then(|validated| normalize(validated, id));

        match attempt {
            Ok(value) => {
                info!(
                    provider = id,
                    position = index + 1,
                    failed_before = failures.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Provider succeeded"
                );
                return Ok(Generated {
                    value,
                    provider: id.to_string(),
                    failures,
                });
            }
            Err(e) => {
                warn!(
                    provider = id,
                    position = index + 1,
                    kind = %e.kind,
                    detail = %e.detail,
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Provider failed; falling back"
                );
                failures.push(e.attributed(id));
            }
        }
    }

    warn!(attempts = failures.len(), "Every provider in the chain failed");
    Err(ChainExhausted { failures })
}

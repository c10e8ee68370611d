//! Error taxonomy for provider attempts, generation tasks and configuration.
//!
//! Provider adapters return [`ProviderError`]. The orchestrator attributes each
//! one to the provider that produced it ([`ProviderFailure`]) and keeps going;
//! only [`TaskError`] ever reaches a task's caller.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Classification of a single failed provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// Network error, connection refused, timeout, 5xx.
    Transport,
    /// The provider signalled throttling.
    RateLimited,
    /// The response could not be decoded or failed field validation.
    InvalidSchema,
    /// A required field (or the whole response) was blank.
    EmptyContent,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Transport => "transport",
            FailureKind::RateLimited => "rate limited",
            FailureKind::InvalidSchema => "invalid schema",
            FailureKind::EmptyContent => "empty content",
            FailureKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Error produced while calling, decoding, validating or normalizing one
/// provider's output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct ProviderError {
    pub kind: FailureKind,
    pub detail: String,
}

impl ProviderError {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, detail)
    }

    pub fn rate_limited(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, detail)
    }

    pub fn invalid_schema(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidSchema, detail)
    }

    pub fn empty_content(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::EmptyContent, detail)
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, detail)
    }

    /// Attach the id of the provider that caused this error.
    pub fn attributed(self, provider: &str) -> ProviderFailure {
        ProviderFailure {
            provider: provider.to_string(),
            kind: self.kind,
            detail: self.detail,
        }
    }
}

/// A [`ProviderError`] attributed to the provider that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub kind: FailureKind,
    pub detail: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.provider, self.kind, self.detail)
    }
}

/// Every provider in a chain failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("all {} providers failed: {}", .failures.len(), join_failures(.failures))]
pub struct ChainExhausted {
    /// One entry per provider, in the order they were attempted.
    pub failures: Vec<ProviderFailure>,
}

impl ChainExhausted {
    pub fn for_task(self, task: TaskName) -> TaskError {
        TaskError::ChainExhausted {
            task,
            failures: self.failures,
        }
    }
}

/// Name of the generation task an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskName {
    Article,
    ImagePrompt,
    Image,
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskName::Article => "article",
            TaskName::ImagePrompt => "image_prompt",
            TaskName::Image => "image",
        };
        f.write_str(s)
    }
}

/// Errors surfaced to a task's caller. All of them are fatal for that run.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{task} task: all {} providers failed: {}", .failures.len(), join_failures(.failures))]
    ChainExhausted {
        task: TaskName,
        failures: Vec<ProviderFailure>,
    },
    #[error("{task} task: storing the image failed: {source}")]
    Storage {
        task: TaskName,
        #[source]
        source: StorageError,
    },
    #[error("{task} task: topic is empty")]
    EmptyTopic { task: TaskName },
}

impl TaskError {
    pub fn task(&self) -> TaskName {
        match self {
            TaskError::ChainExhausted { task, .. }
            | TaskError::Storage { task, .. }
            | TaskError::EmptyTopic { task } => *task,
        }
    }
}

/// Upload of a generated image to permanent storage failed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("storage response missing `{0}`")]
    MissingField(&'static str),
}

/// Configuration could not be loaded or does not describe a usable setup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("duplicate provider id `{0}`")]
    DuplicateProvider(String),
    #[error("chain `{chain}` references unknown provider `{provider}`")]
    UnknownProvider { chain: String, provider: String },
    #[error("chain `{0}` has no providers")]
    EmptyChain(String),
    #[error("invalid limit `{name}`: {reason}")]
    InvalidLimit { name: &'static str, reason: String },
    #[error("`{0}`: timeout_secs must be greater than zero")]
    ZeroTimeout(String),
    #[error("invalid base url `{url}` for provider `{provider}`")]
    InvalidUrl { provider: String, url: String },
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

//! Data models shared by the providers, the validator, the normalizer and the
//! generation tasks.
//!
//! This module defines:
//! - [`GenerationRequest`] and [`FieldSpec`]: what a task asks a provider for
//! - [`Payload`]: the single shape every provider response is resolved into
//! - Canonical records: [`ArticleRecord`], [`ImagePromptRecord`], [`ImageRecord`]
//! - [`PublishedArticle`]: the record written to disk after a pipeline pass
//! - [`SourceArticle`]: supporting material gathered before drafting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Kind of value a schema field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text.
    Text,
    /// One of [`FieldSpec::allowed_values`], exact match.
    Enum,
    /// A boolean.
    Flag,
}

/// Contract a single field of a provider's structured output must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
    pub kind: FieldKind,
    /// Only consulted for [`FieldKind::Enum`].
    pub allowed_values: BTreeSet<String>,
}

impl FieldSpec {
    pub fn text(name: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            required,
            kind: FieldKind::Text,
            allowed_values: BTreeSet::new(),
        }
    }

    pub fn one_of<I, S>(name: &str, required: bool, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            required,
            kind: FieldKind::Enum,
            allowed_values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn flag(name: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            required,
            kind: FieldKind::Flag,
            allowed_values: BTreeSet::new(),
        }
    }
}

/// One request to one provider. Built fresh by a task for every run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub user_instruction: String,
    /// Empty for image generation.
    pub schema: Vec<FieldSpec>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Passed to image backends that take a separate negative prompt.
    pub negative_prompt: Option<String>,
}

/// A provider response resolved into one canonical shape.
///
/// Adapters decide once which variant a provider-native response maps to, so
/// the validator never has to probe for "maybe parsed, maybe text".
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The backend already returned a decoded JSON object.
    Structured(serde_json::Map<String, serde_json::Value>),
    /// Text that should contain a JSON object.
    RawText(String),
    /// Encoded image data.
    ImageBytes { bytes: Vec<u8>, mime: String },
    /// A (usually short-lived) link to a generated image.
    ImageUrl(Url),
}

impl Payload {
    /// Short label used in log lines and failure details.
    pub fn describe(&self) -> &'static str {
        match self {
            Payload::Structured(_) => "structured",
            Payload::RawText(_) => "text",
            Payload::ImageBytes { .. } => "image bytes",
            Payload::ImageUrl(_) => "image url",
        }
    }
}

/// Article categories the site publishes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, clap::ValueEnum)]
pub enum Category {
    News,
    Science,
    Tech,
    Market,
    Lifestyle,
    Health,
    Sports,
    Entertainment,
    Explainers,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::News,
        Category::Science,
        Category::Tech,
        Category::Market,
        Category::Lifestyle,
        Category::Health,
        Category::Sports,
        Category::Entertainment,
        Category::Explainers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::News => "News",
            Category::Science => "Science",
            Category::Tech => "Tech",
            Category::Market => "Market",
            Category::Lifestyle => "Lifestyle",
            Category::Health => "Health",
            Category::Sports => "Sports",
            Category::Entertainment => "Entertainment",
            Category::Explainers => "Explainers",
        }
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        Self::ALL.iter().map(Category::as_str)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Case-sensitive, matching what the article schema accepts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category `{s}`"))
    }
}

/// A drafted, policy-checked article.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArticleRecord {
    pub title: String,
    pub summary: String,
    pub body: String,
    pub category: Category,
    /// Id of the provider that produced the draft.
    pub provider: String,
}

/// Prompt material for the editorial image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ImagePromptRecord {
    pub prompt: String,
    /// Comma-separated list of things the image must not show.
    pub negative_prompt: String,
    pub humans_allowed: bool,
    pub provider: String,
}

/// An image as returned by the winning image provider, before upload.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedImage {
    Bytes { bytes: Vec<u8>, mime: String },
    Url(Url),
}

/// A generated image after it has been copied to permanent storage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ImageRecord {
    pub image_url: String,
    pub provider: String,
}

/// Everything one pipeline pass produces.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishedArticle {
    pub topic: String,
    pub article: ArticleRecord,
    pub image_prompt: Option<ImagePromptRecord>,
    pub image: Option<ImageRecord>,
    pub generated_at: DateTime<Utc>,
}

/// A supporting source article fetched before drafting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArticle {
    pub url: String,
    pub title: String,
    pub text: String,
}

/// Split a comma-separated term list, dropping blanks.
pub fn split_terms(list: &str) -> Vec<&str> {
    list.split(',').map(str::trim).filter(|t| !t.is_empty()).collect()
}

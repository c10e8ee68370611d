//! Image generation: compose the final prompt from an [`ImagePromptRecord`],
//! drive the image chain, then copy the winner to permanent storage.

use super::require_topic;
use crate::config::Limits;
use crate::error::{TaskError, TaskName};
use crate::models::{GeneratedImage, GenerationRequest, ImagePromptRecord, ImageRecord, split_terms};
use crate::normalize::{join_terms_within, merge_terms, truncate_at_boundary};
use crate::orchestrator::{Generated, execute};
use crate::providers::ProviderChain;
use crate::schema::validate_image;
use crate::storage::{ImageStore, UploadMeta};
use std::sync::Arc;
use tracing::{error, info, instrument};

pub const HARD_RULES: &str = "16:9 landscape, wide establishing shot, 24mm, cinematic realistic photojournalism, \
environment-focused, no close-up, no readable text.";
pub const NO_HUMANS_RULE: &str = "EMPTY SCENE, no humans.";
pub const HUMANS_RULE: &str = "No close-up faces.";

pub const BLOCKLIST: &[&str] = &[
    "text",
    "logo",
    "watermark",
    "caption",
    "branding",
    "blurry",
    "low quality",
    "jpeg artifacts",
    "noise",
    "distorted",
    "duplicate",
    "floating objects",
    "cartoon",
    "anime",
    "cgi",
    "3d render",
    "extra limbs",
    "extra fingers",
    "deformed anatomy",
];

pub const HUMAN_BLOCKLIST: &[&str] = &["people", "human", "crowd", "face", "portrait", "hands"];

/// How much of the incoming negative prompt is carried over.
pub const INCOMING_NEGATIVE_MAX: usize = 180;
/// Room kept for the avoid list when the prompt itself is long.
const AVOID_RESERVE: usize = 40;
const SEP: &str = " | ";
const AVOID_LABEL: &str = "avoid: ";

/// The single string sent to image models, and the avoid list on its own
/// for backends that take a separate negative prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub prompt: String,
    pub avoid: String,
}

/// `{prompt} | {framing rules} | {human rule} | avoid: {terms}`, at most
/// `max` characters.
///
/// The framing and human rules are never cut. The scene prompt is shortened
/// first, then the avoid list loses trailing terms; when people are not
/// allowed the human terms lead the avoid list so they are the last to go.
pub fn compose_prompt(record: &ImagePromptRecord, max: usize) -> ComposedPrompt {
    let humans_rule = if record.humans_allowed { HUMANS_RULE } else { NO_HUMANS_RULE };
    let rules = format!("{HARD_RULES}{SEP}{humans_rule}");

    let mut leading: Vec<&str> = Vec::with_capacity(BLOCKLIST.len() + HUMAN_BLOCKLIST.len());
    if !record.humans_allowed {
        leading.extend_from_slice(HUMAN_BLOCKLIST);
    }
    leading.extend_from_slice(BLOCKLIST);
    let incoming = truncate_at_boundary(&record.negative_prompt, INCOMING_NEGATIVE_MAX);
    let terms = merge_terms(&leading, &split_terms(&incoming));

    let fixed = rules.chars().count() + 2 * SEP.len() + AVOID_LABEL.len();
    let prompt_budget = max.saturating_sub(fixed + AVOID_RESERVE).max(1);
    let scene = truncate_at_boundary(&record.prompt, prompt_budget);

    let avoid_budget = max.saturating_sub(fixed + scene.chars().count());
    let avoid = join_terms_within(&terms, avoid_budget);

    ComposedPrompt {
        prompt: format!("{scene}{SEP}{rules}{SEP}{AVOID_LABEL}{avoid}"),
        avoid,
    }
}

pub struct ImageTask {
    chain: ProviderChain,
    store: Arc<dyn ImageStore>,
    limits: Limits,
}

impl ImageTask {
    pub fn new(chain: ProviderChain, store: Arc<dyn ImageStore>, limits: Limits) -> Self {
        Self { chain, store, limits }
    }

    pub fn request(&self, prompt: &ImagePromptRecord) -> GenerationRequest {
        let composed = compose_prompt(prompt, self.limits.image_prompt);
        GenerationRequest {
            system_instruction: String::new(),
            user_instruction: composed.prompt,
            schema: Vec::new(),
            temperature: 0.0,
            max_output_tokens: 0,
            negative_prompt: Some(composed.avoid),
        }
    }

    /// Generate one image and upload it exactly once.
    ///
    /// # Arguments
    ///
    /// * `topic` - Used for the storage public id and tags
    /// * `prompt` - Scene, negative list and human policy to compose from
    ///
    /// # Returns
    ///
    /// The permanent image url and winning provider. Chain exhaustion returns
    /// before any upload; an upload failure is [`TaskError::Storage`].
    #[instrument(level = "info", skip(self, prompt), fields(chain = ?self.chain.ids(), humans_allowed = prompt.humans_allowed))]
    pub async fn run(&self, topic: &str, prompt: &ImagePromptRecord) -> Result<Generated<ImageRecord>, TaskError> {
        let topic = require_topic(topic, TaskName::Image)?;
        let request = self.request(prompt);
        info!(prompt_chars = request.user_instruction.chars().count(), "Composed image prompt");

        let generated = execute(&request, &self.chain, validate_image, |image: GeneratedImage, _| Ok(image))
            .await
            .map_err(|e| e.for_task(TaskName::Image))?;

        let meta = UploadMeta::new(topic, &generated.provider);
        let image_url = self.store.upload(&generated.value, &meta).await.map_err(|source| {
            error!(provider = %generated.provider, error = %source, "Image upload failed");
            TaskError::Storage {
                task: TaskName::Image,
                source,
            }
        })?;

        info!(provider = %generated.provider, %image_url, "Image stored");
        Ok(Generated {
            value: ImageRecord {
                image_url,
                provider: generated.provider.clone(),
            },
            provider: generated.provider,
            failures: generated.failures,
        })
    }
}

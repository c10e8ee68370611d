//! Image-prompt generation: a short, topic-bound, documentary-style prompt
//! plus the negative list that keeps image models away from artifacts and,
//! unless the topic is about people, away from humans.

use super::require_topic;
use crate::config::Limits;
use crate::error::{ProviderError, TaskError, TaskName};
use crate::models::{Category, FieldSpec, GenerationRequest, ImagePromptRecord};
use crate::normalize::{contains_any_term, humans_allowed, negative_list, truncate_at_boundary};
use crate::orchestrator::{Generated, execute};
use crate::providers::ProviderChain;
use crate::schema::{ValidatedPayload, validate};
use tracing::{info, instrument, warn};

pub const TEMPERATURE: f32 = 0.1;
pub const MAX_OUTPUT_TOKENS: u32 = 220;

/// Always part of the negative list.
pub const BASE_NEGATIVE: &[&str] = &[
    "deformed",
    "extra limbs",
    "abnormal fingers",
    "long neck",
    "distorted face",
    "blurry",
    "low quality",
    "low resolution",
    "noisy",
    "jpeg artifacts",
    "watermark",
    "caption",
    "cartoon",
    "anime",
    "illustration",
    "3d render",
    "plastic look",
];

/// Leads the negative list when the topic doesn't call for people.
pub const HUMAN_BLOCK: &[&str] = &["people", "person", "human", "face", "hands", "fingers", "crowd"];

/// Topic words that make people in the picture acceptable.
pub const DEFAULT_HUMAN_KEYWORDS: &[&str] = &[
    "celebrity", "actor", "actress", "player", "team", "protest", "rally", "crowd", "people", "fans",
];

const SYSTEM: &str = "You generate realistic image prompts for news thumbnails.\n\
STRICT RULES:\n\
- The prompt must represent ONLY the given topic.\n\
- Do NOT add unrelated objects, locations, characters, or fantasy elements.\n\
- Keep it realistic and documentary style.\n\
Return ONLY valid JSON. No markdown. No extra text.";

pub struct ImagePromptTask {
    chain: ProviderChain,
    limits: Limits,
    human_keywords: Vec<String>,
}

impl ImagePromptTask {
    pub fn new(chain: ProviderChain, limits: Limits) -> Self {
        Self {
            chain,
            limits,
            human_keywords: DEFAULT_HUMAN_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Replace the built-in human keyword list.
    pub fn with_human_keywords(mut self, keywords: Vec<String>) -> Self {
        self.human_keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    pub fn schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::text("prompt", false),
            FieldSpec::text("negative_prompt", false),
            FieldSpec::flag("shows_people", false),
        ]
    }

    pub fn humans_allowed(&self, topic: &str, category: Option<Category>) -> bool {
        humans_allowed(topic, category, &self.human_keywords)
    }

    pub fn request(&self, topic: &str, category: Option<Category>, humans: bool) -> GenerationRequest {
        let people = if humans {
            "People may appear, but no close-up faces."
        } else {
            "No people: show an empty scene."
        };
        let user_instruction = format!(
            "Topic: {topic}\nCategory: {category}\n{people}\n\n\
Return JSON only:\n\
{{\"prompt\": \"ONE short realistic image prompt that visually represents ONLY the topic. \
Use wide establishing shot, 16:9, documentary style.\", \
\"negative_prompt\": \"comma-separated things to avoid\", \
\"shows_people\": true or false}}",
            category = category.map_or("General", |c| c.as_str()),
        );

        GenerationRequest {
            system_instruction: SYSTEM.to_string(),
            user_instruction,
            schema: Self::schema(),
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
            negative_prompt: None,
        }
    }

    /// Generate the image prompt and negative list for `topic`.
    ///
    /// Whether people may appear is decided from `topic` and `category`
    /// before the request and enforced again on the result.
    ///
    /// # Returns
    ///
    /// An [`ImagePromptRecord`] whose negative list carries the human guard
    /// when people are not allowed, or a [`TaskError`] tagged with the task.
    #[instrument(level = "info", skip(self), fields(chain = ?self.chain.ids()))]
    pub async fn run(&self, topic: &str, category: Option<Category>) -> Result<Generated<ImagePromptRecord>, TaskError> {
        let topic = require_topic(topic, TaskName::ImagePrompt)?;
        let humans = self.humans_allowed(topic, category);
        let request = self.request(topic, category, humans);

        let generated = execute(
            &request,
            &self.chain,
            |payload| validate(payload, &request.schema),
            |validated, provider| normalize_prompt(validated, topic, humans, provider, &self.limits),
        )
        .await
        .map_err(|e| e.for_task(TaskName::ImagePrompt))?;

        info!(
            provider = %generated.provider,
            humans_allowed = humans,
            prompt_chars = generated.value.prompt.chars().count(),
            "Image prompt generated"
        );
        Ok(generated)
    }
}

/// Prompt used when a provider returns none.
pub fn fallback_prompt(topic: &str) -> String {
    format!("wide realistic establishing shot of {topic}, documentary style, 16:9")
}

/// Bound the prompt and build the negative list with the human guard first.
pub fn normalize_prompt(
    validated: ValidatedPayload,
    topic: &str,
    humans: bool,
    provider: &str,
    limits: &Limits,
) -> Result<ImagePromptRecord, ProviderError> {
    let prompt = match validated.text("prompt") {
        Some(p) => p.to_string(),
        None => {
            warn!(provider, "Provider returned no prompt; using topic template");
            fallback_prompt(topic)
        }
    };
    let prompt = truncate_at_boundary(&prompt, limits.prompt);

    if !humans && validated.flag("shows_people") == Some(true) {
        return Err(ProviderError::invalid_schema(
            "prompt depicts people on a topic that does not allow them",
        ));
    }

    let guard: &[&str] = if humans { &[] } else { HUMAN_BLOCK };
    let negative_prompt = negative_list(guard, BASE_NEGATIVE, validated.text("negative_prompt"), limits.negative);

    if !humans && !contains_any_term(&negative_prompt, HUMAN_BLOCK) {
        return Err(ProviderError::empty_content("negative list lost its human guard terms"));
    }

    Ok(ImagePromptRecord {
        prompt,
        negative_prompt,
        humans_allowed: humans,
        provider: provider.to_string(),
    })
}

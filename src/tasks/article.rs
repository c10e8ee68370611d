//! Article drafting: topic (+ optional category and source context) in, a
//! titled, summarized, categorized article out.

use super::require_topic;
use crate::config::Limits;
use crate::error::{ProviderError, TaskError, TaskName};
use crate::models::{ArticleRecord, Category, FieldSpec, GenerationRequest};
use crate::normalize::{lead_sentences, truncate_at_boundary};
use crate::orchestrator::{Generated, execute};
use crate::providers::ProviderChain;
use crate::schema::{ValidatedPayload, validate};
use itertools::Itertools;
use tracing::{info, instrument};

pub const TEMPERATURE: f32 = 0.3;
pub const MAX_OUTPUT_TOKENS: u32 = 1200;

const SYSTEM: &str = "You are a professional international news journalist. \
Write ONLY from the provided context. Do not speculate or add outside information. \
Return ONLY valid JSON. No markdown. No extra text.";

pub struct ArticleTask {
    chain: ProviderChain,
    limits: Limits,
}

impl ArticleTask {
    pub fn new(chain: ProviderChain, limits: Limits) -> Self {
        Self { chain, limits }
    }

    /// Output contract. A requested category narrows the enum to that one
    /// value, so a provider filing elsewhere fails validation.
    pub fn schema(category: Option<Category>) -> Vec<FieldSpec> {
        let category = match category {
            Some(c) => FieldSpec::one_of("category", true, [c.as_str()]),
            None => FieldSpec::one_of("category", true, Category::names()),
        };
        vec![
            FieldSpec::text("title", false),
            FieldSpec::text("summary", false),
            FieldSpec::text("body", true),
            category,
        ]
    }

    pub fn request(&self, topic: &str, category: Option<Category>, context: Option<&str>) -> GenerationRequest {
        let category_line = match category {
            Some(c) => format!("Category: {c} (use exactly this value)"),
            None => format!("Category: choose one of {}", Category::names().join(", ")),
        };
        let context = context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("(no source material available; keep to what the topic itself states)");

        let user_instruction = format!(
            "Write a comprehensive news article about:\n\n{topic}\n\n{category_line}\n\n\
Use ONLY the context below.\n\nCONTEXT:\n{context}\n\n\
Rules:\n- Neutral tone\n- No bullet points\n- No headings\n- Continuous paragraphs\n\n\
Return JSON only:\n\
{{\"title\": \"headline, at most {title} characters\", \
\"summary\": \"one or two sentences\", \
\"body\": \"the article\", \
\"category\": \"one of the allowed categories\"}}",
            title = self.limits.title,
        );

        GenerationRequest {
            system_instruction: SYSTEM.to_string(),
            user_instruction,
            schema: Self::schema(category),
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
            negative_prompt: None,
        }
    }

    /// Draft without source context.
    pub async fn run(&self, topic: &str, category: Option<Category>) -> Result<Generated<ArticleRecord>, TaskError> {
        self.run_with_context(topic, category, None).await
    }

    /// Draft an article for `topic` through the article chain.
    ///
    /// # Arguments
    ///
    /// * `topic` - Headline or subject; blank topics are rejected before any call
    /// * `category` - Category to file under; `None` lets the provider choose
    /// * `context` - Source material the article must stick to
    ///
    /// # Returns
    ///
    /// The bounded [`ArticleRecord`] from the first provider that passed, or a
    /// [`TaskError`] tagged with the article task.
    #[instrument(level = "info", skip(self, context), fields(chain = ?self.chain.ids()))]
    pub async fn run_with_context(
        &self,
        topic: &str,
        category: Option<Category>,
        context: Option<&str>,
    ) -> Result<Generated<ArticleRecord>, TaskError> {
        let topic = require_topic(topic, TaskName::Article)?;
        let request = self.request(topic, category, context);

        let generated = execute(
            &request,
            &self.chain,
            |payload| validate(payload, &request.schema),
            |validated, provider| normalize_article(validated, topic, provider, &self.limits),
        )
        .await
        .map_err(|e| e.for_task(TaskName::Article))?;

        info!(
            provider = %generated.provider,
            category = %generated.value.category,
            body_chars = generated.value.body.chars().count(),
            "Article drafted"
        );
        Ok(generated)
    }
}

/// Apply length limits and fill optional fields from the topic and body.
pub fn normalize_article(
    validated: ValidatedPayload,
    topic: &str,
    provider: &str,
    limits: &Limits,
) -> Result<ArticleRecord, ProviderError> {
    let body = validated
        .text("body")
        .map(|b| truncate_at_boundary(b, limits.body))
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ProviderError::empty_content("body is blank"))?;

    let category = validated
        .text("category")
        .ok_or_else(|| ProviderError::invalid_schema("missing required field `category`"))?
        .parse::<Category>()
        .map_err(ProviderError::invalid_schema)?;

    let title = truncate_at_boundary(validated.text("title").unwrap_or(topic), limits.title);
    let summary = match validated.text("summary") {
        Some(s) => truncate_at_boundary(s, limits.summary),
        None => lead_sentences(&body, limits.summary),
    };

    Ok(ArticleRecord {
        title,
        summary,
        body,
        category,
        provider: provider.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::providers::testing::{ScriptedProvider, chain};
    use serde_json::json;

    fn task(providers: &[std::sync::Arc<ScriptedProvider>]) -> ArticleTask {
        ArticleTask::new(chain("article", providers), Limits::default())
    }

    #[tokio::test]
    async fn test_first_provider_wins_with_requested_category() {
        let p1 = ScriptedProvider::json(
            "provider-1",
            json!({
                "title": "Chip shortage deepens",
                "summary": "Supply remains tight.",
                "body": "Manufacturers reported longer lead times this quarter.",
                "category": "Tech"
            }),
        );
        let p2 = ScriptedProvider::json("provider-2", json!({}));
        let task = task(&[p1.clone(), p2.clone()]);

        let generated = task.run("Global chip shortage worsens", Some(Category::Tech)).await.unwrap();
        assert_eq!(generated.value.category, Category::Tech);
        assert_eq!(generated.value.provider, "provider-1");
        assert_eq!(generated.provider, "provider-1");
        assert!(generated.failures.is_empty());
        assert_eq!(p2.calls(), 0);

        let request = p1.last_request().unwrap();
        assert!(request.user_instruction.contains("Global chip shortage worsens"));
        assert!(request.user_instruction.contains("Category: Tech"));
        assert_eq!(request.max_output_tokens, MAX_OUTPUT_TOKENS);
    }

    #[tokio::test]
    async fn test_falls_back_past_rate_limit_and_missing_body() {
        let p1 = ScriptedProvider::failing("provider-1", ProviderError::rate_limited("HTTP 429"));
        let p2 = ScriptedProvider::json("provider-2", json!({"title": "T", "category": "Tech"}));
        let p3 = ScriptedProvider::json("provider-3", json!({"body": "Third time lucky.", "category": "News"}));
        let task = task(&[p1, p2, p3]);

        let generated = task.run("Port strike", None).await.unwrap();
        assert_eq!(generated.value.provider, "provider-3");
        let kinds: Vec<FailureKind> = generated.failures.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FailureKind::RateLimited, FailureKind::InvalidSchema]);
    }

    #[tokio::test]
    async fn test_category_outside_the_set_is_rejected() {
        let p1 = ScriptedProvider::json("provider-1", json!({"body": "Text.", "category": "Politics"}));
        let p2 = ScriptedProvider::json("provider-2", json!({"body": "Text.", "category": " Market "}));
        let p3 = ScriptedProvider::json("provider-3", json!({"body": "Text.", "category": "Market"}));
        let task = task(&[p1, p2, p3]);

        let generated = task.run("Rates", None).await.unwrap();
        assert_eq!(generated.value.category, Category::Market);
        assert_eq!(generated.provider, "provider-3");
        let kinds: Vec<FailureKind> = generated.failures.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FailureKind::InvalidSchema, FailureKind::InvalidSchema]);
        assert!(generated.failures[0].detail.contains("Politics"));
    }

    #[tokio::test]
    async fn test_requested_category_overrides_provider_choice() {
        let p1 = ScriptedProvider::json("provider-1", json!({"body": "Match report.", "category": "Sports"}));
        let p2 = ScriptedProvider::json("provider-2", json!({"body": "Fabs idle.", "category": "Tech"}));
        let task = task(&[p1.clone(), p2]);

        let generated = task.run("Global chip shortage worsens", Some(Category::Tech)).await.unwrap();
        assert_eq!(generated.value.category, Category::Tech);
        assert_eq!(generated.provider, "provider-2");
        assert_eq!(generated.failures[0].provider, "provider-1");
        assert_eq!(generated.failures[0].kind, FailureKind::InvalidSchema);
        assert!(generated.failures[0].detail.contains("Sports"));
        assert_eq!(p1.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_is_tagged_with_task() {
        let task = task(&[
            ScriptedProvider::failing("a", ProviderError::transport("refused")),
            ScriptedProvider::failing("b", ProviderError::unknown("HTTP 401")),
            ScriptedProvider::json("c", json!({"body": "  ", "category": "News"})),
        ]);

        let err = task.run("Storm", None).await.unwrap_err();
        match err {
            TaskError::ChainExhausted { task, ref failures } => {
                assert_eq!(task, TaskName::Article);
                assert_eq!(failures.len(), 3);
                assert_eq!(failures[2].kind, FailureKind::EmptyContent);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_blank_topic_calls_nothing() {
        let p1 = ScriptedProvider::json("provider-1", json!({"body": "x", "category": "News"}));
        let task = task(&[p1.clone()]);
        let err = task.run("   ", None).await.unwrap_err();
        assert!(matches!(err, TaskError::EmptyTopic { task: TaskName::Article }));
        assert_eq!(p1.calls(), 0);
    }

    #[tokio::test]
    async fn test_context_is_embedded_in_instruction() {
        let p1 = ScriptedProvider::json("provider-1", json!({"body": "x", "category": "News"}));
        let task = task(&[p1.clone()]);
        task.run_with_context("Storm", None, Some("SOURCE: example.com\nTITLE: Storm nears"))
            .await
            .unwrap();
        assert!(p1.last_request().unwrap().user_instruction.contains("TITLE: Storm nears"));
    }

    #[test]
    fn test_optional_fields_are_filled_and_bounded() {
        let limits = Limits {
            title: 12,
            summary: 40,
            ..Limits::default()
        };
        let payload = crate::models::Payload::RawText(
            json!({
                "body": "Officials confirmed the closure. Traffic was diverted overnight. More later.",
                "category": "News",
                "summary": ""
            })
            .to_string(),
        );
        let validated = validate(payload, &ArticleTask::schema(None)).unwrap();
        let record = normalize_article(validated, "Bridge closed after inspection", "p", &limits).unwrap();

        assert_eq!(record.title, "Bridge");
        assert_eq!(record.summary, "Officials confirmed the closure.");
        for field in [&record.title, &record.summary, &record.body] {
            assert!(!field.trim().is_empty());
        }
    }
}

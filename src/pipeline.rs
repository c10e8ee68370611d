//! One end-to-end pass: article, then image prompt, then image.

use crate::config::AppConfig;
use crate::error::{ConfigError, TaskError};
use crate::models::{Category, PublishedArticle};
use crate::providers::ProviderRegistry;
use crate::storage::ImageStore;
use crate::tasks::{ArticleTask, ImagePromptTask, ImageTask};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

pub struct Pipeline {
    article: ArticleTask,
    image_prompt: ImagePromptTask,
    /// `None` when images are skipped.
    image: Option<ImageTask>,
}

impl Pipeline {
    pub fn new(article: ArticleTask, image_prompt: ImagePromptTask, image: Option<ImageTask>) -> Self {
        Self {
            article,
            image_prompt,
            image,
        }
    }

    /// Resolve every task's chain from `registry`. Pass `store` to enable
    /// the image stage.
    pub fn from_config(
        config: &AppConfig,
        registry: &ProviderRegistry,
        store: Option<Arc<dyn ImageStore>>,
    ) -> Result<Self, ConfigError> {
        let article = ArticleTask::new(registry.chain("article", &config.chains.article)?, config.limits);

        let mut image_prompt =
            ImagePromptTask::new(registry.chain("image_prompt", &config.chains.image_prompt)?, config.limits);
        if let Some(keywords) = &config.human_keywords {
            image_prompt = image_prompt.with_human_keywords(keywords.clone());
        }

        let image = match store {
            Some(store) => Some(ImageTask::new(
                registry.chain("image", &config.chains.image)?,
                store,
                config.limits,
            )),
            None => None,
        };

        Ok(Self::new(article, image_prompt, image))
    }

    /// Draft the article, then (unless images are skipped) generate and
    /// store its image.
    ///
    /// # Arguments
    ///
    /// * `topic` - Headline or subject for every stage
    /// * `category` - Category the article must be filed under, if any
    /// * `context` - Source material for the article
    ///
    /// # Returns
    ///
    /// The combined [`PublishedArticle`]. The image prompt always uses the
    /// article's category. The first failing stage aborts the pass with its
    /// [`TaskError`].
    #[instrument(level = "info", skip(self, context), fields(with_image = self.image.is_some()))]
    pub async fn run(
        &self,
        topic: &str,
        category: Option<Category>,
        context: Option<&str>,
    ) -> Result<PublishedArticle, TaskError> {
        let article = self.article.run_with_context(topic, category, context).await?.value;

        let (image_prompt, image) = match &self.image {
            Some(image_task) => {
                let prompt = self.image_prompt.run(topic, Some(article.category)).await?.value;
                let image = image_task.run(topic, &prompt).await?.value;
                (Some(prompt), Some(image))
            }
            None => (None, None),
        };

        info!(
            title = %article.title,
            category = %article.category,
            image = image.as_ref().map(|i| i.image_url.as_str()).unwrap_or("-"),
            "Pipeline pass complete"
        );
        Ok(PublishedArticle {
            topic: topic.trim().to_string(),
            article,
            image_prompt,
            image,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::error::{ProviderError, TaskName};
    use crate::models::Payload;
    use crate::providers::testing::{ScriptedProvider, chain, jpeg_bytes};
    use crate::storage::testing::RecordingStore;
    use serde_json::json;

    fn article_json() -> serde_json::Value {
        json!({"title": "Chip shortage deepens", "body": "Lead times grew again.", "category": "Tech"})
    }

    #[tokio::test]
    async fn test_full_pass_produces_every_record() {
        let writer = ScriptedProvider::json("openai", article_json());
        let prompter = ScriptedProvider::json("grok", json!({"prompt": "empty semiconductor fab floor"}));
        let painter = ScriptedProvider::new(
            "flux",
            vec![Ok(Payload::ImageBytes {
                bytes: jpeg_bytes(),
                mime: "image/jpeg".to_string(),
            })],
        );
        let store = Arc::new(RecordingStore::ok());
        let pipeline = Pipeline::new(
            ArticleTask::new(chain("article", &[writer]), Limits::default()),
            ImagePromptTask::new(chain("image_prompt", &[prompter.clone()]), Limits::default()),
            Some(ImageTask::new(chain("image", &[painter]), store.clone(), Limits::default())),
        );

        let published = pipeline.run(" Global chip shortage worsens ", None, None).await.unwrap();
        assert_eq!(published.topic, "Global chip shortage worsens");
        assert_eq!(published.article.provider, "openai");
        assert_eq!(published.image_prompt.as_ref().unwrap().provider, "grok");
        assert_eq!(published.image.as_ref().unwrap().provider, "flux");
        assert_eq!(store.uploads(), 1);
        // category falls back to the article's own
        assert!(prompter.last_request().unwrap().user_instruction.contains("Category: Tech"));
    }

    #[tokio::test]
    async fn test_requested_category_is_what_gets_published() {
        let off_topic = ScriptedProvider::json(
            "openai",
            json!({"title": "Derby day", "body": "The match ended level.", "category": "Sports"}),
        );
        let writer = ScriptedProvider::json("grok", article_json());
        let prompter = ScriptedProvider::json("gemini", json!({"prompt": "empty semiconductor fab floor"}));
        let painter = ScriptedProvider::new(
            "flux",
            vec![Ok(Payload::ImageBytes {
                bytes: jpeg_bytes(),
                mime: "image/jpeg".to_string(),
            })],
        );
        let pipeline = Pipeline::new(
            ArticleTask::new(chain("article", &[off_topic, writer]), Limits::default()),
            ImagePromptTask::new(chain("image_prompt", &[prompter.clone()]), Limits::default()),
            Some(ImageTask::new(
                chain("image", &[painter]),
                Arc::new(RecordingStore::ok()),
                Limits::default(),
            )),
        );

        let published = pipeline
            .run("Global chip shortage worsens", Some(Category::Tech), None)
            .await
            .unwrap();
        assert_eq!(published.article.category, Category::Tech);
        assert_eq!(published.article.provider, "grok");
        assert!(prompter.last_request().unwrap().user_instruction.contains("Category: Tech"));
    }

    #[tokio::test]
    async fn test_skipping_images_calls_no_image_provider() {
        let prompter = ScriptedProvider::json("grok", json!({"prompt": "x"}));
        let pipeline = Pipeline::new(
            ArticleTask::new(chain("article", &[ScriptedProvider::json("openai", article_json())]), Limits::default()),
            ImagePromptTask::new(chain("image_prompt", &[prompter.clone()]), Limits::default()),
            None,
        );

        let published = pipeline.run("Chips", Some(Category::Tech), None).await.unwrap();
        assert!(published.image.is_none());
        assert!(published.image_prompt.is_none());
        assert_eq!(prompter.calls(), 0);
    }

    #[tokio::test]
    async fn test_article_failure_stops_the_pass() {
        let prompter = ScriptedProvider::json("grok", json!({"prompt": "x"}));
        let pipeline = Pipeline::new(
            ArticleTask::new(
                chain("article", &[ScriptedProvider::failing("openai", ProviderError::transport("down"))]),
                Limits::default(),
            ),
            ImagePromptTask::new(chain("image_prompt", &[prompter.clone()]), Limits::default()),
            None,
        );

        let err = pipeline.run("Chips", None, None).await.unwrap_err();
        assert_eq!(err.task(), TaskName::Article);
        assert_eq!(prompter.calls(), 0);
    }

    #[test]
    fn test_from_config_resolves_chains() {
        let config = AppConfig::from_yaml(
            r#"
providers:
  - id: openai
    kind: openai_chat
    model: gpt-4o-mini
  - id: flux
    kind: hugging_face_image
    model: black-forest-labs/FLUX.1-schnell
chains:
  article: [openai]
  image_prompt: [openai]
  image: [flux]
human_keywords: [chef]
"#,
        )
        .unwrap();
        let registry = ProviderRegistry::from_configs(&config.providers).unwrap();

        let pipeline = Pipeline::from_config(&config, &registry, None).unwrap();
        assert!(pipeline.image.is_none());
        assert!(pipeline.image_prompt.humans_allowed("Chefs compete", None));

        let store: Arc<dyn ImageStore> = Arc::new(RecordingStore::ok());
        assert!(Pipeline::from_config(&config, &registry, Some(store)).unwrap().image.is_some());
    }
}

//! # newsdesk_forge
//!
//! Drafts a news article for a topic, generates an editorial image for it
//! and files the result as JSON. Every generation step goes through an
//! ordered chain of AI providers: the first provider whose output passes
//! schema validation and content policy wins, the rest are never called.
//!
//! ## Usage
//!
//! ```sh
//! newsdesk_forge --topic "Global chip shortage worsens" --category tech -c newsdesk.yaml
//! ```
//!
//! ## Architecture
//!
//! 1. **Sources**: optionally fetch supporting articles (bounded concurrency)
//!    and fold them into a length-capped context block
//! 2. **Article**: draft title, summary, body and category
//! 3. **Image prompt**: derive a topic-bound prompt and negative list
//! 4. **Image**: generate the picture and copy it to permanent storage
//! 5. **Output**: write the combined record to `{output_dir}/{date}/{slug}.json`

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod context;
mod error;
mod models;
mod normalize;
mod orchestrator;
mod outputs;
mod pipeline;
mod providers;
mod schema;
mod sources;
mod storage;
mod tasks;
mod utils;

use cli::Cli;
use pipeline::Pipeline;
use providers::ProviderRegistry;
use storage::{CloudinaryStore, ImageStore};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newsdesk_forge starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // Fail before spending any provider quota on an unwritable output dir
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Config & providers ----
    let config = config::load_config(&args.config)?;
    info!(config_path = %args.config, providers = config.providers.len(), "Loaded configuration");
    let registry = ProviderRegistry::from_configs(&config.providers)?;

    let http = reqwest::Client::new();
    let store: Option<Arc<dyn ImageStore>> = if args.skip_image {
        info!("Image stage disabled");
        None
    } else {
        match &config.storage {
            Some(storage) => Some(Arc::new(CloudinaryStore::new(storage.clone(), http.clone()))),
            None => {
                error!("Image stage needs a `storage` section in the config (or pass --skip-image)");
                return Err("missing storage configuration".into());
            }
        }
    };
    let pipeline = Pipeline::from_config(&config, &registry, store)?;

    // ---- Sources ----
    let context = if args.source_urls.is_empty() {
        None
    } else {
        let articles = sources::fetch_sources(&http, args.source_urls.clone(), args.fetch_workers).await;
        if articles.is_empty() {
            warn!("No source article could be extracted");
        }
        Some(context::build_context(&articles, &args.topic, context::DEFAULT_MAX_CHARS))
    };

    // ---- Generate ----
    let published = match pipeline.run(&args.topic, args.category, context.as_deref()).await {
        Ok(published) => published,
        Err(e) => {
            error!(task = %e.task(), error = %e, "Pipeline pass failed; nothing published");
            return Err(e.into());
        }
    };

    // ---- Output ----
    let path = outputs::json::write_article(&published, &args.output_dir).await?;

    info!(
        path = %path.display(),
        provider = %published.article.provider,
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "newsdesk_forge finished"
    );
    Ok(())
}

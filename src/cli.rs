//! Command-line interface definitions for newsdesk_forge.
//!
//! All options can be passed as flags; the config path also falls back to an
//! environment variable.

use crate::models::Category;
use crate::sources::DEFAULT_WORKERS;
use clap::Parser;

/// Draft, illustrate and file one news article.
///
/// # Examples
///
/// ```sh
/// # Article and image, providers from ./newsdesk.yaml
/// newsdesk_forge --topic "Global chip shortage worsens" --category tech
///
/// # With supporting sources, no image
/// newsdesk_forge -t "Port strike" -s https://example.com/a -s https://example.com/b --skip-image
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Topic or headline to write about
    #[arg(short, long)]
    pub topic: String,

    /// Category to file the article under (the model picks when omitted)
    #[arg(long, value_enum)]
    pub category: Option<Category>,

    /// Path to the YAML config file
    #[arg(short, long, env = "NEWSDESK_CONFIG", default_value = "newsdesk.yaml")]
    pub config: String,

    /// Output directory for the JSON article files
    #[arg(short, long, default_value = "./out")]
    pub output_dir: String,

    /// Source article URL to draft from (repeatable)
    #[arg(short, long = "source-url")]
    pub source_urls: Vec<String>,

    /// Skip image prompt generation, image generation and upload
    #[arg(long)]
    pub skip_image: bool,

    /// Maximum concurrent source fetches
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub fetch_workers: usize,
}

//! JSON output of finished pipeline passes.
//!
//! # Output Structure
//!
//! Files are organized by the UTC date the article was generated:
//! ```text
//! output_dir/
//! └── 2025-05-06/
//!     ├── global-chip-shortage-worsens.json
//!     └── port-strike-enters-second-week.json
//! ```
//!
//! A second pass on the same topic and day overwrites the earlier file.

use crate::models::PublishedArticle;
use crate::utils::slugify;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// `{output_dir}/{YYYY-MM-DD}/{slug}.json` for an article.
pub fn article_path(published: &PublishedArticle, output_dir: &str) -> PathBuf {
    let date = published.generated_at.date_naive().to_string();
    let mut slug = slugify(&published.article.title, '-');
    if slug.is_empty() {
        slug = slugify(&published.topic, '-');
    }
    if slug.is_empty() {
        slug = "article".to_string();
    }
    Path::new(output_dir).join(date).join(format!("{slug}.json"))
}

/// Serialize `published` as pretty JSON and write it under `output_dir`.
///
/// Returns the path written.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir))]
pub async fn write_article(published: &PublishedArticle, output_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(published)?;
    let path = article_path(published, output_dir);

    if let Some(dir) = path.parent() {
        info!(dir = %dir.display(), "Ensuring JSON directory exists");
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote article JSON");
    Ok(path)
}

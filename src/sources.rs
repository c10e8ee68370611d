//! Supporting source articles, fetched before drafting.
//!
//! URLs are fetched concurrently through a bounded pool. A URL that fails to
//! download or yields no readable text is logged and skipped; the batch
//! never fails as a whole.

use crate::models::SourceArticle;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use scraper::{Html, Selector};
use std::error::Error;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_WORKERS: usize = 5;
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Paragraphs shorter than this are navigation, bylines or captions.
const MIN_PARAGRAPH_CHARS: usize = 40;

/// Fetch and extract every URL, at most `workers` at a time.
///
/// Output order follows completion, not input order.
#[instrument(level = "info", skip_all, fields(urls = urls.len(), workers = workers))]
pub async fn fetch_sources(http: &Client, urls: Vec<String>, workers: usize) -> Vec<SourceArticle> {
    let articles: Vec<SourceArticle> = stream::iter(urls)
        .map(|url| async move {
            match fetch_source(http, &url).await {
                Ok(Some(article)) => {
                    debug!(%url, chars = article.text.chars().count(), "Fetched source");
                    Some(article)
                }
                Ok(None) => {
                    warn!(%url, "Source produced no readable text; skipping");
                    None
                }
                Err(e) => {
                    warn!(%url, error = %e, "Source fetch failed; skipping");
                    None
                }
            }
        })
        .buffer_unordered(workers.max(1))
        .filter_map(std::future::ready)
        .collect()
        .await;

    info!(count = articles.len(), "Fetched source articles");
    articles
}

#[instrument(level = "debug", skip(http))]
async fn fetch_source(http: &Client, url: &str) -> Result<Option<SourceArticle>, Box<dyn Error + Send + Sync>> {
    let html = http
        .get(url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(extract_article(url, &html))
}

/// Pull the headline and body paragraphs out of an article page.
pub fn extract_article(url: &str, html: &str) -> Option<SourceArticle> {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title").ok()?;
    let headline_selector = Selector::parse("h1").ok()?;
    let paragraph_selector = Selector::parse("p").ok()?;

    let title = document
        .select(&headline_selector)
        .chain(document.select(&title_selector))
        .map(|e| collapse(e.text()))
        .find(|t| !t.is_empty())
        .unwrap_or_default();

    let mut paragraphs: Vec<String> = Vec::new();
    for element in document.select(&paragraph_selector) {
        let text = collapse(element.text());
        if text.chars().count() >= MIN_PARAGRAPH_CHARS && !paragraphs.contains(&text) {
            paragraphs.push(text);
        }
    }

    if paragraphs.is_empty() {
        return None;
    }
    Some(SourceArticle {
        url: url.to_string(),
        title,
        text: paragraphs.join("\n"),
    })
}

/// Join text nodes and collapse runs of whitespace.
fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

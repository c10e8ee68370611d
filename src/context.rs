//! Source context handed to the article writer.

use crate::models::SourceArticle;
use tracing::{debug, info};

pub const DEFAULT_MAX_CHARS: usize = 12_000;

fn block(article: &SourceArticle) -> String {
    format!(
        "SOURCE: {}\nTITLE: {}\nCONTENT:\n{}\n",
        article.url,
        article.title,
        article.text.trim()
    )
}

/// Concatenate SOURCE/TITLE/CONTENT blocks until the next one would pass
/// `max_chars`.
///
/// With nothing usable it degrades to a headline-only summary, so the writer
/// always gets something to anchor on.
pub fn build_context(articles: &[SourceArticle], headline: &str, max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;
    let mut included = 0usize;

    for article in articles {
        let block = block(article);
        let len = block.chars().count() + 1;
        if used + len > max_chars {
            debug!(url = %article.url, "Context full; dropping remaining sources");
            break;
        }
        context.push_str(&block);
        context.push('\n');
        used += len;
        included += 1;
    }

    if included == 0 {
        info!(sources = articles.len(), "No source fit the context; using headline only");
        return headline_summary(headline);
    }

    info!(included, sources = articles.len(), chars = used, "Built source context");
    context.trim().to_string()
}

fn headline_summary(headline: &str) -> String {
    format!(
        "HEADLINE: {}\nNo source articles could be retrieved. Report only what the headline states.",
        headline.trim()
    )
}

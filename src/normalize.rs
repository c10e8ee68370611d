//! Domain policy applied to validated provider output.
//!
//! These functions are task-agnostic; each task combines them with its own
//! limits and term tables. Everything here is pure and idempotent: running a
//! normalized value through the same step again yields the same value.

use crate::models::{Category, split_terms};
use itertools::Itertools;

/// How far back from a length limit a word boundary is searched for.
pub const BOUNDARY_WINDOW: usize = 20;

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ','
}

fn collect_trimmed(chars: &[char]) -> String {
    let s: String = chars.iter().collect();
    s.trim_end_matches(is_separator).to_string()
}

/// Trim `text` and cut it to at most `max` characters.
///
/// The cut lands on the last whitespace or comma within the final
/// [`BOUNDARY_WINDOW`] characters before the limit, so words are not split
/// when that can be avoided. Without such a separator it is a hard cut.
/// A non-empty input never yields an empty output while `max > 0`.
pub fn truncate_at_boundary(text: &str, max: usize) -> String {
    let text = text.trim();
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }

    // The window already ends on a word.
    if is_separator(chars[max]) {
        let kept = collect_trimmed(&chars[..max]);
        if !kept.is_empty() {
            return kept;
        }
    }

    let window_start = max.saturating_sub(BOUNDARY_WINDOW);
    let kept = (window_start..max)
        .rev()
        .find(|&i| is_separator(chars[i]))
        .map(|i| collect_trimmed(&chars[..i]))
        .unwrap_or_default();

    if kept.is_empty() {
        chars[..max].iter().collect::<String>().trim_end().to_string()
    } else {
        kept
    }
}

/// Merge two term lists: `base` first, then `extra`, dropping blanks and
/// case-insensitive duplicates while keeping first occurrences in order.
pub fn merge_terms(base: &[&str], extra: &[&str]) -> Vec<String> {
    base.iter()
        .chain(extra.iter())
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .unique_by(|t| t.to_lowercase())
        .map(str::to_string)
        .collect()
}

/// Join terms with `", "`, keeping whole terms only, until `max` characters.
///
/// The first term is always kept so a guard list can't vanish; callers keep
/// `max` above the length of their leading guard term.
pub fn join_terms_within(terms: &[String], max: usize) -> String {
    let mut out = String::new();
    for term in terms {
        let extra = if out.is_empty() { term.chars().count() } else { term.chars().count() + 2 };
        if !out.is_empty() && out.chars().count() + extra > max {
            break;
        }
        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(term);
    }
    out
}

/// Build a negative/forbidden-content list.
///
/// Order: `guard` terms, then `base`, then whatever the provider supplied.
/// Deduplicated and capped at `max` characters by whole terms.
pub fn negative_list(guard: &[&str], base: &[&str], provider: Option<&str>, max: usize) -> String {
    let leading: Vec<&str> = guard.iter().chain(base.iter()).copied().collect();
    let supplied = provider.map(split_terms).unwrap_or_default();
    join_terms_within(&merge_terms(&leading, &supplied), max)
}

/// Whether an image for this topic may show people.
///
/// Humans are allowed only when a word of the topic (or category name)
/// starts with one of `keywords`, e.g. `team` matches "teams" but not "steam".
pub fn humans_allowed(topic: &str, category: Option<Category>, keywords: &[String]) -> bool {
    let haystack = match category {
        Some(c) => format!("{topic} {c}"),
        None => topic.to_string(),
    }
    .to_lowercase();

    haystack
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .any(|word| keywords.iter().any(|k| word.starts_with(k.as_str())))
}

/// True if any of `markers` appears as a term of the comma-separated `list`.
pub fn contains_any_term(list: &str, markers: &[&str]) -> bool {
    split_terms(list)
        .iter()
        .any(|term| markers.iter().any(|m| term.eq_ignore_ascii_case(m)))
}

/// Leading whole sentences of `body` that fit in `max` characters.
///
/// Falls back to a boundary truncation of the first sentence when even that
/// one is too long.
pub fn lead_sentences(body: &str, max: usize) -> String {
    let body = body.trim();
    let mut out = String::new();
    let mut sentence_start = 0;
    let mut iter = body.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        let at_end = match iter.peek() {
            None => true,
            Some((_, next)) => matches!(c, '.' | '!' | '?') && next.is_whitespace(),
        };
        if !at_end {
            continue;
        }
        let end = i + c.len_utf8();
        let candidate = body[..end].trim();
        if candidate.chars().count() > max {
            break;
        }
        out = candidate.to_string();
        sentence_start = end;
    }

    if out.is_empty() {
        truncate_at_boundary(&body[sentence_start..], max)
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_text_is_only_trimmed() {
        assert_eq!(truncate_at_boundary("  harbor at dawn ", 100), "harbor at dawn");
    }

    #[test]
    fn test_cut_lands_on_word_boundary() {
        let text = "wide realistic establishing shot of a container harbor";
        let out = truncate_at_boundary(text, 30);
        assert_eq!(out, "wide realistic establishing");
    }

    #[test]
    fn test_cut_prefers_comma_and_trims_it() {
        let out = truncate_at_boundary("blurry, watermark, deformed hands", 22);
        assert_eq!(out, "blurry, watermark");
    }

    #[test]
    fn test_exact_word_end_keeps_full_window() {
        assert_eq!(truncate_at_boundary("alpha beta gamma", 10), "alpha beta");
    }

    #[test]
    fn test_no_boundary_in_window_is_hard_cut() {
        let text = format!("a {}", "x".repeat(60));
        let out = truncate_at_boundary(&text, 40);
        assert_eq!(out.chars().count(), 40);
    }

    #[test]
    fn test_truncation_is_idempotent() {
        let text = "Supply chains for advanced chips remain strained as demand rises";
        let once = truncate_at_boundary(text, 33);
        assert_eq!(truncate_at_boundary(&once, 33), once);
    }

    #[test]
    fn test_merge_terms_dedupes_case_insensitively_base_first() {
        let merged = merge_terms(&["blurry", "Watermark"], &["watermark", "", "text", "BLURRY", "logo"]);
        assert_eq!(merged, vec!["blurry", "Watermark", "text", "logo"]);
    }

    #[test]
    fn test_join_terms_within_keeps_whole_terms() {
        let terms: Vec<String> = ["people", "person", "human"].iter().map(|s| s.to_string()).collect();
        assert_eq!(join_terms_within(&terms, 14), "people, person");
        assert_eq!(join_terms_within(&terms, 3), "people");
    }

    #[test]
    fn test_negative_list_order_and_guard() {
        let list = negative_list(&["people", "crowd"], &["blurry"], Some("Blurry, lens flare"), 200);
        assert_eq!(list, "people, crowd, blurry, lens flare");
        assert_eq!(negative_list(&[], &["blurry"], None, 200), "blurry");
    }

    #[test]
    fn test_humans_allowed_keyword_prefix_match() {
        let keywords: Vec<String> = ["team", "crowd", "fans"].iter().map(|s| s.to_string()).collect();
        assert!(humans_allowed("Home teams celebrate title", None, &keywords));
        assert!(humans_allowed("CROWD gathers downtown", None, &keywords));
        assert!(!humans_allowed("Steam prices spike", None, &keywords));
        assert!(!humans_allowed("Global chip shortage worsens", Some(Category::Tech), &keywords));
    }

    #[test]
    fn test_contains_any_term() {
        assert!(contains_any_term("blurry, People , logo", &["people"]));
        assert!(!contains_any_term("blurry, peoplesoft", &["people"]));
    }

    #[test]
    fn test_lead_sentences() {
        let body = "Chip supply tightened again. Automakers cut output. Analysts expect relief in 2027.";
        assert_eq!(lead_sentences(body, 60), "Chip supply tightened again. Automakers cut output.");
        assert_eq!(lead_sentences(body, 500), body);
        let long = "One very long opening sentence without any stop for quite a while";
        assert!(lead_sentences(long, 20).chars().count() <= 20);
    }

    proptest! {
        #[test]
        fn prop_truncation_respects_limit_and_boundary(
            words in proptest::collection::vec("[a-z]{1,12}", 1..40),
            max in 1usize..120,
        ) {
            let text = words.join(" ");
            let out = truncate_at_boundary(&text, max);
            let out_len = out.chars().count();
            prop_assert!(out_len <= max);
            prop_assert!(!out.is_empty());

            let chars: Vec<char> = text.chars().collect();
            if chars.len() > max {
                let window = &chars[max.saturating_sub(BOUNDARY_WINDOW)..=max];
                if window.iter().any(|c| is_separator(*c)) {
                    prop_assert!(is_separator(chars[out_len]));
                }
            } else {
                prop_assert_eq!(out, text);
            }
        }

        #[test]
        fn prop_guard_terms_survive_any_provider_list(
            provider in proptest::collection::vec("[a-z ]{0,15}", 0..30),
            max in 64usize..400,
        ) {
            let supplied = provider.join(",");
            let list = negative_list(&["people", "human"], &["blurry", "watermark"], Some(&supplied), max);
            prop_assert!(contains_any_term(&list, &["people", "human"]));
            prop_assert!(list.chars().count() <= max);
        }
    }
}

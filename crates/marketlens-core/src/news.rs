//! News post-processing: cross-source deduplication and keyword sentiment.

use std::collections::HashSet;

use crate::{NewsItem, Sentiment};

/// Length of the normalized title prefix used as the dedup key.
pub const DEDUP_KEY_LEN: usize = 50;

const POSITIVE_TERMS: &[&str] = &[
    "beat", "beats", "bullish", "gain", "gains", "growth", "higher", "jump", "jumps", "outperform",
    "profit", "rally", "rallies", "record", "rise", "rises", "soar", "soars", "strong", "surge",
    "surges", "upgrade", "upgraded",
];

const NEGATIVE_TERMS: &[&str] = &[
    "bearish", "crash", "cut", "cuts", "decline", "declines", "downgrade", "downgraded", "drop",
    "drops", "fall", "falls", "fraud", "lawsuit", "loss", "losses", "miss", "misses", "plunge",
    "plunges", "slump", "weak", "warning",
];

/// Lowercase the title, drop everything that is not alphanumeric, and keep
/// the first [`DEDUP_KEY_LEN`] characters.
pub fn dedup_key(title: &str) -> String {
    title
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|ch| ch.is_alphanumeric())
        .take(DEDUP_KEY_LEN)
        .collect()
}

/// Collapse near-identical articles, newest first, at most `limit` items.
///
/// Items are considered in merge order; the first item seen for a key wins.
/// Items whose title normalizes to an empty key are kept as-is.
pub fn dedupe_news(items: Vec<NewsItem>, limit: usize) -> Vec<NewsItem> {
    let mut seen = HashSet::new();
    let mut unique = items
        .into_iter()
        .filter(|item| {
            let key = dedup_key(&item.title);
            key.is_empty() || seen.insert(key)
        })
        .collect::<Vec<_>>();

    // Stable sort keeps merge order among equal timestamps.
    unique.sort_by(|left, right| right.published_at.cmp(&left.published_at));
    unique.truncate(limit);
    unique
}

/// Score free text against the keyword lexicon.
pub fn keyword_sentiment(text: &str) -> Sentiment {
    let mut score = 0_i32;
    for word in text
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
    {
        let word = word.to_lowercase();
        if POSITIVE_TERMS.contains(&word.as_str()) {
            score += 1;
        } else if NEGATIVE_TERMS.contains(&word.as_str()) {
            score -= 1;
        }
    }

    match score {
        s if s > 0 => Sentiment::Positive,
        s if s < 0 => Sentiment::Negative,
        _ => Sentiment::Neutral,
    }
}

/// Map a provider sentiment label (`Bullish`, `Somewhat-Bearish`, `positive`, ...).
pub fn sentiment_from_label(label: &str) -> Option<Sentiment> {
    let label = label.trim().to_ascii_lowercase();
    if label.contains("bullish") || label.contains("positive") {
        Some(Sentiment::Positive)
    } else if label.contains("bearish") || label.contains("negative") {
        Some(Sentiment::Negative)
    } else if label.contains("neutral") {
        Some(Sentiment::Neutral)
    } else {
        None
    }
}

/// Sentiment for an article without a provider label.
pub fn article_sentiment(title: &str, summary: &str) -> Sentiment {
    keyword_sentiment(&format!("{title} {summary}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProviderId, UtcDateTime};

    fn item(id: &str, title: &str, published_at: &str) -> NewsItem {
        NewsItem {
            id: id.to_owned(),
            title: title.to_owned(),
            summary: String::new(),
            source: String::from("Wire"),
            url: format!("https://news.test/{id}"),
            published_at: UtcDateTime::parse(published_at).expect("timestamp"),
            sentiment: Sentiment::Neutral,
            related_assets: Vec::new(),
            provider: ProviderId::Newsapi,
        }
    }

    #[test]
    fn titles_differing_by_case_and_punctuation_collapse_to_first_seen() {
        let items = vec![
            item("a", "Apple beats earnings, shares up!", "2026-05-01T10:00:00Z"),
            item("b", "apple beats earnings shares up", "2026-05-01T12:00:00Z"),
        ];

        let deduped = dedupe_news(items, 10);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].id, "a");
    }

    #[test]
    fn results_are_sorted_newest_first_and_truncated() {
        let items = vec![
            item("old", "Old story", "2026-05-01T08:00:00Z"),
            item("new", "New story", "2026-05-03T08:00:00Z"),
            item("mid", "Mid story", "2026-05-02T08:00:00Z"),
        ];

        let ids = dedupe_news(items, 2)
            .into_iter()
            .map(|item| item.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[test]
    fn key_uses_fixed_prefix_length() {
        let long = "x".repeat(80);
        assert_eq!(dedup_key(&long).len(), DEDUP_KEY_LEN);

        let a = format!("{} tail one", "y".repeat(DEDUP_KEY_LEN));
        let b = format!("{} tail two", "y".repeat(DEDUP_KEY_LEN));
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }

    #[test]
    fn lexicon_scoring() {
        assert_eq!(keyword_sentiment("Shares surge after record profit"), Sentiment::Positive);
        assert_eq!(keyword_sentiment("Stock plunges on fraud lawsuit"), Sentiment::Negative);
        assert_eq!(keyword_sentiment("Company gains, then falls"), Sentiment::Neutral);
        assert_eq!(article_sentiment("Quarterly update", "analyst upgrade"), Sentiment::Positive);
    }

    #[test]
    fn provider_labels() {
        assert_eq!(sentiment_from_label("Somewhat-Bullish"), Some(Sentiment::Positive));
        assert_eq!(sentiment_from_label("Bearish"), Some(Sentiment::Negative));
        assert_eq!(sentiment_from_label("neutral"), Some(Sentiment::Neutral));
        assert_eq!(sentiment_from_label(""), None);
    }
}

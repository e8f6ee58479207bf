//! Related, stale and digest analyzers built on the search capability

use super::query::MatchExpression;
use super::searcher::Searcher;
use crate::error::Result;
use crate::models::{Digest, ScoredResult, Searchable, StaleItem};
use crate::storage::{SearchCapability, SearchFilters};
use ahash::{AHashSet, HashMap, HashMapExt};
use chrono::{DateTime, Duration, Utc};

/// Function words ignored when extracting related-item terms
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "can", "shall",
    "of", "in", "to", "for", "with", "on", "at", "by", "from", "about", "into", "through",
    "during", "before", "after", "above", "below", "between", "out", "off", "over", "under",
    "again", "further", "then", "once", "and", "but", "or", "nor", "not", "so", "yet", "both",
    "each", "few", "more", "most", "other", "some", "such", "no", "only", "own", "same", "than",
    "too", "very", "just", "because", "as", "until", "while", "if", "that", "this", "it", "its",
    "he", "she", "they", "them", "we", "you", "i", "me", "my", "his", "her", "our", "your",
    "their", "what", "which", "who", "whom", "how", "when", "where", "why", "all", "any",
    "also", "here", "there",
];

/// Stale threshold used by digests
pub const DIGEST_STALE_DAYS: i64 = 30;

/// Number of tags kept in a digest's tag distribution
pub const DIGEST_TOP_TAGS: usize = 20;

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Search terms describing an item: significant primary-text words, then keywords
pub fn related_terms<T: Searchable>(item: &T) -> Vec<String> {
    let words = item
        .primary_text()
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 1 && !is_stop_word(w));
    let keywords = item
        .keywords()
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty());

    let mut seen = AHashSet::new();
    words
        .chain(keywords)
        .filter(|term| seen.insert(term.clone()))
        .collect()
}

/// Items sharing terms with `item`, never including `item` itself
pub fn find_related<T, S>(item: &T, store: &S, limit: usize) -> Vec<ScoredResult<T>>
where
    T: Searchable,
    S: SearchCapability<T> + ?Sized,
{
    let terms = related_terms(item);
    if terms.is_empty() || limit == 0 {
        return Vec::new();
    }

    let expression = MatchExpression::any_of(&terms);
    let mut results =
        Searcher::new(store).search_expression(&expression, &SearchFilters::new(), limit + 1, 0);
    results.retain(|r| r.item.id() != item.id());
    results.truncate(limit);
    results
}

/// [`find_related`] for an item looked up by id; empty when it does not exist
pub fn suggest_related<T, S>(id: &str, store: &S, limit: usize) -> Result<Vec<ScoredResult<T>>>
where
    T: Searchable,
    S: SearchCapability<T> + ?Sized,
{
    Ok(match store.lookup(id)? {
        Some(item) => find_related(&item, store, limit),
        None => Vec::new(),
    })
}

/// Visible items not updated within `days` of `now`, most stale first
pub fn find_stale<T, S>(store: &S, days: i64, now: DateTime<Utc>) -> Result<Vec<StaleItem<T>>>
where
    T: Searchable,
    S: SearchCapability<T> + ?Sized,
{
    let cutoff = now - Duration::days(days);
    let mut stale: Vec<StaleItem<T>> = store
        .list_all()?
        .into_iter()
        .filter(|item| item.relevance() > 0.0 && item.updated_at() < cutoff)
        .map(|item| StaleItem {
            days_since_update: (now - item.updated_at()).num_days(),
            item,
        })
        .collect();

    stale.sort_by(|a, b| {
        b.days_since_update
            .cmp(&a.days_since_update)
            .then_with(|| a.item.updated_at().cmp(&b.item.updated_at()))
    });
    Ok(stale)
}

/// Count occurrences, ordered by count descending then first appearance
fn ranked_counts<'a>(values: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        let count = counts.entry(value).or_insert(0);
        if *count == 0 {
            order.push(value);
        }
        *count += 1;
    }

    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|v| (v.to_string(), counts.get(v).copied().unwrap_or(0)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

/// Read-only snapshot of the whole corpus
pub fn build_digest<T, S>(store: &S, now: DateTime<Utc>) -> Result<Digest<T>>
where
    T: Searchable,
    S: SearchCapability<T> + ?Sized,
{
    let all = store.list_all()?;
    let total_items = all.len();
    let (visible, forgotten): (Vec<T>, Vec<T>) =
        all.into_iter().partition(|item| item.relevance() > 0.0);

    let since = now - Duration::hours(24);
    let recent: Vec<T> = visible
        .iter()
        .filter(|item| item.updated_at() >= since || item.created_at() >= since)
        .cloned()
        .collect();

    let category_distribution =
        ranked_counts(visible.iter().map(|i| i.category()).filter(|c| !c.is_empty()));

    let mut tag_distribution =
        ranked_counts(visible.iter().flat_map(|i| i.keywords().iter().map(String::as_str)));
    tag_distribution.truncate(DIGEST_TOP_TAGS);

    let cutoff = now - Duration::days(DIGEST_STALE_DAYS);
    let stale_count = visible.iter().filter(|i| i.updated_at() < cutoff).count();

    Ok(Digest {
        total_items,
        forgotten_items: forgotten.len(),
        recent,
        category_distribution,
        tag_distribution,
        stale_count,
    })
}

//! Relevance scoring model
//!
//! The engine reports BM25 scores where more negative means more relevant.
//! Scores are flipped to a "larger is better" scale and multiplied by the
//! item's own relevance, so a note forgotten down to 0.3 keeps 30% of its
//! natural score and a note at 0.0 never shows up at all.

use crate::models::{ScoredResult, SearchHit, Searchable};
use std::cmp::Ordering;

/// Per-column BM25 weights for a searchable kind, in index column order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnWeights {
    pub primary: f64,
    pub secondary: f64,
    pub tertiary: f64,
}

impl ColumnWeights {
    /// Notes: title, content, tags
    pub const NOTES: ColumnWeights = ColumnWeights {
        primary: 3.0,
        secondary: 1.0,
        tertiary: 2.0,
    };

    /// Sessions: summary, user text, assistant text
    pub const SESSIONS: ColumnWeights = ColumnWeights {
        primary: 5.0,
        secondary: 3.0,
        tertiary: 1.0,
    };

    /// Title-only ranking used for near-duplicate title detection
    pub const TITLE_ONLY: ColumnWeights = ColumnWeights {
        primary: 10.0,
        secondary: 0.0,
        tertiary: 0.0,
    };

    /// Render as the argument list of an FTS5 `bm25()` call
    pub fn bm25_args(&self) -> String {
        format!("{:.1}, {:.1}, {:.1}", self.primary, self.secondary, self.tertiary)
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.primary, self.secondary, self.tertiary]
    }
}

/// Map an engine score onto a non-negative, larger-is-better scale
pub fn normalize(raw_score: f64) -> f64 {
    if raw_score.is_finite() {
        raw_score.abs()
    } else {
        0.0
    }
}

/// Final score of a hit given the item's relevance multiplier
pub fn final_score(raw_score: f64, relevance: f64) -> f64 {
    normalize(raw_score) * relevance.clamp(0.0, 1.0)
}

/// Whether an item may take part in search at all
pub fn is_visible<T: Searchable>(item: &T) -> bool {
    item.relevance() > 0.0
}

/// Order by descending score; stable for equal scores
pub fn sort_by_score<T>(results: &mut [ScoredResult<T>]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Turn raw engine hits into ranked results.
///
/// Invisible items are removed before scoring. Engine snippets are carried
/// over; hits without one get an empty snippet for the caller to fill.
pub fn score_hits<T: Searchable>(hits: Vec<SearchHit<T>>) -> Vec<ScoredResult<T>> {
    let mut results: Vec<ScoredResult<T>> = hits
        .into_iter()
        .filter(|hit| is_visible(&hit.item))
        .map(|hit| {
            let score = final_score(hit.raw_score, hit.item.relevance());
            ScoredResult {
                item: hit.item,
                score,
                snippet: hit.snippet.unwrap_or_default(),
            }
        })
        .collect();

    sort_by_score(&mut results);
    results
}

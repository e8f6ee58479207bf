//! Query execution over a storage capability
//!
//! The one place where engine errors meet the search core: a malformed
//! expression is logged and becomes an empty result list.

use super::dedup::deduplicate;
use super::query::{parse_query, MatchExpression};
use super::scoring::score_hits;
use super::snippet::{generate_snippet, DEFAULT_SNIPPET_LENGTH};
use crate::error::KraangError;
use crate::models::{Note, ScoredResult, SearchResponse, Searchable, Session};
use crate::storage::{SearchCapability, SearchFilters};
use std::fmt;
use std::str::FromStr;

/// Which kinds of items a recall covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecallScope {
    #[default]
    All,
    Notes,
    Sessions,
}

impl RecallScope {
    pub fn includes_notes(self) -> bool {
        matches!(self, RecallScope::All | RecallScope::Notes)
    }

    pub fn includes_sessions(self) -> bool {
        matches!(self, RecallScope::All | RecallScope::Sessions)
    }
}

impl FromStr for RecallScope {
    type Err = KraangError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(RecallScope::All),
            "notes" => Ok(RecallScope::Notes),
            "sessions" => Ok(RecallScope::Sessions),
            other => Err(KraangError::InvalidInput(format!(
                "scope must be one of all, notes, sessions; got {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for RecallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecallScope::All => write!(f, "all"),
            RecallScope::Notes => write!(f, "notes"),
            RecallScope::Sessions => write!(f, "sessions"),
        }
    }
}

/// Notes and sessions found for one query
#[derive(Debug, Clone, Default)]
pub struct Recall {
    pub notes: Vec<ScoredResult<Note>>,
    pub sessions: Vec<ScoredResult<Session>>,
}

impl Recall {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.sessions.is_empty()
    }
}

/// Runs compiled queries against a store and ranks the hits
pub struct Searcher<'a, S: ?Sized> {
    store: &'a S,
    snippet_length: usize,
}

impl<'a, S: ?Sized> Searcher<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            snippet_length: DEFAULT_SNIPPET_LENGTH,
        }
    }

    /// Length used for snippets the engine did not supply
    pub fn with_snippet_length(mut self, snippet_length: usize) -> Self {
        self.snippet_length = snippet_length;
        self
    }

    /// Compile `raw`, merge its `tag:` filters, and return one ranked page
    pub fn search<T>(
        &self,
        raw: &str,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> SearchResponse<T>
    where
        T: Searchable,
        S: SearchCapability<T>,
    {
        let parsed = parse_query(raw);
        if parsed.expression.is_empty() {
            return SearchResponse::empty(raw);
        }

        let filters = filters.clone().with_tags(parsed.tags);
        let results = self.search_expression(&parsed.expression, &filters, limit, offset);
        let total = match self.store.count_search(&parsed.expression, &filters) {
            Ok(total) => total.max(offset + results.len()),
            Err(e) => {
                log_search_error(&parsed.expression, &e);
                results.len()
            }
        };

        SearchResponse {
            results,
            total,
            query: raw.to_string(),
        }
    }

    /// Run an already compiled expression; errors yield an empty list.
    ///
    /// Hits are scored, then collapsed to one result per item id before
    /// snippets are filled in.
    pub fn search_expression<T>(
        &self,
        expression: &MatchExpression,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Vec<ScoredResult<T>>
    where
        T: Searchable,
        S: SearchCapability<T>,
    {
        if expression.is_empty() || limit == 0 {
            return Vec::new();
        }

        let hits = match self.store.match_search(expression, filters, limit, offset) {
            Ok(hits) => hits,
            Err(e) => {
                log_search_error(expression, &e);
                return Vec::new();
            }
        };

        let mut results = deduplicate(score_hits(hits));
        if results.iter().any(|r| r.snippet.is_empty()) {
            let terms = expression.terms();
            for result in results.iter_mut().filter(|r| r.snippet.is_empty()) {
                result.snippet = generate_snippet(result.item.body(), &terms, self.snippet_length);
            }
        }
        results
    }

    /// Search notes and/or sessions for the same query text
    pub fn recall(&self, raw: &str, scope: RecallScope, limit: usize) -> Recall
    where
        S: SearchCapability<Note> + SearchCapability<Session>,
    {
        let parsed = parse_query(raw);
        if parsed.expression.is_empty() {
            return Recall::default();
        }

        let note_filters = SearchFilters::new().with_tags(parsed.tags.iter().cloned());
        let notes = if scope.includes_notes() {
            self.search_expression::<Note>(&parsed.expression, &note_filters, limit, 0)
        } else {
            Vec::new()
        };

        // tag filters only narrow notes; sessions have no tags
        let sessions = if scope.includes_sessions() {
            self.search_expression::<Session>(&parsed.expression, &SearchFilters::new(), limit, 0)
        } else {
            Vec::new()
        };

        Recall { notes, sessions }
    }
}

fn log_search_error(expression: &MatchExpression, error: &KraangError) {
    match error {
        KraangError::MalformedQuery { .. } => {
            tracing::warn!("Search rejected expression {:?}: {}", expression.as_str(), error)
        }
        _ => tracing::error!("Search failed for {:?}: {}", expression.as_str(), error),
    }
}

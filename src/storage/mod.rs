//! Storage layer for kraang
//!
//! The search core only talks to storage through [`SearchCapability`].
//! [`SqliteStore`] is the persistent engine (SQLite + FTS5); [`MemoryStore`]
//! is an in-process engine with the same semantics, used for tests and
//! ephemeral stores.

pub mod database;
pub mod memory;
mod notes;
mod sessions;
pub mod sqlite;

use crate::error::Result;
use crate::models::{ItemKind, SearchHit, Searchable};
use crate::search::MatchExpression;
use chrono::{DateTime, Utc};

pub use database::{Database, DbPool, DbStats};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Indexed full-text search over one kind of item
pub trait SearchCapability<T: Searchable> {
    /// Run a compiled expression with metadata filters (AND-combined).
    ///
    /// Hits come back in engine best-first order, after skipping `offset`
    /// and capped at `limit`.
    fn match_search(
        &self,
        expression: &MatchExpression,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchHit<T>>>;

    /// Number of items `match_search` would return without paging
    fn count_search(&self, expression: &MatchExpression, filters: &SearchFilters) -> Result<usize>;

    /// Fetch by exact identifier
    fn lookup(&self, id: &str) -> Result<Option<T>>;

    /// Fetch by deduplication key
    fn lookup_by_key(&self, key: &str) -> Result<Option<T>>;

    /// Every stored item, visible or not
    fn list_all(&self) -> Result<Vec<T>>;
}

/// Relevance-based status of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Full weight (relevance 1.0)
    Active,
    /// Partially forgotten (0.0 < relevance < 1.0)
    Downweighted,
}

impl ItemStatus {
    pub fn of<T: Searchable>(item: &T) -> Option<Self> {
        let relevance = item.relevance();
        if relevance >= 1.0 {
            Some(ItemStatus::Active)
        } else if relevance > 0.0 {
            Some(ItemStatus::Downweighted)
        } else {
            None
        }
    }
}

/// Inclusive timestamp bounds; an open side is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

/// Metadata filters for a search; omitted dimensions do not filter
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Every tag must be present (ASCII case-insensitive)
    pub tags: Vec<String>,
    pub category: Option<String>,
    /// Applied to `updated_at` for notes and `started_at` for sessions
    pub date_range: Option<DateRange>,
    pub status: Option<ItemStatus>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Timestamp the date filter applies to for a given item
    pub fn filter_date<T: Searchable>(item: &T) -> DateTime<Utc> {
        match item.kind() {
            ItemKind::Note => item.updated_at(),
            ItemKind::Session => item.created_at(),
        }
    }

    /// Evaluate all filters against an item
    pub fn matches<T: Searchable>(&self, item: &T) -> bool {
        let tags_ok = self.tags.iter().all(|wanted| {
            item.keywords()
                .iter()
                .any(|tag| tag.eq_ignore_ascii_case(wanted))
        });
        let category_ok = self
            .category
            .as_deref()
            .map_or(true, |c| item.category() == c);
        let date_ok = self
            .date_range
            .map_or(true, |range| range.contains(Self::filter_date(item)));
        let status_ok = self
            .status
            .map_or(true, |status| ItemStatus::of(item) == Some(status));

        tags_ok && category_ok && date_ok && status_ok
    }
}

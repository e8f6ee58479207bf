//! SQLite + FTS5 backed store for notes and sessions

use super::database::{Database, DbConn};
use super::{ItemStatus, SearchCapability, SearchFilters};
use crate::config::AnalysisConfig;
use crate::error::{KraangError, Result};
use crate::models::{Note, SearchHit, Session, StatusReport};
use crate::search::MatchExpression;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Persistent store; all writes are serialized through one lock
pub struct SqliteStore {
    pub(super) db: Database,
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Open (or create) a store at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self::from_database(Database::new(db_path)?))
    }

    /// Open with an explicit connection pool size
    pub fn open_with_pool_size(db_path: &Path, pool_size: u32) -> Result<Self> {
        Ok(Self::from_database(Database::with_pool_size(
            db_path, pool_size,
        )?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Counts and highlights for the status overview
    pub fn status_report(&self, analysis: &AnalysisConfig) -> Result<StatusReport> {
        let (active_notes, forgotten_notes) = self.count_notes()?;
        let mut tags = self.tag_counts()?;
        tags.truncate(analysis.status_tag_limit);
        let mut stale_notes = self.stale_notes(analysis.stale_days)?;
        stale_notes.truncate(analysis.status_stale_limit);

        Ok(StatusReport {
            active_notes,
            forgotten_notes,
            session_count: self.count_sessions()?,
            last_indexed: self.last_indexed_at()?,
            recent_days: analysis.recent_days,
            recent_notes: self.recent_notes(analysis.recent_days, 10)?,
            categories: self.category_counts()?,
            tags,
            stale_days: analysis.stale_days,
            stale_notes,
        })
    }

    pub(super) fn conn(&self) -> Result<DbConn> {
        self.db.get_conn()
    }

    /// Hold the store-wide write lock for a find-then-write sequence
    pub(super) fn write_guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| KraangError::Other(anyhow::anyhow!("store write lock poisoned")))
    }
}

/// Stored timestamp format: RFC 3339, UTC, microseconds
pub(super) fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(super) fn from_db_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decode a JSON string list column, falling back to empty on bad data
pub(super) fn decode_list(raw: &str, column: &str, owner: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("Invalid {} for {}: {}", column, owner, e);
        Vec::new()
    })
}

pub(super) fn encode_list(items: &[String]) -> Result<String> {
    serde_json::to_string(items).map_err(|e| KraangError::Json {
        source: e,
        context: "Failed to encode string list".to_string(),
    })
}

/// SQL fragment plus bound values for a set of note filters
pub(super) fn note_filter_clause(filters: &SearchFilters) -> (String, Vec<Value>) {
    let mut sql = String::new();
    let mut values = Vec::new();

    for tag in &filters.tags {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM json_each(notes.tags_json) AS je \
             WHERE lower(je.value) = lower(?))",
        );
        values.push(Value::Text(tag.clone()));
    }
    if let Some(category) = &filters.category {
        sql.push_str(" AND notes.category = ?");
        values.push(Value::Text(category.clone()));
    }
    if let Some(range) = &filters.date_range {
        if let Some(from) = range.from {
            sql.push_str(" AND notes.updated_at >= ?");
            values.push(Value::Text(to_db_time(from)));
        }
        if let Some(to) = range.to {
            sql.push_str(" AND notes.updated_at <= ?");
            values.push(Value::Text(to_db_time(to)));
        }
    }
    match filters.status {
        Some(ItemStatus::Active) => sql.push_str(" AND notes.relevance >= 1.0"),
        Some(ItemStatus::Downweighted) => sql.push_str(" AND notes.relevance < 1.0"),
        None => {}
    }

    (sql, values)
}

/// Sessions carry no tags or category and are always fully relevant, so
/// some filters rule out every session
pub(super) fn session_filters_exclude_all(filters: &SearchFilters) -> bool {
    !filters.tags.is_empty()
        || filters.category.as_deref().is_some_and(|c| !c.is_empty())
        || filters.status == Some(ItemStatus::Downweighted)
}

pub(super) fn session_filter_clause(filters: &SearchFilters) -> (String, Vec<Value>) {
    let mut sql = String::new();
    let mut values = Vec::new();

    if let Some(range) = &filters.date_range {
        if let Some(from) = range.from {
            sql.push_str(" AND sessions.started_at >= ?");
            values.push(Value::Text(to_db_time(from)));
        }
        if let Some(to) = range.to {
            sql.push_str(" AND sessions.started_at <= ?");
            values.push(Value::Text(to_db_time(to)));
        }
    }

    (sql, values)
}

impl SearchCapability<Note> for SqliteStore {
    fn match_search(
        &self,
        expression: &MatchExpression,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchHit<Note>>> {
        self.match_notes(expression, filters, limit, offset)
    }

    fn count_search(&self, expression: &MatchExpression, filters: &SearchFilters) -> Result<usize> {
        self.count_matching_notes(expression, filters)
    }

    fn lookup(&self, id: &str) -> Result<Option<Note>> {
        self.get_note(id)
    }

    fn lookup_by_key(&self, key: &str) -> Result<Option<Note>> {
        self.get_note_by_title(key)
    }

    fn list_all(&self) -> Result<Vec<Note>> {
        self.all_notes()
    }
}

impl SearchCapability<Session> for SqliteStore {
    fn match_search(
        &self,
        expression: &MatchExpression,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchHit<Session>>> {
        self.match_sessions(expression, filters, limit, offset)
    }

    fn count_search(&self, expression: &MatchExpression, filters: &SearchFilters) -> Result<usize> {
        self.count_matching_sessions(expression, filters)
    }

    fn lookup(&self, id: &str) -> Result<Option<Session>> {
        self.get_session_exact(id)
    }

    fn lookup_by_key(&self, key: &str) -> Result<Option<Session>> {
        self.get_session_by_slug(key)
    }

    fn list_all(&self) -> Result<Vec<Session>> {
        self.all_sessions()
    }
}

//! Note operations on the SQLite store

use super::sqlite::{
    decode_list, encode_list, from_db_time, note_filter_clause, to_db_time, SqliteStore,
};
use super::SearchFilters;
use crate::config::normalize_title;
use crate::error::{KraangError, Result};
use crate::models::{clean_tags, new_note_id, Note, ScoredResult, SearchHit};
use crate::search::scoring::ColumnWeights;
use crate::search::snippet::{ELLIPSIS, HIGHLIGHT_CLOSE, HIGHLIGHT_OPEN};
use crate::search::{compile, MatchExpression, Searcher};
use chrono::{Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

const NOTE_COLUMNS: &str = "notes.note_id, notes.title, notes.title_normalized, notes.content, \
     notes.tags_json, notes.category, notes.relevance, notes.created_at, notes.updated_at";

/// Number of columns in `NOTE_COLUMNS`; extra selected values follow
const NOTE_COLUMN_COUNT: usize = 9;

fn row_to_note(row: &Row<'_>) -> rusqlite::Result<Note> {
    let note_id: String = row.get(0)?;
    let tags_json: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Note {
        tags: decode_list(&tags_json, "tags_json", &note_id),
        title: row.get(1)?,
        title_normalized: row.get(2)?,
        content: row.get(3)?,
        category: row.get(5)?,
        relevance: row.get(6)?,
        created_at: from_db_time(7, &created_at)?,
        updated_at: from_db_time(8, &updated_at)?,
        note_id,
    })
}

impl SqliteStore {
    /// Create or update a note by normalized title. Returns `(note, created)`.
    ///
    /// Either way the note ends up fully relevant again, which is how a
    /// forgotten note is restored.
    pub fn upsert_note(
        &self,
        title: &str,
        content: &str,
        tags: Vec<String>,
        category: &str,
    ) -> Result<(Note, bool)> {
        let title = title.trim();
        if title.is_empty() {
            return Err(KraangError::InvalidInput(
                "title must not be empty".to_string(),
            ));
        }

        let norm = normalize_title(title);
        let tags = clean_tags(tags);
        let tags_json = encode_list(&tags)?;
        let category = category.trim();
        let now = Utc::now();

        let _guard = self.write_guard()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT note_id, created_at FROM notes WHERE title_normalized = ?1",
                params![norm],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (note_id, created_at, created) = match existing {
            Some((note_id, created_at)) => {
                tx.execute(
                    "UPDATE notes SET title = ?1, content = ?2, tags_json = ?3, category = ?4,
                        relevance = 1.0, updated_at = ?5
                     WHERE title_normalized = ?6",
                    params![title, content, tags_json, category, to_db_time(now), norm],
                )?;
                (note_id, from_db_time(1, &created_at)?, false)
            }
            None => {
                let note_id = new_note_id();
                tx.execute(
                    "INSERT INTO notes (note_id, title, title_normalized, content, tags_json,
                        category, relevance, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1.0, ?7, ?7)",
                    params![note_id, title, norm, content, tags_json, category, to_db_time(now)],
                )?;
                (note_id, now, true)
            }
        };
        tx.commit()?;

        tracing::debug!(
            "{} note {} ({})",
            if created { "Created" } else { "Updated" },
            note_id,
            title
        );

        Ok((
            Note {
                note_id,
                title: title.to_string(),
                title_normalized: norm,
                content: content.to_string(),
                tags,
                category: category.to_string(),
                relevance: 1.0,
                created_at,
                updated_at: now,
            },
            created,
        ))
    }

    /// Fetch a note by id
    pub fn get_note(&self, note_id: &str) -> Result<Option<Note>> {
        let conn = self.conn()?;
        let note = conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE note_id = ?1"),
                params![note_id],
                row_to_note,
            )
            .optional()?;
        Ok(note)
    }

    /// Fetch a note by title (normalized before lookup)
    pub fn get_note_by_title(&self, title: &str) -> Result<Option<Note>> {
        let conn = self.conn()?;
        let note = conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE title_normalized = ?1"),
                params![normalize_title(title)],
                row_to_note,
            )
            .optional()?;
        Ok(note)
    }

    /// Set a note's relevance, clamped to [0, 1]. `None` if no such note.
    pub fn set_relevance(&self, title: &str, relevance: f64) -> Result<Option<Note>> {
        let relevance = if relevance.is_nan() {
            0.0
        } else {
            relevance.clamp(0.0, 1.0)
        };
        let norm = normalize_title(title);
        let now = Utc::now();

        let _guard = self.write_guard()?;
        let conn = self.conn()?;

        let Some(mut note) = conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE title_normalized = ?1"),
                params![norm],
                row_to_note,
            )
            .optional()?
        else {
            return Ok(None);
        };

        conn.execute(
            "UPDATE notes SET relevance = ?1, updated_at = ?2 WHERE title_normalized = ?3",
            params![relevance, to_db_time(now), norm],
        )?;

        note.relevance = relevance;
        note.updated_at = now;
        Ok(Some(note))
    }

    /// Permanently remove a note by title. Returns whether a note was removed.
    pub fn delete_note(&self, title: &str) -> Result<bool> {
        let _guard = self.write_guard()?;
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM notes WHERE title_normalized = ?1",
            params![normalize_title(title)],
        )?;
        Ok(removed > 0)
    }

    /// Notes ordered by most recently updated
    pub fn list_notes(&self, include_forgotten: bool, limit: usize, offset: usize) -> Result<Vec<Note>> {
        let visibility = if include_forgotten {
            ""
        } else {
            "WHERE relevance > 0.0"
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes {visibility} ORDER BY updated_at DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let notes = stmt
            .query_map(params![limit as i64, offset as i64], row_to_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    pub(super) fn all_notes(&self) -> Result<Vec<Note>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY updated_at DESC"))?;
        let notes = stmt
            .query_map([], row_to_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// `(active, forgotten)` note counts
    pub fn count_notes(&self) -> Result<(usize, usize)> {
        let conn = self.conn()?;
        let (active, forgotten): (i64, i64) = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN relevance > 0.0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN relevance = 0.0 THEN 1 ELSE 0 END), 0)
             FROM notes",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((active as usize, forgotten as usize))
    }

    /// Visible notes updated within the last `days` days, newest first
    pub fn recent_notes(&self, days: i64, limit: usize) -> Result<Vec<Note>> {
        let cutoff = Utc::now() - Duration::days(days);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE relevance > 0.0 AND updated_at >= ?1
             ORDER BY updated_at DESC LIMIT ?2"
        ))?;
        let notes = stmt
            .query_map(params![to_db_time(cutoff), limit as i64], row_to_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// Visible notes not updated within the last `days` days, oldest first
    pub fn stale_notes(&self, days: i64) -> Result<Vec<Note>> {
        let cutoff = Utc::now() - Duration::days(days);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE relevance > 0.0 AND updated_at < ?1
             ORDER BY updated_at ASC"
        ))?;
        let notes = stmt
            .query_map(params![to_db_time(cutoff)], row_to_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// Tag usage over visible notes, most used first
    pub fn tag_counts(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT je.value AS tag, COUNT(*) AS cnt
             FROM notes, json_each(notes.tags_json) AS je
             WHERE notes.relevance > 0.0
             GROUP BY je.value
             ORDER BY cnt DESC, tag ASC",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Category usage over visible notes, most used first
    pub fn category_counts(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) AS cnt
             FROM notes
             WHERE relevance > 0.0 AND category != ''
             GROUP BY category
             ORDER BY cnt DESC, category ASC",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Visible notes whose titles resemble `title`, for duplicate hints.
    ///
    /// Failures are logged and yield no suggestions.
    pub fn find_similar_titles(&self, title: &str, limit: usize) -> Vec<Note> {
        let expression = compile(title);
        if expression.is_empty() {
            return Vec::new();
        }

        let weights = ColumnWeights::TITLE_ONLY.bm25_args();
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes_fts
             JOIN notes ON notes.rowid = notes_fts.rowid
             WHERE notes_fts MATCH ?1 AND notes.relevance > 0.0
             ORDER BY bm25(notes_fts, {weights})
             LIMIT ?2"
        );

        let run = || -> Result<Vec<Note>> {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&sql)?;
            let notes = stmt
                .query_map(params![expression.as_str(), limit as i64], row_to_note)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(notes)
        };

        run().unwrap_or_else(|e| {
            tracing::warn!("find_similar_titles failed for {:?}: {}", title, e);
            Vec::new()
        })
    }

    pub(super) fn match_notes(
        &self,
        expression: &MatchExpression,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchHit<Note>>> {
        if expression.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let (clause, filter_values) = note_filter_clause(filters);
        let weights = ColumnWeights::NOTES.bm25_args();
        let sql = format!(
            "SELECT {NOTE_COLUMNS}, bm25(notes_fts, {weights}) AS score,
                    snippet(notes_fts, 1, '{HIGHLIGHT_OPEN}', '{HIGHLIGHT_CLOSE}', '{ELLIPSIS}', 32) AS snip
             FROM notes_fts
             JOIN notes ON notes.rowid = notes_fts.rowid
             WHERE notes_fts MATCH ? AND notes.relevance > 0.0{clause}
             ORDER BY bm25(notes_fts, {weights}) * notes.relevance
             LIMIT ? OFFSET ?"
        );

        let mut values = vec![Value::Text(expression.as_str().to_string())];
        values.extend(filter_values);
        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(offset as i64));

        let conn = self.conn()?;
        let run = || -> rusqlite::Result<Vec<SearchHit<Note>>> {
            let mut stmt = conn.prepare(&sql)?;
            let hits = stmt
                .query_map(params_from_iter(values.iter()), |row| {
                    let snippet: Option<String> = row.get(NOTE_COLUMN_COUNT + 1)?;
                    Ok(SearchHit {
                        item: row_to_note(row)?,
                        raw_score: row.get(NOTE_COLUMN_COUNT)?,
                        snippet: snippet.filter(|s| !s.is_empty()),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hits)
        };

        run().map_err(|e| KraangError::from_match_error(expression.as_str(), e))
    }

    pub(super) fn count_matching_notes(
        &self,
        expression: &MatchExpression,
        filters: &SearchFilters,
    ) -> Result<usize> {
        if expression.is_empty() {
            return Ok(0);
        }

        let (clause, filter_values) = note_filter_clause(filters);
        let sql = format!(
            "SELECT COUNT(*) FROM notes_fts
             JOIN notes ON notes.rowid = notes_fts.rowid
             WHERE notes_fts MATCH ? AND notes.relevance > 0.0{clause}"
        );

        let mut values = vec![Value::Text(expression.as_str().to_string())];
        values.extend(filter_values);

        let conn = self.conn()?;
        conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get::<_, i64>(0))
            .map(|count| count as usize)
            .map_err(|e| KraangError::from_match_error(expression.as_str(), e))
    }

    /// Ranked, fail-soft note search for an already compiled expression
    pub fn search_notes(
        &self,
        expression: &MatchExpression,
        limit: usize,
    ) -> Vec<ScoredResult<Note>> {
        Searcher::new(self).search_expression::<Note>(expression, &SearchFilters::new(), limit, 0)
    }
}

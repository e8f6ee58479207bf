//! Session operations on the SQLite store

use super::sqlite::{
    decode_list, encode_list, from_db_time, session_filter_clause, session_filters_exclude_all,
    to_db_time, SqliteStore,
};
use super::SearchFilters;
use crate::error::{KraangError, Result};
use crate::models::{truncate_chars, ScoredResult, SearchHit, Session};
use crate::search::scoring::ColumnWeights;
use crate::search::snippet::{ELLIPSIS, HIGHLIGHT_CLOSE, HIGHLIGHT_OPEN};
use crate::search::{MatchExpression, Searcher};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

const SESSION_COLUMNS: &str = "sessions.session_id, sessions.slug, sessions.project_path, \
     sessions.git_branch, sessions.model, sessions.started_at, sessions.ended_at, \
     sessions.duration_s, sessions.user_turn_count, sessions.assistant_turn_count, \
     sessions.summary, sessions.user_text, sessions.assistant_text, sessions.tools_used_json, \
     sessions.files_edited_json, sessions.source_mtime, sessions.source_size, sessions.indexed_at";

const SESSION_COLUMN_COUNT: usize = 18;

/// Full UUIDs are 36 characters; anything shorter is treated as a prefix
const FULL_ID_LEN: usize = 36;

/// How many characters of each candidate id an ambiguity error shows
const CANDIDATE_ID_LEN: usize = 12;

/// Upper bound on candidates fetched for an ambiguous prefix
const MAX_PREFIX_CANDIDATES: i64 = 5;

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let session_id: String = row.get(0)?;
    let started_at: String = row.get(5)?;
    let ended_at: String = row.get(6)?;
    let tools_json: String = row.get(13)?;
    let files_json: String = row.get(14)?;
    let indexed_at: String = row.get(17)?;

    Ok(Session {
        slug: row.get(1)?,
        project_path: row.get(2)?,
        git_branch: row.get(3)?,
        model: row.get(4)?,
        started_at: from_db_time(5, &started_at)?,
        ended_at: from_db_time(6, &ended_at)?,
        duration_s: row.get(7)?,
        user_turn_count: row.get::<_, i64>(8)?.max(0) as u32,
        assistant_turn_count: row.get::<_, i64>(9)?.max(0) as u32,
        summary: row.get(10)?,
        user_text: row.get(11)?,
        assistant_text: row.get(12)?,
        tools_used: decode_list(&tools_json, "tools_used_json", &session_id),
        files_edited: decode_list(&files_json, "files_edited_json", &session_id),
        source_mtime: row.get(15)?,
        source_size: row.get::<_, i64>(16)?.max(0) as u64,
        indexed_at: from_db_time(17, &indexed_at)?,
        session_id,
    })
}

impl SqliteStore {
    /// Insert or replace a session record
    pub fn upsert_session(&self, session: &Session) -> Result<()> {
        let tools_json = encode_list(&session.tools_used)?;
        let files_json = encode_list(&session.files_edited)?;

        let _guard = self.write_guard()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        // Delete first so the FTS delete trigger cleans up the old row
        tx.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            params![session.session_id],
        )?;
        tx.execute(
            "INSERT INTO sessions
                (session_id, slug, project_path, git_branch, model,
                 started_at, ended_at, duration_s,
                 user_turn_count, assistant_turn_count,
                 summary, user_text, assistant_text,
                 tools_used_json, files_edited_json,
                 source_mtime, source_size, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                session.session_id,
                session.slug,
                session.project_path,
                session.git_branch,
                session.model,
                to_db_time(session.started_at),
                to_db_time(session.ended_at),
                session.duration_s,
                session.user_turn_count as i64,
                session.assistant_turn_count as i64,
                session.summary,
                session.user_text,
                session.assistant_text,
                tools_json,
                files_json,
                session.source_mtime,
                session.source_size as i64,
                to_db_time(session.indexed_at),
            ],
        )?;
        tx.commit()?;

        Ok(())
    }

    /// Fetch a session by full id or unique prefix.
    ///
    /// A prefix matching several sessions is an error carrying the candidates.
    pub fn get_session(&self, id_or_prefix: &str) -> Result<Option<Session>> {
        let prefix = id_or_prefix.trim();
        if prefix.is_empty() {
            return Ok(None);
        }
        if prefix.chars().count() >= FULL_ID_LEN {
            return self.get_session_exact(prefix);
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE substr(session_id, 1, length(?1)) = ?1
             ORDER BY started_at DESC
             LIMIT ?2"
        ))?;
        let mut matches = stmt
            .query_map(params![prefix, MAX_PREFIX_CANDIDATES], row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(KraangError::AmbiguousPrefix {
                prefix: prefix.to_string(),
                candidates: matches
                    .iter()
                    .map(|s| truncate_chars(&s.session_id, CANDIDATE_ID_LEN).to_string())
                    .collect(),
            }),
        }
    }

    pub(super) fn get_session_exact(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1"),
                params![session_id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    pub(super) fn get_session_by_slug(&self, slug: &str) -> Result<Option<Session>> {
        if slug.is_empty() {
            return Ok(None);
        }
        let conn = self.conn()?;
        let session = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE slug = ?1
                     ORDER BY started_at DESC LIMIT 1"
                ),
                params![slug],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Sessions ordered by most recent start
    pub fn list_sessions(&self, limit: usize, offset: usize) -> Result<Vec<Session>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let sessions = stmt
            .query_map(params![limit as i64, offset as i64], row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    pub(super) fn all_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at DESC"
        ))?;
        let sessions = stmt
            .query_map([], row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    pub fn count_sessions(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Whether the transcript file changed since it was last indexed
    pub fn needs_reindex(&self, session_id: &str, mtime: f64, size: u64) -> Result<bool> {
        let conn = self.conn()?;
        let stored: Option<(f64, i64)> = conn
            .query_row(
                "SELECT source_mtime, source_size FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match stored {
            None => true,
            Some((stored_mtime, stored_size)) => {
                stored_mtime != mtime || stored_size != size as i64
            }
        })
    }

    /// Most recent indexing time across all sessions
    pub fn last_indexed_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let last: Option<String> =
            conn.query_row("SELECT MAX(indexed_at) FROM sessions", [], |row| row.get(0))?;
        match last {
            Some(raw) => Ok(Some(from_db_time(0, &raw)?)),
            None => Ok(None),
        }
    }

    pub(super) fn match_sessions(
        &self,
        expression: &MatchExpression,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchHit<Session>>> {
        if expression.is_empty() || limit == 0 || session_filters_exclude_all(filters) {
            return Ok(Vec::new());
        }

        let (clause, filter_values) = session_filter_clause(filters);
        let weights = ColumnWeights::SESSIONS.bm25_args();
        let sql = format!(
            "SELECT {SESSION_COLUMNS}, bm25(sessions_fts, {weights}) AS score,
                    snippet(sessions_fts, 1, '{HIGHLIGHT_OPEN}', '{HIGHLIGHT_CLOSE}', '{ELLIPSIS}', 32) AS snip
             FROM sessions_fts
             JOIN sessions ON sessions.rowid = sessions_fts.rowid
             WHERE sessions_fts MATCH ?{clause}
             ORDER BY score
             LIMIT ? OFFSET ?"
        );

        let mut values = vec![Value::Text(expression.as_str().to_string())];
        values.extend(filter_values);
        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(offset as i64));

        let conn = self.conn()?;
        let run = || -> rusqlite::Result<Vec<SearchHit<Session>>> {
            let mut stmt = conn.prepare(&sql)?;
            let hits = stmt
                .query_map(params_from_iter(values.iter()), |row| {
                    let snippet: Option<String> = row.get(SESSION_COLUMN_COUNT + 1)?;
                    Ok(SearchHit {
                        item: row_to_session(row)?,
                        raw_score: row.get(SESSION_COLUMN_COUNT)?,
                        snippet: snippet.filter(|s| !s.is_empty()),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hits)
        };

        run().map_err(|e| KraangError::from_match_error(expression.as_str(), e))
    }

    pub(super) fn count_matching_sessions(
        &self,
        expression: &MatchExpression,
        filters: &SearchFilters,
    ) -> Result<usize> {
        if expression.is_empty() || session_filters_exclude_all(filters) {
            return Ok(0);
        }

        let (clause, filter_values) = session_filter_clause(filters);
        let sql = format!(
            "SELECT COUNT(*) FROM sessions_fts
             JOIN sessions ON sessions.rowid = sessions_fts.rowid
             WHERE sessions_fts MATCH ?{clause}"
        );

        let mut values = vec![Value::Text(expression.as_str().to_string())];
        values.extend(filter_values);

        let conn = self.conn()?;
        conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get::<_, i64>(0))
            .map(|count| count as usize)
            .map_err(|e| KraangError::from_match_error(expression.as_str(), e))
    }

    /// Ranked, fail-soft session search for an already compiled expression
    pub fn search_sessions(
        &self,
        expression: &MatchExpression,
        limit: usize,
    ) -> Vec<ScoredResult<Session>> {
        Searcher::new(self).search_expression::<Session>(expression, &SearchFilters::new(), limit, 0)
    }
}

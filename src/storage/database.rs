//! SQLite database management with migrations
//!
//! Holds the connection pool and the versioned schema for notes, sessions and
//! their FTS5 indexes.

use crate::error::{KraangError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::{Path, PathBuf};

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled connection handed out by [`Database::get_conn`]
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Default number of pooled connections
pub const DEFAULT_POOL_SIZE: u32 = 8;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
    path: PathBuf,
}

impl Database {
    /// Open (or create) the database at `db_path` with the default pool size
    pub fn new(db_path: &Path) -> Result<Self> {
        Self::with_pool_size(db_path, DEFAULT_POOL_SIZE)
    }

    /// Open (or create) the database with an explicit pool size
    pub fn with_pool_size(db_path: &Path, pool_size: u32) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| KraangError::Io {
                    source: e,
                    context: format!("Failed to create database directory: {:?}", parent),
                })?;
            }
        }

        // Every pooled connection gets the same pragmas
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e| KraangError::Config(format!("Failed to create connection pool: {}", e)))?;

        let db = Self {
            pool,
            path: db_path.to_path_buf(),
        };

        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current schema version
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.get_conn()?;
        let version = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let note_count: i64 = conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;

        let forgotten_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notes WHERE relevance = 0.0",
            [],
            |row| row.get(0),
        )?;

        let session_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;

        let file_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);

        Ok(DbStats {
            note_count: note_count as usize,
            forgotten_count: forgotten_count as usize,
            session_count: session_count as usize,
            file_size_bytes,
        })
    }
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub note_count: usize,
    pub forgotten_count: usize,
    pub session_count: usize,
    pub file_size_bytes: u64,
}

impl DbStats {
    /// Format size as human-readable string
    pub fn format_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.1} {}", size, UNITS[unit_idx])
    }
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: notes and their full-text index
    r#"
    CREATE TABLE notes (
        note_id          TEXT PRIMARY KEY,
        title            TEXT NOT NULL,
        title_normalized TEXT NOT NULL UNIQUE,
        content          TEXT NOT NULL,
        tags_json        TEXT NOT NULL DEFAULT '[]',
        category         TEXT NOT NULL DEFAULT '',
        relevance        REAL NOT NULL DEFAULT 1.0,
        created_at       TEXT NOT NULL,
        updated_at       TEXT NOT NULL
    );

    CREATE INDEX idx_notes_updated ON notes(updated_at);
    CREATE INDEX idx_notes_category ON notes(category);
    CREATE INDEX idx_notes_relevance ON notes(relevance);

    CREATE VIRTUAL TABLE notes_fts USING fts5(
        title, content, tags_json,
        content=notes, content_rowid=rowid,
        tokenize='porter unicode61'
    );

    CREATE TRIGGER notes_ai AFTER INSERT ON notes BEGIN
        INSERT INTO notes_fts(rowid, title, content, tags_json)
        VALUES (NEW.rowid, NEW.title, NEW.content, NEW.tags_json);
    END;

    CREATE TRIGGER notes_ad AFTER DELETE ON notes BEGIN
        INSERT INTO notes_fts(notes_fts, rowid, title, content, tags_json)
        VALUES ('delete', OLD.rowid, OLD.title, OLD.content, OLD.tags_json);
    END;

    CREATE TRIGGER notes_au AFTER UPDATE ON notes BEGIN
        INSERT INTO notes_fts(notes_fts, rowid, title, content, tags_json)
        VALUES ('delete', OLD.rowid, OLD.title, OLD.content, OLD.tags_json);
        INSERT INTO notes_fts(rowid, title, content, tags_json)
        VALUES (NEW.rowid, NEW.title, NEW.content, NEW.tags_json);
    END;
    "#,
    // Migration 2: indexed agent sessions
    r#"
    CREATE TABLE sessions (
        session_id           TEXT PRIMARY KEY,
        slug                 TEXT NOT NULL DEFAULT '',
        project_path         TEXT NOT NULL,
        git_branch           TEXT NOT NULL DEFAULT '',
        model                TEXT NOT NULL DEFAULT '',
        started_at           TEXT NOT NULL,
        ended_at             TEXT NOT NULL,
        duration_s           INTEGER NOT NULL DEFAULT 0,
        user_turn_count      INTEGER NOT NULL DEFAULT 0,
        assistant_turn_count INTEGER NOT NULL DEFAULT 0,
        summary              TEXT NOT NULL DEFAULT '',
        user_text            TEXT NOT NULL DEFAULT '',
        assistant_text       TEXT NOT NULL DEFAULT '',
        tools_used_json      TEXT NOT NULL DEFAULT '[]',
        files_edited_json    TEXT NOT NULL DEFAULT '[]',
        source_mtime         REAL NOT NULL,
        source_size          INTEGER NOT NULL,
        indexed_at           TEXT NOT NULL
    );

    CREATE INDEX idx_sessions_project ON sessions(project_path);
    CREATE INDEX idx_sessions_started ON sessions(started_at);
    CREATE INDEX idx_sessions_slug ON sessions(slug);

    CREATE VIRTUAL TABLE sessions_fts USING fts5(
        summary, user_text, assistant_text,
        content=sessions, content_rowid=rowid,
        tokenize='porter unicode61'
    );

    CREATE TRIGGER sessions_ai AFTER INSERT ON sessions BEGIN
        INSERT INTO sessions_fts(rowid, summary, user_text, assistant_text)
        VALUES (NEW.rowid, NEW.summary, NEW.user_text, NEW.assistant_text);
    END;

    CREATE TRIGGER sessions_ad AFTER DELETE ON sessions BEGIN
        INSERT INTO sessions_fts(sessions_fts, rowid, summary, user_text, assistant_text)
        VALUES ('delete', OLD.rowid, OLD.summary, OLD.user_text, OLD.assistant_text);
    END;

    CREATE TRIGGER sessions_au AFTER UPDATE ON sessions BEGIN
        INSERT INTO sessions_fts(sessions_fts, rowid, summary, user_text, assistant_text)
        VALUES ('delete', OLD.rowid, OLD.summary, OLD.user_text, OLD.assistant_text);
        INSERT INTO sessions_fts(rowid, summary, user_text, assistant_text)
        VALUES (NEW.rowid, NEW.summary, NEW.user_text, NEW.assistant_text);
    END;
    "#,
];

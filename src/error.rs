use std::path::PathBuf;
use thiserror::Error;

/// Main error type for kraang
#[derive(Error, Debug)]
pub enum KraangError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Project has not been initialized
    #[error("Database not found at {}. Run 'kraang init' first.", .path.display())]
    DatabaseNotFound { path: PathBuf },

    /// Caller supplied an unusable argument (empty title, relevance out of range, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Note lookup by title failed where a note was required
    #[error("Note not found: {title}")]
    NoteNotFound { title: String },

    /// A short session id matched more than one session
    #[error("Ambiguous prefix '{prefix}' matches multiple sessions: {}", .candidates.join(", "))]
    AmbiguousPrefix {
        prefix: String,
        candidates: Vec<String>,
    },

    /// The search engine rejected a match expression
    #[error("Malformed query {expression:?}: {message}")]
    MalformedQuery { expression: String, message: String },

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

const MATCH_ERROR_MARKERS: &[&str] = &["fts5", "syntax error", "unterminated string"];

impl KraangError {
    /// Classify a SQLite error raised while running a MATCH query.
    ///
    /// FTS5 reports grammar problems as generic SQLite errors. Messages
    /// containing one of `MATCH_ERROR_MARKERS` become `MalformedQuery`.
    pub fn from_match_error(expression: &str, err: rusqlite::Error) -> Self {
        let message = err.to_string();
        let lowered = message.to_lowercase();
        if MATCH_ERROR_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            KraangError::MalformedQuery {
                expression: expression.to_string(),
                message,
            }
        } else {
            KraangError::Database(err)
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for kraang operations
pub type Result<T> = std::result::Result<T, KraangError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_prefix_lists_candidates() {
        let err = KraangError::AmbiguousPrefix {
            prefix: "abc".to_string(),
            candidates: vec!["abc111111111".to_string(), "abc222222222".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'abc'"));
        assert!(msg.contains("abc111111111, abc222222222"));
    }

    #[test]
    fn test_match_error_classification() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("fts5: syntax error near \"AND\"".to_string()),
        );
        match KraangError::from_match_error("AND", err) {
            KraangError::MalformedQuery { expression, .. } => assert_eq!(expression, "AND"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("unterminated string".to_string()),
        );
        assert!(matches!(
            KraangError::from_match_error("\"a", err),
            KraangError::MalformedQuery { .. }
        ));

        let err = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(
            KraangError::from_match_error("x", err),
            KraangError::Database(_)
        ));
    }
}

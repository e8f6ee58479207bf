//! Shared data contracts for notes, sessions and search results
//!
//! `Note` and `Session` both implement [`Searchable`], which is the only view
//! the search core has of stored items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminates the two kinds of searchable items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Note,
    Session,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Note => write!(f, "note"),
            ItemKind::Session => write!(f, "session"),
        }
    }
}

/// Read-only view over a stored item used by scoring, snippets and analyzers
pub trait Searchable: Clone {
    /// Unique identifier
    fn id(&self) -> &str;

    fn kind(&self) -> ItemKind;

    /// Visibility multiplier in [0.0, 1.0]; 0.0 hides the item from search
    fn relevance(&self) -> f64 {
        1.0
    }

    /// Title-like field, the heaviest weighted text
    fn primary_text(&self) -> &str;

    /// Tags or keywords attached to the item
    fn keywords(&self) -> &[String] {
        &[]
    }

    fn category(&self) -> &str {
        ""
    }

    /// Main text used for fallback snippets
    fn body(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    fn updated_at(&self) -> DateTime<Utc>;

    /// Deduplication key (normalized title, slug, ...)
    fn key(&self) -> &str;
}

/// Generate a short random note id (12 hex characters)
pub fn new_note_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// A single knowledge note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub note_id: String,
    pub title: String,
    pub title_normalized: String,
    pub content: String,
    pub tags: Vec<String>,
    pub category: String,
    pub relevance: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Build a fresh, fully visible note
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        tags: Vec<String>,
        category: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let now = Utc::now();
        Self {
            note_id: new_note_id(),
            title_normalized: crate::config::normalize_title(&title),
            title,
            content: content.into(),
            tags: clean_tags(tags),
            category: category.into().trim().to_string(),
            relevance: 1.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Forgotten notes have relevance exactly 0.0
    pub fn is_forgotten(&self) -> bool {
        self.relevance == 0.0
    }
}

/// Trim tags, drop empties and duplicates while keeping first-seen order
pub fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = ahash::AHashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

impl Searchable for Note {
    fn id(&self) -> &str {
        &self.note_id
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Note
    }

    fn relevance(&self) -> f64 {
        self.relevance
    }

    fn primary_text(&self) -> &str {
        &self.title
    }

    fn keywords(&self) -> &[String] {
        &self.tags
    }

    fn category(&self) -> &str {
        &self.category
    }

    fn body(&self) -> &str {
        &self.content
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn key(&self) -> &str {
        &self.title_normalized
    }
}

/// An indexed agent conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub slug: String,
    pub project_path: String,
    pub git_branch: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_s: i64,
    pub user_turn_count: u32,
    pub assistant_turn_count: u32,
    pub summary: String,
    pub user_text: String,
    pub assistant_text: String,
    pub tools_used: Vec<String>,
    pub files_edited: Vec<String>,
    pub source_mtime: f64,
    pub source_size: u64,
    pub indexed_at: DateTime<Utc>,
}

impl Session {
    pub fn total_turns(&self) -> u32 {
        self.user_turn_count + self.assistant_turn_count
    }

    /// First eight characters of the id, as shown to users
    pub fn short_id(&self) -> &str {
        truncate_chars(&self.session_id, 8)
    }
}

impl Searchable for Session {
    fn id(&self) -> &str {
        &self.session_id
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Session
    }

    fn primary_text(&self) -> &str {
        &self.summary
    }

    fn body(&self) -> &str {
        if self.summary.is_empty() {
            &self.user_text
        } else {
            &self.summary
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    fn key(&self) -> &str {
        &self.slug
    }
}

/// Speaker of a transcript turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnRole {
    User,
    Agent,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "User"),
            TurnRole::Agent => write!(f, "Agent"),
        }
    }
}

/// One cleaned-up turn of a session transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: TurnRole,
    /// Raw timestamp string from the transcript (may be empty)
    pub timestamp: String,
    pub text: String,
    pub tool_calls: Vec<String>,
}

/// A raw hit returned by a storage engine
#[derive(Debug, Clone)]
pub struct SearchHit<T> {
    pub item: T,
    /// Engine-native score; sign and scale are engine-defined
    pub raw_score: f64,
    pub snippet: Option<String>,
}

/// A ranked search result with a non-negative score
#[derive(Debug, Clone, Serialize)]
pub struct ScoredResult<T> {
    pub item: T,
    pub score: f64,
    pub snippet: String,
}

/// Paged search output
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse<T> {
    pub results: Vec<ScoredResult<T>>,
    pub total: usize,
    pub query: String,
}

impl<T> SearchResponse<T> {
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            total: 0,
            query: query.into(),
        }
    }
}

/// An item that has not been touched for a while
#[derive(Debug, Clone, Serialize)]
pub struct StaleItem<T> {
    pub item: T,
    pub days_since_update: i64,
}

/// Aggregate snapshot over a corpus
#[derive(Debug, Clone, Serialize)]
pub struct Digest<T> {
    pub total_items: usize,
    pub forgotten_items: usize,
    pub recent: Vec<T>,
    pub category_distribution: Vec<(String, usize)>,
    pub tag_distribution: Vec<(String, usize)>,
    pub stale_count: usize,
}

/// Everything the status overview shows
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub active_notes: usize,
    pub forgotten_notes: usize,
    pub session_count: usize,
    pub last_indexed: Option<DateTime<Utc>>,
    pub recent_days: i64,
    pub recent_notes: Vec<Note>,
    pub categories: Vec<(String, usize)>,
    pub tags: Vec<(String, usize)>,
    pub stale_days: i64,
    pub stale_notes: Vec<Note>,
}

/// Character-safe prefix of a string
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_note_id_shape() {
        let id = new_note_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_note_id());
    }

    #[test]
    fn test_note_new_normalizes() {
        let note = Note::new(
            "  SQLite   FTS5 Guide ",
            "body",
            vec![" db ".into(), "db".into(), "".into(), "search".into()],
            " engineering ",
        );
        assert_eq!(note.title_normalized, "sqlite fts5 guide");
        assert_eq!(note.tags, vec!["db", "search"]);
        assert_eq!(note.category, "engineering");
        assert_eq!(note.relevance, 1.0);
        assert!(!note.is_forgotten());
        assert_eq!(note.key(), "sqlite fts5 guide");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_turn_role_display() {
        assert_eq!(TurnRole::User.to_string(), "User");
        assert_eq!(TurnRole::Agent.to_string(), "Agent");
    }
}

//! In-memory store with FTS5-compatible match semantics
//!
//! Supports the subset of the MATCH grammar the query compiler emits: quoted
//! phrases, barewords and the `AND`/`OR`/`NOT` operators (precedence
//! `NOT` > `AND` > `OR`, adjacent terms are an implicit `AND`). Scores follow
//! the engine convention of more negative meaning more relevant.

use super::{SearchCapability, SearchFilters};
use crate::config::normalize_title;
use crate::error::{KraangError, Result};
use crate::models::{clean_tags, new_note_id, Note, SearchHit, Searchable, Session};
use crate::search::scoring::ColumnWeights;
use crate::search::MatchExpression;
use chrono::Utc;
use std::cmp::Ordering;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Items the in-memory engine can index: three weighted text columns
pub trait Indexed: Searchable {
    const WEIGHTS: ColumnWeights;

    fn columns(&self) -> [String; 3];
}

impl Indexed for Note {
    const WEIGHTS: ColumnWeights = ColumnWeights::NOTES;

    fn columns(&self) -> [String; 3] {
        [self.title.clone(), self.content.clone(), self.tags.join(" ")]
    }
}

impl Indexed for Session {
    const WEIGHTS: ColumnWeights = ColumnWeights::SESSIONS;

    fn columns(&self) -> [String; 3] {
        [
            self.summary.clone(),
            self.user_text.clone(),
            self.assistant_text.clone(),
        ]
    }
}

/// Lowercased alphanumeric tokens, the way `unicode61` splits text
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(Vec<String>),
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
enum Query {
    Phrase(Vec<String>),
    And(Box<Query>, Box<Query>),
    Or(Box<Query>, Box<Query>),
    Not(Box<Query>, Box<Query>),
}

impl Query {
    fn is_empty_phrase(&self) -> bool {
        matches!(self, Query::Phrase(words) if words.is_empty())
    }
}

fn malformed(expression: &str, message: impl Into<String>) -> KraangError {
    KraangError::MalformedQuery {
        expression: expression.to_string(),
        message: message.into(),
    }
}

fn is_bareword_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || !c.is_ascii()
}

fn lex(expression: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut literal = String::new();
            let mut closed = false;
            while let Some(ch) = chars.next() {
                if ch == '"' {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        literal.push('"');
                    } else {
                        closed = true;
                        break;
                    }
                } else {
                    literal.push(ch);
                }
            }
            if !closed {
                return Err(malformed(expression, "unterminated string"));
            }
            tokens.push(Token::Literal(tokenize(&literal)));
        } else {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() || ch == '"' {
                    break;
                }
                if !is_bareword_char(ch) {
                    return Err(malformed(expression, format!("syntax error near \"{}\"", ch)));
                }
                word.push(ch);
                chars.next();
            }
            tokens.push(match word.as_str() {
                "AND" => Token::And,
                "OR" => Token::Or,
                "NOT" => Token::Not,
                _ => Token::Literal(tokenize(&word)),
            });
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    expression: &'a str,
}

impl<'a> Parser<'a> {
    fn parse(expression: &'a str) -> Result<Query> {
        let tokens = lex(expression)?;
        if tokens.is_empty() {
            return Err(malformed(expression, "empty expression"));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            expression,
        };
        let query = parser.or_expr()?;
        if parser.pos < parser.tokens.len() {
            return Err(malformed(expression, "unexpected trailing tokens"));
        }
        Ok(query)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn or_expr(&mut self) -> Result<Query> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and_expr()?;
            left = combine(left, right, Query::Or);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Query> {
        let mut left = self.not_expr()?;
        loop {
            let explicit = match self.peek() {
                Some(Token::And) => {
                    self.pos += 1;
                    true
                }
                Some(Token::Literal(_)) => false,
                _ => break,
            };
            let right = self.not_expr()?;
            // FTS5 only folds empty phrases out of implicit AND
            left = if explicit {
                Query::And(Box::new(left), Box::new(right))
            } else {
                combine(left, right, Query::And)
            };
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Query> {
        let mut left = self.primary()?;
        while self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let right = self.primary()?;
            left = if right.is_empty_phrase() {
                left
            } else {
                Query::Not(Box::new(left), Box::new(right))
            };
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Query> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Literal(words)) => {
                self.pos += 1;
                Ok(Query::Phrase(words))
            }
            Some(other) => Err(malformed(
                self.expression,
                format!("syntax error near {:?}", other),
            )),
            None => Err(malformed(self.expression, "unexpected end of expression")),
        }
    }
}

/// Join two operands, letting an empty phrase yield to the other side.
///
/// A literal with no tokens (`"-"`, `";"`) matches nothing on its own and is
/// dropped from implicit AND and from OR, the way FTS5 treats it.
fn combine(left: Query, right: Query, op: fn(Box<Query>, Box<Query>) -> Query) -> Query {
    if left.is_empty_phrase() {
        right
    } else if right.is_empty_phrase() {
        left
    } else {
        op(Box::new(left), Box::new(right))
    }
}

fn phrase_count(column: &[String], phrase: &[String]) -> usize {
    if phrase.is_empty() || phrase.len() > column.len() {
        return 0;
    }
    column.windows(phrase.len()).filter(|w| *w == phrase).count()
}

/// Weighted match strength, or `None` when the document does not match
fn evaluate(query: &Query, columns: &[Vec<String>; 3], weights: [f64; 3]) -> Option<f64> {
    match query {
        Query::Phrase(words) => {
            let score: f64 = columns
                .iter()
                .zip(weights)
                .map(|(col, w)| phrase_count(col, words) as f64 * w)
                .sum();
            let hits: usize = columns.iter().map(|col| phrase_count(col, words)).sum();
            (hits > 0).then_some(score)
        }
        Query::And(a, b) => Some(evaluate(a, columns, weights)? + evaluate(b, columns, weights)?),
        Query::Or(a, b) => match (evaluate(a, columns, weights), evaluate(b, columns, weights)) {
            (None, None) => None,
            (x, y) => Some(x.unwrap_or(0.0) + y.unwrap_or(0.0)),
        },
        Query::Not(a, b) => match evaluate(b, columns, weights) {
            Some(_) => None,
            None => evaluate(a, columns, weights),
        },
    }
}

/// Non-persistent store with the same search semantics as the SQLite engine
#[derive(Default)]
pub struct MemoryStore {
    notes: RwLock<Vec<Note>>,
    sessions: RwLock<Vec<Session>>,
}

fn poisoned() -> KraangError {
    KraangError::Other(anyhow::anyhow!("memory store lock poisoned"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_notes(&self) -> Result<RwLockReadGuard<'_, Vec<Note>>> {
        self.notes.read().map_err(|_| poisoned())
    }

    fn write_notes(&self) -> Result<RwLockWriteGuard<'_, Vec<Note>>> {
        self.notes.write().map_err(|_| poisoned())
    }

    fn read_sessions(&self) -> Result<RwLockReadGuard<'_, Vec<Session>>> {
        self.sessions.read().map_err(|_| poisoned())
    }

    /// Create or update a note by normalized title. Returns `(note, created)`.
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
        let now = Utc::now();

        // Holding the write guard covers both the lookup and the write
        let mut notes = self.write_notes()?;
        if let Some(existing) = notes.iter_mut().find(|n| n.title_normalized == norm) {
            existing.title = title.to_string();
            existing.content = content.to_string();
            existing.tags = clean_tags(tags);
            existing.category = category.trim().to_string();
            existing.relevance = 1.0;
            existing.updated_at = now;
            return Ok((existing.clone(), false));
        }

        let note = Note {
            note_id: new_note_id(),
            title: title.to_string(),
            title_normalized: norm,
            content: content.to_string(),
            tags: clean_tags(tags),
            category: category.trim().to_string(),
            relevance: 1.0,
            created_at: now,
            updated_at: now,
        };
        notes.push(note.clone());
        Ok((note, true))
    }

    /// Insert a fully formed note, replacing any with the same id or title
    pub fn insert_note(&self, note: Note) -> Result<()> {
        let mut notes = self.write_notes()?;
        notes.retain(|n| n.note_id != note.note_id && n.title_normalized != note.title_normalized);
        notes.push(note);
        Ok(())
    }

    /// Set a note's relevance, clamped to [0, 1]. `None` if no such note.
    pub fn set_relevance(&self, title: &str, relevance: f64) -> Result<Option<Note>> {
        let norm = normalize_title(title);
        let relevance = if relevance.is_nan() {
            0.0
        } else {
            relevance.clamp(0.0, 1.0)
        };
        let mut notes = self.write_notes()?;
        Ok(notes
            .iter_mut()
            .find(|n| n.title_normalized == norm)
            .map(|note| {
                note.relevance = relevance;
                note.updated_at = Utc::now();
                note.clone()
            }))
    }

    /// Insert or replace a session by id
    pub fn upsert_session(&self, session: Session) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        sessions.retain(|s| s.session_id != session.session_id);
        sessions.push(session);
        Ok(())
    }

    fn matching<T: Indexed>(
        items: &[T],
        expression: &MatchExpression,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit<T>>> {
        if expression.is_empty() {
            return Ok(Vec::new());
        }
        let query = Parser::parse(expression.as_str())?;
        let weights = T::WEIGHTS.as_array();

        let mut hits: Vec<SearchHit<T>> = items
            .iter()
            .filter(|item| item.relevance() > 0.0 && filters.matches(*item))
            .filter_map(|item| {
                let [a, b, c] = item.columns();
                let columns = [tokenize(&a), tokenize(&b), tokenize(&c)];
                evaluate(&query, &columns, weights).map(|strength| SearchHit {
                    item: item.clone(),
                    raw_score: -strength,
                    snippet: None,
                })
            })
            .collect();

        // best first: most negative weighted score
        hits.sort_by(|a, b| {
            let sa = a.raw_score * a.item.relevance();
            let sb = b.raw_score * b.item.relevance();
            sa.partial_cmp(&sb).unwrap_or(Ordering::Equal)
        });
        Ok(hits)
    }
}

impl SearchCapability<Note> for MemoryStore {
    fn match_search(
        &self,
        expression: &MatchExpression,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchHit<Note>>> {
        let notes = self.read_notes()?;
        let hits = Self::matching(&notes, expression, filters)?;
        Ok(hits.into_iter().skip(offset).take(limit).collect())
    }

    fn count_search(&self, expression: &MatchExpression, filters: &SearchFilters) -> Result<usize> {
        let notes = self.read_notes()?;
        Ok(Self::matching(&notes, expression, filters)?.len())
    }

    fn lookup(&self, id: &str) -> Result<Option<Note>> {
        Ok(self.read_notes()?.iter().find(|n| n.note_id == id).cloned())
    }

    fn lookup_by_key(&self, key: &str) -> Result<Option<Note>> {
        let norm = normalize_title(key);
        Ok(self
            .read_notes()?
            .iter()
            .find(|n| n.title_normalized == norm)
            .cloned())
    }

    fn list_all(&self) -> Result<Vec<Note>> {
        Ok(self.read_notes()?.clone())
    }
}

impl SearchCapability<Session> for MemoryStore {
    fn match_search(
        &self,
        expression: &MatchExpression,
        filters: &SearchFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchHit<Session>>> {
        let sessions = self.read_sessions()?;
        let hits = Self::matching(&sessions, expression, filters)?;
        Ok(hits.into_iter().skip(offset).take(limit).collect())
    }

    fn count_search(&self, expression: &MatchExpression, filters: &SearchFilters) -> Result<usize> {
        let sessions = self.read_sessions()?;
        Ok(Self::matching(&sessions, expression, filters)?.len())
    }

    fn lookup(&self, id: &str) -> Result<Option<Session>> {
        Ok(self
            .read_sessions()?
            .iter()
            .find(|s| s.session_id == id)
            .cloned())
    }

    fn lookup_by_key(&self, key: &str) -> Result<Option<Session>> {
        if key.is_empty() {
            return Ok(None);
        }
        Ok(self.read_sessions()?.iter().find(|s| s.slug == key).cloned())
    }

    fn list_all(&self) -> Result<Vec<Session>> {
        Ok(self.read_sessions()?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::compile;

    fn parse(expr: &str) -> Result<Query> {
        Parser::parse(expr)
    }

    fn phrase(words: &[&str]) -> Box<Query> {
        Box::new(Query::Phrase(words.iter().map(|w| w.to_string()).collect()))
    }

    #[test]
    fn test_parser_precedence() {
        // a OR b c NOT d  ==  a OR (b AND (c NOT d))
        let q = parse("\"a\" OR \"b\" \"c\" NOT \"d\"").unwrap();
        assert_eq!(
            q,
            Query::Or(
                phrase(&["a"]),
                Box::new(Query::And(
                    phrase(&["b"]),
                    Box::new(Query::Not(phrase(&["c"]), phrase(&["d"])))
                ))
            )
        );
    }

    #[test]
    fn test_parser_rejects_malformed() {
        for bad in ["AND", "\"a\" OR", "NOT \"a\"", "\"open", "a*", "(a)"] {
            assert!(
                matches!(parse(bad), Err(KraangError::MalformedQuery { .. })),
                "expected error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_parser_drops_empty_phrases() {
        assert_eq!(
            parse("\"a\" \"-\" \"b\"").unwrap(),
            Query::And(phrase(&["a"]), phrase(&["b"]))
        );
        assert_eq!(parse("\"a\" OR \";\"").unwrap(), *phrase(&["a"]));
        assert_eq!(parse("\"a\" NOT \"/\"").unwrap(), *phrase(&["a"]));
        assert_eq!(
            parse("\"a\" AND \"-\"").unwrap(),
            Query::And(phrase(&["a"]), phrase(&[]))
        );
    }

    #[test]
    fn test_punctuation_literals_do_not_block_matches() {
        let store = MemoryStore::new();
        store
            .upsert_note("Node express", "routing with express", vec![], "")
            .unwrap();

        for raw in ["node - express", "express ;)", "node / express, routing"] {
            let hits: Vec<SearchHit<Note>> = store
                .match_search(&compile(raw), &SearchFilters::new(), 10, 0)
                .unwrap();
            assert_eq!(hits.len(), 1, "no match for {:?}", raw);
        }
    }

    #[test]
    fn test_phrase_matching() {
        let store = MemoryStore::new();
        store
            .upsert_note("Guide", "machine learning with python", vec![], "")
            .unwrap();
        store.upsert_note("Other", "learning machine", vec![], "").unwrap();

        let hits: Vec<SearchHit<Note>> = store
            .match_search(&compile("\"machine learning\""), &SearchFilters::new(), 10, 0)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.title, "Guide");
        assert!(hits[0].raw_score < 0.0);
    }

    #[test]
    fn test_title_weight_ranks_first() {
        let store = MemoryStore::new();
        store.upsert_note("Notes", "rust appears in body", vec![], "").unwrap();
        store.upsert_note("Rust", "something else", vec![], "").unwrap();

        let hits: Vec<SearchHit<Note>> = store
            .match_search(&compile("rust"), &SearchFilters::new(), 10, 0)
            .unwrap();
        assert_eq!(hits[0].item.title, "Rust");
    }

    #[test]
    fn test_forgotten_notes_not_matched() {
        let store = MemoryStore::new();
        store.upsert_note("Secret", "hidden words", vec![], "").unwrap();
        store.set_relevance("secret", 0.0).unwrap();
        let count = SearchCapability::<Note>::count_search(
            &store,
            &compile("hidden"),
            &SearchFilters::new(),
        )
        .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_offset_and_limit() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .upsert_note(&format!("Note {i}"), "shared", vec![], "")
                .unwrap();
        }
        let page: Vec<SearchHit<Note>> = store
            .match_search(&compile("shared"), &SearchFilters::new(), 2, 4)
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn test_upsert_restores_relevance() {
        let store = MemoryStore::new();
        let (first, created) = store.upsert_note("Test", "x", vec![], "").unwrap();
        assert!(created);
        store.set_relevance("test", 0.0).unwrap();
        let (second, created) = store.upsert_note("TEST", "y", vec![], "").unwrap();
        assert!(!created);
        assert_eq!(second.note_id, first.note_id);
        assert_eq!(second.relevance, 1.0);
    }
}

//! Query sanitizer and compiler
//!
//! Free-form user text is turned into an FTS5 MATCH expression in two steps:
//! [`sanitize`] removes characters the MATCH grammar would choke on while
//! keeping quoted phrases intact, and [`compile`] quotes every bare word so the
//! engine matches it as a literal token. `tag:` prefixes are pulled out first
//! and returned separately by [`parse_query`].

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Characters stripped from text outside quoted phrases
pub const UNSAFE_CHARS: &[char] = &['^', '*', '(', ')', '{', '}', '[', ']', ':'];

/// Boolean operators passed through to the engine unquoted
pub const BOOLEAN_OPERATORS: &[&str] = &["AND", "OR", "NOT"];

fn tag_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\btag:(\S+)").ok())
        .as_ref()
}

/// A compiled MATCH expression; always well-formed or empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MatchExpression(String);

impl MatchExpression {
    /// Expression that matches nothing and must not reach the engine
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// OR-join of individually quoted terms, for broad recall
    pub fn any_of<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let quoted: Vec<String> = terms
            .into_iter()
            .filter(|t| !t.as_ref().trim().is_empty())
            .map(|t| quote_literal(t.as_ref()))
            .collect();
        Self(quoted.join(" OR "))
    }

    /// Literal terms of the expression with quotes removed, operators skipped
    pub fn terms(&self) -> Vec<String> {
        let mut terms = Vec::new();
        let mut chars = self.0.chars().peekable();

        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
            } else if c == '"' {
                chars.next();
                let mut literal = String::new();
                while let Some(ch) = chars.next() {
                    if ch == '"' {
                        // doubled quote is an escaped quote inside the literal
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            literal.push('"');
                        } else {
                            break;
                        }
                    } else {
                        literal.push(ch);
                    }
                }
                if !literal.trim().is_empty() {
                    terms.push(literal);
                }
            } else {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == '"' {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                if !is_boolean_operator(&word) {
                    terms.push(word);
                }
            }
        }

        terms
    }
}

impl fmt::Display for MatchExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MatchExpression {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compiled query plus the `tag:` filters found in the raw text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    pub expression: MatchExpression,
    pub tags: Vec<String>,
}

/// Piece of a query string: a complete `"..."` phrase or the text between phrases
#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Phrase(&'a str),
    Text(&'a str),
}

/// Split text into quoted phrases and the gaps between them, in order
fn split_phrases(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find('"') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('"') else {
            break;
        };
        if open > 0 {
            segments.push(Segment::Text(&rest[..open]));
        }
        let end = open + 1 + close + 1;
        segments.push(Segment::Phrase(&rest[open..end]));
        rest = &rest[end..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}

fn is_boolean_operator(word: &str) -> bool {
    let upper = word.to_uppercase();
    BOOLEAN_OPERATORS.iter().any(|op| *op == upper)
}

fn quote_literal(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip MATCH-grammar special characters, keeping quoted phrases verbatim.
///
/// Returns an empty string when nothing meaningful remains. Control
/// characters other than whitespace become spaces everywhere, phrases
/// included. An odd number of double
/// quotes means the phrase structure is unrecoverable, so every quote is
/// dropped before anything else happens.
pub fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_control() && !c.is_whitespace() { ' ' } else { c })
        .collect();
    let raw = cleaned.as_str();
    if raw.trim().is_empty() {
        return String::new();
    }

    let unquoted;
    let text = if raw.matches('"').count() % 2 != 0 {
        unquoted = raw.replace('"', "");
        if unquoted.trim().is_empty() {
            return String::new();
        }
        unquoted.as_str()
    } else {
        raw
    };

    let mut out = String::with_capacity(text.len());
    for segment in split_phrases(text) {
        match segment {
            Segment::Phrase(phrase) => {
                let inner = &phrase[1..phrase.len() - 1];
                if inner.trim().is_empty() {
                    out.push(' ');
                } else {
                    out.push_str(phrase);
                }
            }
            Segment::Text(gap) => {
                out.extend(
                    gap.chars()
                        .map(|c| if UNSAFE_CHARS.contains(&c) { ' ' } else { c }),
                );
            }
        }
    }

    collapse_whitespace(&out)
}

/// Remove `tag:<token>` filters from a raw query, returning the rest and the tags
fn extract_tags(raw: &str) -> (String, Vec<String>) {
    let Some(pattern) = tag_pattern() else {
        return (raw.to_string(), Vec::new());
    };

    let tags = pattern
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect();
    let stripped = pattern.replace_all(raw, "").into_owned();
    (stripped, tags)
}

/// Compile raw user text into a MATCH expression and its tag filters
pub fn parse_query(raw: &str) -> ParsedQuery {
    let (stripped, tags) = extract_tags(raw);

    let sanitized = sanitize(&stripped);
    if sanitized.is_empty() {
        return ParsedQuery {
            expression: MatchExpression::empty(),
            tags,
        };
    }

    let mut parts: Vec<String> = Vec::new();
    for segment in split_phrases(&sanitized) {
        match segment {
            Segment::Phrase(phrase) => parts.push(phrase.to_string()),
            Segment::Text(gap) => {
                for word in gap.split_whitespace() {
                    if is_boolean_operator(word) {
                        parts.push(word.to_string());
                    } else {
                        parts.push(quote_literal(word));
                    }
                }
            }
        }
    }

    let expression = MatchExpression(parts.join(" "));
    tracing::debug!("Compiled query {:?} -> {:?}", raw, expression.as_str());

    ParsedQuery { expression, tags }
}

/// Compile raw user text into a MATCH expression, dropping `tag:` filters
pub fn compile(raw: &str) -> MatchExpression {
    parse_query(raw).expression
}

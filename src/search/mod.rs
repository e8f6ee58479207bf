//! Query processing and ranking
//!
//! Raw text flows through [`query`] (sanitize, compile), is executed by a
//! storage engine via [`Searcher`], and comes back scored ([`scoring`]),
//! snippeted ([`snippet`]) and optionally deduplicated ([`dedup`]).
//! [`analysis`] derives related, stale and digest views from the same parts.

pub mod analysis;
pub mod dedup;
pub mod query;
pub mod scoring;
pub mod searcher;
pub mod snippet;

pub use analysis::{build_digest, find_related, find_stale, related_terms, suggest_related};
pub use dedup::deduplicate;
pub use query::{compile, parse_query, sanitize, MatchExpression, ParsedQuery};
pub use searcher::{Recall, RecallScope, Searcher};
pub use snippet::generate_snippet;

//! kraang - a project-scoped second brain for humans and their coding agents
//!
//! Notes and indexed agent session transcripts live in a local SQLite
//! database with FTS5 full-text search. The crate provides the query
//! compiler, scoring, snippets, deduplication and analyzers, the transcript
//! indexer, markdown formatting, the CLI and an MCP server over stdio.

pub mod cli;
pub mod config;
pub mod error;
pub mod formatter;
pub mod indexer;
pub mod models;
pub mod search;
pub mod server;
pub mod storage;

pub use error::{KraangError, Result};

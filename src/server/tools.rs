//! The five MCP tools and their input schemas.
//!
//! Tools never fail at the protocol level: bad arguments and store errors
//! come back as text with `is_error` set.

use crate::config::{encode_project_path, Config};
use crate::error::KraangError;
use crate::formatter;
use crate::indexer::read_transcript;
use crate::search::{RecallScope, Searcher};
use crate::storage::SqliteStore;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// Text produced by a tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RememberArgs {
    title: String,
    content: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecallArgs {
    query: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ReadSessionArgs {
    session_id: String,
    #[serde(default)]
    max_turns: usize,
}

#[derive(Debug, Deserialize)]
struct ForgetArgs {
    title: String,
    #[serde(default)]
    relevance: f64,
}

/// `tools/list` payload
pub fn definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "remember",
            "description": "Save knowledge. Updates the note with the same title if one exists, \
                            otherwise creates it. Remembering a forgotten note restores it.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Note title; reuse it exactly to update" },
                    "content": { "type": "string", "description": "Full note content" },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "category": { "type": "string" }
                },
                "required": ["title", "content"]
            }
        }),
        json!({
            "name": "recall",
            "description": "Search notes and indexed sessions. Supports \"quoted phrases\", \
                            AND/OR/NOT and tag:name filters.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "scope": { "type": "string", "enum": ["all", "notes", "sessions"], "default": "all" },
                    "limit": { "type": "integer", "minimum": 1, "default": 10 }
                },
                "required": ["query"]
            }
        }),
        json!({
            "name": "read_session",
            "description": "Load a session transcript by full id or 8 character prefix.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "max_turns": { "type": "integer", "minimum": 0, "default": 0,
                                   "description": "0 shows every turn" }
                },
                "required": ["session_id"]
            }
        }),
        json!({
            "name": "forget",
            "description": "Downweight a note. 0.0 hides it from search, 1.0 is full weight.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "relevance": { "type": "number", "minimum": 0.0, "maximum": 1.0, "default": 0.0 }
                },
                "required": ["title"]
            }
        }),
        json!({
            "name": "status",
            "description": "Knowledge base overview: counts, recent notes, tags, stale notes.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
    ]
}

/// Run the tool `name` with JSON `arguments`
pub fn dispatch(
    store: &SqliteStore,
    config: &Config,
    name: &str,
    arguments: &Value,
) -> ToolOutput {
    tracing::debug!("Tool call: {}", name);
    match name {
        "remember" => with_args(name, arguments, |args| remember(store, config, args)),
        "recall" => with_args(name, arguments, |args| recall(store, config, args)),
        "read_session" => with_args(name, arguments, |args| read_session(store, config, args)),
        "forget" => with_args(name, arguments, |args| forget(store, args)),
        "status" => status(store, config),
        other => {
            tracing::warn!("Unknown tool: {}", other);
            ToolOutput::error(format!("Error: unknown tool \"{}\".", other))
        }
    }
}

fn with_args<A, F>(name: &str, arguments: &Value, run: F) -> ToolOutput
where
    A: DeserializeOwned,
    F: FnOnce(A) -> ToolOutput,
{
    match serde_json::from_value::<A>(arguments.clone()) {
        Ok(args) => run(args),
        Err(e) => ToolOutput::error(format!("Error: invalid arguments for {}: {}.", name, e)),
    }
}

fn remember(store: &SqliteStore, config: &Config, args: RememberArgs) -> ToolOutput {
    let title = args.title.trim();
    let content = args.content.trim();
    if title.is_empty() {
        return ToolOutput::error("Error: title must not be empty.");
    }
    if content.is_empty() {
        return ToolOutput::error("Error: content must not be empty.");
    }

    let category = args.category.unwrap_or_default();
    match store.upsert_note(title, content, args.tags.unwrap_or_default(), &category) {
        Ok((note, true)) => {
            let similar: Vec<_> = store
                .find_similar_titles(title, config.search.similar_titles_limit + 1)
                .into_iter()
                .filter(|other| other.note_id != note.note_id)
                .take(config.search.similar_titles_limit)
                .collect();
            ToolOutput::text(formatter::format_remember_created(&note, &similar))
        }
        Ok((note, false)) => ToolOutput::text(formatter::format_remember_updated(&note)),
        Err(e) => {
            tracing::error!("remember failed: {}", e);
            ToolOutput::error(format!("Error: could not save \"{}\".", title))
        }
    }
}

fn recall(store: &SqliteStore, config: &Config, args: RecallArgs) -> ToolOutput {
    let scope = match args.scope.as_deref().unwrap_or("all").parse::<RecallScope>() {
        Ok(scope) => scope,
        Err(e) => return ToolOutput::error(format!("Error: {}.", e)),
    };
    let limit = config.search.clamp_limit(args.limit);

    let recall = Searcher::new(store)
        .with_snippet_length(config.search.snippet_length)
        .recall(&args.query, scope, limit);
    ToolOutput::text(formatter::format_recall_results(
        &args.query,
        &recall.notes,
        &recall.sessions,
    ))
}

fn read_session(store: &SqliteStore, config: &Config, args: ReadSessionArgs) -> ToolOutput {
    let session = match store.get_session(&args.session_id) {
        Ok(Some(session)) => session,
        Ok(None) => return ToolOutput::error(format!("Session \"{}\" not found.", args.session_id)),
        Err(e @ KraangError::AmbiguousPrefix { .. }) => return ToolOutput::error(e.to_string()),
        Err(e) => {
            tracing::error!("read_session failed: {}", e);
            return ToolOutput::error(format!(
                "Error: could not read session \"{}\".",
                args.session_id
            ));
        }
    };

    let sessions_dir = match config.sessions_dir() {
        Ok(dir) => dir,
        Err(e) => return ToolOutput::error(format!("Error: {}.", e)),
    };
    let path = sessions_dir
        .join(encode_project_path(&session.project_path))
        .join(format!("{}.jsonl", session.session_id));
    if !path.exists() {
        return ToolOutput::error(format!(
            "Session transcript file not found for \"{}\".",
            args.session_id
        ));
    }

    match read_transcript(&path) {
        Ok(turns) => ToolOutput::text(formatter::format_transcript(
            &session,
            &turns,
            args.max_turns,
            config.sessions.transcript_max_chars,
        )),
        Err(e) => {
            tracing::error!("read_session failed for {:?}: {}", path, e);
            ToolOutput::error(format!(
                "Error: could not read session \"{}\".",
                args.session_id
            ))
        }
    }
}

fn forget(store: &SqliteStore, args: ForgetArgs) -> ToolOutput {
    if !(0.0..=1.0).contains(&args.relevance) {
        return ToolOutput::error(format!(
            "Error: relevance must be between 0.0 and 1.0, got {}.",
            args.relevance
        ));
    }

    match store.set_relevance(&args.title, args.relevance) {
        Ok(Some(note)) => ToolOutput::text(formatter::format_forget(&note.title, args.relevance)),
        Ok(None) => ToolOutput::error(format!("Note \"{}\" not found.", args.title)),
        Err(e) => {
            tracing::error!("forget failed: {}", e);
            ToolOutput::error(format!("Error: could not forget \"{}\".", args.title))
        }
    }
}

fn status(store: &SqliteStore, config: &Config) -> ToolOutput {
    match store.status_report(&config.analysis) {
        Ok(report) => ToolOutput::text(formatter::format_status(&report, Utc::now())),
        Err(e) => {
            tracing::error!("status failed: {}", e);
            ToolOutput::error("Error: could not generate status.")
        }
    }
}

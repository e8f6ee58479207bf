//! Session indexer: agent transcripts (JSONL) into the sessions table
//!
//! Indexing is incremental. A transcript is re-parsed only when its size or
//! modification time differs from what was recorded at the last run.

pub mod transcript;

use crate::error::{KraangError, Result};
use crate::models::{truncate_chars, Session};
use crate::storage::SqliteStore;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use transcript::{extract_text, for_each_entry, parse_subagent_text, tool_calls};

pub use transcript::{read_transcript, summarize_tool_call};

/// Default cap on the stored summary (first user message)
pub const DEFAULT_SUMMARY_MAX_CHARS: usize = 500;

/// What to index and where to find it
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Project the sessions belong to
    pub project_root: PathBuf,
    /// Directory holding the project's `<session-id>.jsonl` files
    pub sessions_dir: PathBuf,
    /// Index just this transcript (hook mode)
    pub single_file: Option<PathBuf>,
    pub summary_max_chars: usize,
}

impl IndexOptions {
    pub fn new(project_root: impl Into<PathBuf>, sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            sessions_dir: sessions_dir.into(),
            single_file: None,
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
        }
    }

    pub fn with_single_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.single_file = Some(path.into());
        self
    }

    pub fn with_summary_max_chars(mut self, max_chars: usize) -> Self {
        self.summary_max_chars = max_chars;
        self
    }
}

/// Size and modification time (seconds since the epoch) of a file
fn file_stamp(path: &Path) -> Result<(f64, u64)> {
    let meta = std::fs::metadata(path).map_err(|e| KraangError::Io {
        source: e,
        context: format!("Failed to stat transcript: {:?}", path),
    })?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok((mtime, meta.len()))
}

fn dedupe_in_order(items: Vec<String>) -> Vec<String> {
    let mut seen = ahash::AHashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Parse a transcript into a session with the default summary length
pub fn parse_jsonl(path: &Path, project_path: &str) -> Result<Option<Session>> {
    parse_jsonl_with(path, project_path, DEFAULT_SUMMARY_MAX_CHARS)
}

/// Parse a transcript into a session.
///
/// Returns `None` for a missing or empty file, or one with no conversation.
/// The session id is the file stem.
pub fn parse_jsonl_with(
    path: &Path,
    project_path: &str,
    summary_max_chars: usize,
) -> Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }
    let (source_mtime, source_size) = file_stamp(path)?;
    if source_size == 0 {
        return Ok(None);
    }

    let session_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut slug = String::new();
    let mut git_branch = String::new();
    let mut model = String::new();
    let mut cwd = project_path.to_string();
    let mut timestamps: Vec<DateTime<Utc>> = Vec::new();
    let mut user_texts: Vec<String> = Vec::new();
    let mut assistant_texts: Vec<String> = Vec::new();
    let mut tools: Vec<String> = Vec::new();
    let mut files: Vec<String> = Vec::new();
    let mut summary = String::new();

    for_each_entry(path, |entry| {
        if slug.is_empty() {
            if let Some(s) = entry.slug.as_deref().filter(|s| !s.is_empty()) {
                slug = s.to_string();
            }
        }
        if git_branch.is_empty() {
            if let Some(b) = entry.git_branch.as_deref().filter(|b| !b.is_empty()) {
                git_branch = b.to_string();
            }
        }
        if cwd.is_empty() {
            if let Some(c) = entry.cwd.as_deref().filter(|c| !c.is_empty()) {
                cwd = c.to_string();
            }
        }
        if let Some(ts) = entry.timestamp.as_deref() {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
                timestamps.push(parsed.with_timezone(&Utc));
            }
        }

        if !entry.has_message() {
            return;
        }

        if entry.is_user_turn() {
            if let Some(text) = entry.user_text() {
                if summary.is_empty() {
                    summary = truncate_chars(&text, summary_max_chars).to_string();
                }
                user_texts.push(text);
            }
        } else if entry.is_assistant_turn() {
            let content = entry.content();
            let text = extract_text(content);
            if !text.is_empty() {
                assistant_texts.push(text);
            }
            let (names, edited) = tool_calls(content);
            tools.extend(names);
            files.extend(edited);
            if model.is_empty() {
                if let Some(m) = entry.model_name() {
                    model = m.to_string();
                }
            }
        }
    })?;

    if user_texts.is_empty() && assistant_texts.is_empty() {
        return Ok(None);
    }

    let now = Utc::now();
    let started_at = timestamps.iter().min().copied().unwrap_or(now);
    let ended_at = timestamps.iter().max().copied().unwrap_or(now);

    Ok(Some(Session {
        session_id,
        slug,
        project_path: if cwd.is_empty() {
            project_path.to_string()
        } else {
            cwd
        },
        git_branch,
        model,
        started_at,
        ended_at,
        duration_s: (ended_at - started_at).num_seconds(),
        user_turn_count: user_texts.len() as u32,
        assistant_turn_count: assistant_texts.len() as u32,
        summary,
        user_text: user_texts.join("\n"),
        assistant_text: assistant_texts.join("\n"),
        tools_used: dedupe_in_order(tools),
        files_edited: dedupe_in_order(files),
        source_mtime,
        source_size,
        indexed_at: now,
    }))
}

/// Transcript files (`*.jsonl`) directly inside `sessions_dir`, sorted by name
pub fn find_session_files(sessions_dir: &Path) -> Result<Vec<PathBuf>> {
    jsonl_files(sessions_dir, |_| true)
}

fn jsonl_files<F>(dir: &Path, accept: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| KraangError::Io {
        source: e,
        context: format!("Failed to read directory: {:?}", dir),
    })?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "jsonl"))
        .filter(|path| {
            path.file_name()
                .map(|name| accept(&name.to_string_lossy()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Append subagent transcripts found under `<dir>/<session-id>/subagents/`
fn merge_subagents(transcript: &Path, session: &mut Session) -> Result<()> {
    let Some(parent) = transcript.parent() else {
        return Ok(());
    };
    let subagents_dir = parent.join(&session.session_id).join("subagents");

    for file in jsonl_files(&subagents_dir, |name| name.starts_with("agent-"))? {
        let (user, assistant) = parse_subagent_text(&file)?;
        if !user.is_empty() {
            session.user_text.push('\n');
            session.user_text.push_str(&user);
        }
        if !assistant.is_empty() {
            session.assistant_text.push('\n');
            session.assistant_text.push_str(&assistant);
        }
    }
    Ok(())
}

/// Index new or changed transcripts. Returns how many sessions were written.
pub fn index_sessions(store: &SqliteStore, options: &IndexOptions) -> Result<usize> {
    let files = match &options.single_file {
        Some(file) => vec![file.clone()],
        None => find_session_files(&options.sessions_dir)?,
    };
    let project_path = options.project_root.to_string_lossy().to_string();

    let mut indexed = 0;
    for path in &files {
        let session_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let (mtime, size) = file_stamp(path)?;

        if !store.needs_reindex(&session_id, mtime, size)? {
            continue;
        }

        let Some(mut session) = parse_jsonl_with(path, &project_path, options.summary_max_chars)?
        else {
            tracing::debug!("Skipping empty transcript {:?}", path);
            continue;
        };

        merge_subagents(path, &mut session)?;
        store.upsert_session(&session)?;
        indexed += 1;

        tracing::debug!(
            "Indexed session {} ({})",
            session.short_id(),
            if session.slug.is_empty() {
                "no slug"
            } else {
                session.slug.as_str()
            }
        );
    }

    tracing::info!("Indexed {} of {} session file(s)", indexed, files.len());
    Ok(indexed)
}

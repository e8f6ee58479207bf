//! JSONL transcript entries and their cleanup
//!
//! A transcript is one JSON object per line. Only `user` and `assistant`
//! entries carry conversation; bookkeeping entries, tool results, meta
//! messages and injected system text are dropped.

use crate::error::{KraangError, Result};
use crate::models::{TranscriptTurn, TurnRole};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

/// Entry types that never carry conversation
pub const SKIP_TYPES: &[&str] = &["file-history-snapshot", "progress", "queue-operation"];

/// Tools whose input names a file being modified
pub const FILE_EDIT_TOOLS: &[&str] = &["Edit", "Write", "NotebookEdit"];

const BASH_SUMMARY_MAX: usize = 80;

fn noise_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"<system-reminder>|<local-command-|<task-notification>|<command-name>|<user-prompt-submit-hook>",
            )
            .ok()
        })
        .as_ref()
}

/// One line of a transcript, reduced to the fields the indexer reads
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Entry {
    #[serde(rename = "type", default)]
    pub entry_type: String,
    pub slug: Option<String>,
    pub git_branch: Option<String>,
    pub cwd: Option<String>,
    pub timestamp: Option<String>,
    pub is_meta: Option<bool>,
    pub model: Option<String>,
    pub message: Option<Value>,
}

impl Entry {
    fn message(&self) -> Option<&Map<String, Value>> {
        self.message.as_ref().and_then(Value::as_object)
    }

    pub fn role(&self) -> &str {
        self.message()
            .and_then(|m| m.get("role"))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn content(&self) -> &Value {
        self.message()
            .and_then(|m| m.get("content"))
            .unwrap_or(&Value::Null)
    }

    pub fn has_message(&self) -> bool {
        self.message().is_some()
    }

    pub fn is_meta(&self) -> bool {
        self.is_meta.unwrap_or(false)
    }

    /// Model name, from the entry or its message
    pub fn model_name(&self) -> Option<&str> {
        self.model
            .as_deref()
            .or_else(|| {
                self.message()
                    .and_then(|m| m.get("model"))
                    .and_then(Value::as_str)
            })
            .filter(|m| !m.is_empty())
    }

    pub fn is_user_turn(&self) -> bool {
        self.entry_type == "user" && self.role() == "user"
    }

    pub fn is_assistant_turn(&self) -> bool {
        self.entry_type == "assistant" && self.role() == "assistant"
    }

    /// User text worth keeping, or `None` for tool results, meta and noise
    pub fn user_text(&self) -> Option<String> {
        let content = self.content();
        if is_tool_result(content) || self.is_meta() {
            return None;
        }
        let text = extract_text(content);
        (!text.is_empty() && !is_noise(&text)).then_some(text)
    }
}

/// Visit every parseable, non-bookkeeping entry of a transcript file.
///
/// Invalid UTF-8 is replaced; lines that are not JSON objects are skipped.
pub(crate) fn for_each_entry<F>(path: &Path, mut visit: F) -> Result<()>
where
    F: FnMut(Entry),
{
    let file = File::open(path).map_err(|e| KraangError::Io {
        source: e,
        context: format!("Failed to open transcript: {:?}", path),
    })?;
    let reader = BufReader::new(file);

    for line in reader.split(b'\n') {
        let line = line.map_err(|e| KraangError::Io {
            source: e,
            context: format!("Failed to read transcript: {:?}", path),
        })?;
        let line = String::from_utf8_lossy(&line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let entry: Entry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if SKIP_TYPES.contains(&entry.entry_type.as_str()) {
            continue;
        }
        visit(entry);
    }

    Ok(())
}

/// Plain text of a message content field: a string, or its text blocks joined
pub fn extract_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .map(|b| b.get("text").and_then(Value::as_str).unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

pub fn is_noise(text: &str) -> bool {
    noise_pattern().is_some_and(|re| re.is_match(text))
}

pub fn is_tool_result(content: &Value) -> bool {
    content.as_array().is_some_and(|blocks| {
        blocks
            .iter()
            .any(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"))
    })
}

/// `(name, input)` of every tool_use block
fn tool_uses(content: &Value) -> impl Iterator<Item = (&str, Option<&Map<String, Value>>)> {
    content
        .as_array()
        .into_iter()
        .flatten()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
        .map(|b| {
            let name = b.get("name").and_then(Value::as_str).unwrap_or("");
            (name, b.get("input").and_then(Value::as_object))
        })
}

/// Tool names used and file paths edited by an assistant message
pub fn tool_calls(content: &Value) -> (Vec<String>, Vec<String>) {
    let mut names = Vec::new();
    let mut files = Vec::new();

    for (name, input) in tool_uses(content) {
        if !name.is_empty() {
            names.push(name.to_string());
        }
        let Some(input) = input else { continue };
        if FILE_EDIT_TOOLS.contains(&name) {
            let path = ["file_path", "notebook_path"]
                .iter()
                .filter_map(|key| input.get(*key).and_then(Value::as_str))
                .find(|p| !p.is_empty());
            if let Some(path) = path {
                files.push(path.to_string());
            }
        }
    }

    (names, files)
}

fn input_field(input: &Map<String, Value>, key: &str) -> String {
    match input.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "?".to_string(),
        Some(other) => other.to_string(),
    }
}

/// One-line description of a tool call
pub fn summarize_tool_call(name: &str, input: &Map<String, Value>) -> String {
    match name {
        "Read" | "Write" | "Edit" => format!("{} {}", name, input_field(input, "file_path")),
        "Glob" | "Grep" => format!("{} {}", name, input_field(input, "pattern")),
        "Bash" => {
            let command = input_field(input, "command");
            if command.chars().count() > BASH_SUMMARY_MAX {
                let head: String = command.chars().take(BASH_SUMMARY_MAX - 3).collect();
                format!("Bash: {}...", head)
            } else {
                format!("Bash: {}", command)
            }
        }
        "Task" => format!("Task: {}", input_field(input, "description")),
        "NotebookEdit" => format!("NotebookEdit {}", input_field(input, "notebook_path")),
        other => format!("{}()", other),
    }
}

/// Clean conversation turns of a transcript; a missing file yields none
pub fn read_transcript(path: &Path) -> Result<Vec<TranscriptTurn>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut turns = Vec::new();
    for_each_entry(path, |entry| {
        let timestamp = entry.timestamp.clone().unwrap_or_default();
        if entry.is_user_turn() {
            if let Some(text) = entry.user_text() {
                turns.push(TranscriptTurn {
                    role: TurnRole::User,
                    timestamp,
                    text,
                    tool_calls: Vec::new(),
                });
            }
        } else if entry.is_assistant_turn() {
            let content = entry.content();
            let text = extract_text(content);
            let tool_calls: Vec<String> = tool_uses(content)
                .filter_map(|(name, input)| input.map(|i| summarize_tool_call(name, i)))
                .collect();
            if !text.is_empty() || !tool_calls.is_empty() {
                turns.push(TranscriptTurn {
                    role: TurnRole::Agent,
                    timestamp,
                    text,
                    tool_calls,
                });
            }
        }
    })?;

    Ok(turns)
}

/// User and assistant text of a subagent transcript
pub fn parse_subagent_text(path: &Path) -> Result<(String, String)> {
    if !path.exists() {
        return Ok((String::new(), String::new()));
    }

    let mut user = Vec::new();
    let mut assistant = Vec::new();
    for_each_entry(path, |entry| match entry.role() {
        "user" => user.extend(entry.user_text()),
        "assistant" => {
            let text = extract_text(entry.content());
            if !text.is_empty() {
                assistant.push(text);
            }
        }
        _ => {}
    })?;

    Ok((user.join("\n"), assistant.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_lines(dir: &TempDir, name: &str, lines: &[Value]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_extract_text() {
        assert_eq!(extract_text(&json!("plain")), "plain");
        let blocks = json!([
            {"type": "text", "text": "one"},
            {"type": "thinking", "thinking": "hidden"},
            {"type": "text", "text": "two"}
        ]);
        assert_eq!(extract_text(&blocks), "one\ntwo");
        assert_eq!(extract_text(&Value::Null), "");
    }

    #[test]
    fn test_noise_and_tool_results() {
        assert!(is_noise("<system-reminder>ignore</system-reminder>"));
        assert!(is_noise("x <command-name>/clear</command-name>"));
        assert!(!is_noise("how do I fix this?"));
        assert!(is_tool_result(&json!([{"type": "tool_result", "content": "ok"}])));
        assert!(!is_tool_result(&json!("text")));
    }

    #[test]
    fn test_tool_calls_collect_edited_files() {
        let content = json!([
            {"type": "tool_use", "name": "Read", "input": {"file_path": "/a.rs"}},
            {"type": "tool_use", "name": "Edit", "input": {"file_path": "/b.rs"}},
            {"type": "tool_use", "name": "NotebookEdit", "input": {"notebook_path": "/c.ipynb"}}
        ]);
        let (names, files) = tool_calls(&content);
        assert_eq!(names, vec!["Read", "Edit", "NotebookEdit"]);
        assert_eq!(files, vec!["/b.rs", "/c.ipynb"]);
    }

    #[test]
    fn test_summarize_tool_call() {
        let input = |v: Value| v.as_object().cloned().unwrap();
        assert_eq!(
            summarize_tool_call("Read", &input(json!({"file_path": "/x"}))),
            "Read /x"
        );
        assert_eq!(summarize_tool_call("Grep", &input(json!({}))), "Grep ?");
        assert_eq!(
            summarize_tool_call("Task", &input(json!({"description": "explore"}))),
            "Task: explore"
        );
        assert_eq!(summarize_tool_call("WebFetch", &input(json!({}))), "WebFetch()");

        let long = "x".repeat(100);
        let summary = summarize_tool_call("Bash", &input(json!({ "command": long })));
        assert_eq!(summary, format!("Bash: {}...", "x".repeat(77)));
    }

    #[test]
    fn test_read_transcript() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(
            &dir,
            "s.jsonl",
            &[
                json!({"type": "user", "timestamp": "2025-01-01T10:00:00Z",
                       "message": {"role": "user", "content": "Fix the build"}}),
                json!({"type": "progress", "message": {"role": "user", "content": "skip"}}),
                json!({"type": "assistant", "timestamp": "2025-01-01T10:00:05Z",
                       "message": {"role": "assistant", "content": [
                           {"type": "text", "text": "Looking"},
                           {"type": "tool_use", "name": "Bash", "input": {"command": "cargo build"}}
                       ]}}),
                json!({"type": "user", "message": {"role": "user",
                       "content": [{"type": "tool_result", "content": "ok"}]}}),
                json!({"type": "user", "isMeta": true,
                       "message": {"role": "user", "content": "meta"}}),
            ],
        );
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();

        let turns = read_transcript(&path).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[0].text, "Fix the build");
        assert_eq!(turns[1].role, TurnRole::Agent);
        assert_eq!(turns[1].tool_calls, vec!["Bash: cargo build"]);
    }

    #[test]
    fn test_read_transcript_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(read_transcript(&dir.path().join("none.jsonl")).unwrap().is_empty());
    }

    #[test]
    fn test_parse_subagent_text() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(
            &dir,
            "agent-1.jsonl",
            &[
                json!({"type": "user", "message": {"role": "user", "content": "find callers"}}),
                json!({"type": "assistant", "message": {"role": "assistant", "content": "found 3"}}),
            ],
        );
        let (user, assistant) = parse_subagent_text(&path).unwrap();
        assert_eq!(user, "find callers");
        assert_eq!(assistant, "found 3");
    }
}

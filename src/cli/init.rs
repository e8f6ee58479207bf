//! Project setup performed by `kraang init`: ignore rules, MCP server
//! registration and the session-end indexing hook.

use crate::config::DATA_DIR_NAME;
use crate::error::{KraangError, Result};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

/// Command the agent runs when a session ends
pub const HOOK_COMMAND: &str = "kraang index --from-hook";

const GITIGNORE_BLOCK: &str = "# Kraang\n.kraang/\n";

/// What `init` changed; `false` means the file was already set up
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InitReport {
    pub gitignore_updated: bool,
    pub mcp_json_updated: bool,
    pub hook_configured: bool,
    /// Corrupt files that were moved aside before being rewritten
    pub backups: Vec<PathBuf>,
}

/// Apply every setup step to `root`
pub fn setup_project(root: &Path) -> Result<InitReport> {
    let mut report = InitReport {
        gitignore_updated: ensure_gitignore(root)?,
        ..Default::default()
    };
    report.mcp_json_updated = ensure_mcp_server(root, &mut report.backups)?;
    report.hook_configured = ensure_session_hook(root, &mut report.backups)?;
    Ok(report)
}

/// Add `.kraang/` to `.gitignore`, creating the file if needed
pub fn ensure_gitignore(root: &Path) -> Result<bool> {
    let path = root.join(".gitignore");
    if !path.exists() {
        write_file(&path, GITIGNORE_BLOCK)?;
        return Ok(true);
    }

    let content = read_file(&path)?;
    if content.contains(&format!("{}/", DATA_DIR_NAME)) {
        return Ok(false);
    }

    let mut updated = content;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push('\n');
    updated.push_str(GITIGNORE_BLOCK);
    write_file(&path, &updated)?;
    Ok(true)
}

fn server_entry() -> Value {
    json!({
        "command": "kraang",
        "args": ["serve"],
        "env": { "KRAANG_DB_PATH": format!("{}/kraang.db", DATA_DIR_NAME) },
    })
}

/// Register the MCP server in `.mcp.json`, keeping other servers
pub fn ensure_mcp_server(root: &Path, backups: &mut Vec<PathBuf>) -> Result<bool> {
    let path = root.join(".mcp.json");
    let mut doc = load_json_object(&path, backups)?;

    let mut servers = take_object(&mut doc, "mcpServers");
    if servers.contains_key("kraang") {
        return Ok(false);
    }
    servers.insert("kraang".to_string(), server_entry());
    doc.insert("mcpServers".to_string(), Value::Object(servers));
    write_json(&path, &doc)?;
    Ok(true)
}

fn hook_entry() -> Value {
    json!({
        "hooks": [{ "type": "command", "command": HOOK_COMMAND, "timeout": 120 }]
    })
}

fn has_hook_command(entries: &[Value]) -> bool {
    entries.iter().any(|entry| {
        entry
            .get("hooks")
            .and_then(Value::as_array)
            .is_some_and(|hooks| {
                hooks
                    .iter()
                    .any(|h| h.get("command").and_then(Value::as_str) == Some(HOOK_COMMAND))
            })
    })
}

/// Add the `SessionEnd` indexing hook to `.claude/settings.json`
pub fn ensure_session_hook(root: &Path, backups: &mut Vec<PathBuf>) -> Result<bool> {
    let dir = root.join(".claude");
    std::fs::create_dir_all(&dir).map_err(|e| KraangError::Io {
        source: e,
        context: format!("Failed to create directory: {:?}", dir),
    })?;
    let path = dir.join("settings.json");
    let mut doc = load_json_object(&path, backups)?;

    let mut hooks = take_object(&mut doc, "hooks");
    let mut entries = match hooks.remove("SessionEnd") {
        Some(Value::Array(entries)) => entries,
        _ => Vec::new(),
    };
    if has_hook_command(&entries) {
        return Ok(false);
    }
    entries.push(hook_entry());
    hooks.insert("SessionEnd".to_string(), Value::Array(entries));
    doc.insert("hooks".to_string(), Value::Object(hooks));
    write_json(&path, &doc)?;
    Ok(true)
}

/// Existing JSON object at `path`, or an empty one. Unparseable files are
/// renamed to `<name>.bak` first.
fn load_json_object(path: &Path, backups: &mut Vec<PathBuf>) -> Result<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }

    let content = read_file(path)?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        _ => {
            let mut name = path.file_name().unwrap_or_default().to_os_string();
            name.push(".bak");
            let backup = path.with_file_name(name);
            std::fs::rename(path, &backup).map_err(|e| KraangError::Io {
                source: e,
                context: format!("Failed to back up {:?}", path),
            })?;
            tracing::warn!("Moved unreadable {:?} to {:?}", path, backup);
            backups.push(backup);
            Ok(Map::new())
        }
    }
}

/// Remove `key` from `doc`; anything but an object becomes an empty one
fn take_object(doc: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match doc.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn write_json(path: &Path, doc: &Map<String, Value>) -> Result<()> {
    let mut text = serde_json::to_string_pretty(doc).map_err(|e| KraangError::Json {
        source: e,
        context: format!("Failed to encode {:?}", path),
    })?;
    text.push('\n');
    write_file(path, &text)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| KraangError::Io {
        source: e,
        context: format!("Failed to read {:?}", path),
    })
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|e| KraangError::Io {
        source: e,
        context: format!("Failed to write {:?}", path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_gitignore_created_then_left_alone() {
        let dir = TempDir::new().unwrap();
        assert!(ensure_gitignore(dir.path()).unwrap());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".gitignore")).unwrap(),
            "# Kraang\n.kraang/\n"
        );
        assert!(!ensure_gitignore(dir.path()).unwrap());
    }

    #[test]
    fn test_gitignore_appends_after_missing_newline() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target").unwrap();
        assert!(ensure_gitignore(dir.path()).unwrap());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".gitignore")).unwrap(),
            "target\n\n# Kraang\n.kraang/\n"
        );
    }

    #[test]
    fn test_mcp_json_keeps_other_servers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(".mcp.json"),
            r#"{"mcpServers":{"other":{"command":"x"}}}"#,
        )
        .unwrap();
        let mut backups = Vec::new();
        assert!(ensure_mcp_server(dir.path(), &mut backups).unwrap());
        assert!(!ensure_mcp_server(dir.path(), &mut backups).unwrap());

        let doc: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(".mcp.json")).unwrap())
                .unwrap();
        assert_eq!(doc["mcpServers"]["other"]["command"], "x");
        assert_eq!(doc["mcpServers"]["kraang"]["args"][0], "serve");
        assert!(backups.is_empty());
    }

    #[test]
    fn test_corrupt_settings_are_backed_up() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".claude")).unwrap();
        std::fs::write(dir.path().join(".claude/settings.json"), "{oops").unwrap();

        let mut backups = Vec::new();
        assert!(ensure_session_hook(dir.path(), &mut backups).unwrap());
        assert_eq!(backups, vec![dir.path().join(".claude/settings.json.bak")]);
        assert!(!ensure_session_hook(dir.path(), &mut backups).unwrap());

        let doc: Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(".claude/settings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(
            doc["hooks"]["SessionEnd"][0]["hooks"][0]["command"],
            HOOK_COMMAND
        );
    }

    #[test]
    fn test_hook_appended_next_to_existing_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".claude")).unwrap();
        std::fs::write(
            dir.path().join(".claude/settings.json"),
            r#"{"hooks":{"SessionEnd":[{"hooks":[{"type":"command","command":"echo bye"}]}]}}"#,
        )
        .unwrap();

        let report = setup_project(dir.path()).unwrap();
        assert!(report.hook_configured);
        assert!(report.gitignore_updated);
        assert!(report.mcp_json_updated);

        let doc: Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(".claude/settings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(doc["hooks"]["SessionEnd"].as_array().unwrap().len(), 2);
    }
}

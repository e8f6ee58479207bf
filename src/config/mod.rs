//! Configuration management for kraang
//!
//! Settings live in `.kraang/config.toml` under the project root. Every
//! section has defaults, so a missing file or a partial file is fine.
//! `KRAANG_*` environment variables override file values.

use crate::error::{KraangError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use unicode_normalization::UnicodeNormalization;

mod validator;

pub use validator::ConfigValidator;

/// Directory name that holds kraang state inside a project
pub const DATA_DIR_NAME: &str = ".kraang";

/// Database file name inside the data directory
pub const DB_FILE_NAME: &str = "kraang.db";

/// Config file name inside the data directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Files or directories that mark a project root
pub const PROJECT_MARKERS: &[&str] = &[".git", "pyproject.toml", "package.json", "Cargo.toml"];

pub(crate) const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta", default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }
}

/// Where the database lives and how it is accessed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Explicit database path; wins over `data_dir`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// Data directory, relative to the project root unless absolute
    pub data_dir: PathBuf,
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            data_dir: PathBuf::from(DATA_DIR_NAME),
            pool_size: crate::storage::database::DEFAULT_POOL_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub snippet_length: usize,
    pub related_limit: usize,
    pub similar_titles_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
            snippet_length: crate::search::snippet::DEFAULT_SNIPPET_LENGTH,
            related_limit: 5,
            similar_titles_limit: 3,
        }
    }
}

impl SearchConfig {
    /// Requested limit, defaulted and capped
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub stale_days: i64,
    pub recent_days: i64,
    pub status_tag_limit: usize,
    pub status_stale_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            stale_days: 30,
            recent_days: 7,
            status_tag_limit: 15,
            status_stale_limit: 5,
        }
    }
}

/// Agent session transcript discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Root of per-project transcript directories; `~/.claude/projects` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects_dir: Option<PathBuf>,
    pub summary_max_chars: usize,
    pub transcript_max_chars: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            projects_dir: None,
            summary_max_chars: 500,
            transcript_max_chars: 2000,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(KraangError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| KraangError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load `<root>/.kraang/config.toml` if present, defaults otherwise
    pub fn load_for_project(project_root: &Path) -> Result<Self> {
        let path = Self::project_config_path(project_root);
        if path.exists() {
            return Self::load(&path);
        }

        tracing::debug!("No config at {:?}, using defaults", path);
        let mut config = Self::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KraangError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| KraangError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    pub fn project_config_path(project_root: &Path) -> PathBuf {
        project_root.join(DATA_DIR_NAME).join(CONFIG_FILE_NAME)
    }

    /// Apply environment variable overrides.
    ///
    /// `KRAANG_DB_PATH` sets the database path; other keys use the form
    /// `KRAANG_SECTION__KEY=value`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("KRAANG_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "DB_PATH" | "STORAGE__DB_PATH" => {
                self.storage.db_path = (!value.trim().is_empty()).then(|| PathBuf::from(value));
            }
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "STORAGE__POOL_SIZE" => self.storage.pool_size = parse_env(path, value)?,
            "SEARCH__DEFAULT_LIMIT" => self.search.default_limit = parse_env(path, value)?,
            "SEARCH__MAX_LIMIT" => self.search.max_limit = parse_env(path, value)?,
            "SEARCH__SNIPPET_LENGTH" => self.search.snippet_length = parse_env(path, value)?,
            "ANALYSIS__STALE_DAYS" => self.analysis.stale_days = parse_env(path, value)?,
            "ANALYSIS__RECENT_DAYS" => self.analysis.recent_days = parse_env(path, value)?,
            "SESSIONS__PROJECTS_DIR" => {
                self.sessions.projects_dir = Some(PathBuf::from(value));
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Database location for a project: explicit path (relative to the
    /// root), else `<root>/<data_dir>/kraang.db`
    pub fn resolve_db_path(&self, project_root: &Path) -> PathBuf {
        match &self.storage.db_path {
            Some(path) => project_root.join(path),
            None => project_root.join(&self.storage.data_dir).join(DB_FILE_NAME),
        }
    }

    /// Root directory holding one transcript directory per project
    pub fn sessions_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.sessions.projects_dir {
            return Ok(dir.clone());
        }
        let home_dir = dirs::home_dir()
            .ok_or_else(|| KraangError::Config("Cannot determine home directory".to_string()))?;
        Ok(home_dir.join(".claude").join("projects"))
    }

    /// Transcript directory for one project
    pub fn project_sessions_dir(&self, project_root: &Path) -> Result<PathBuf> {
        Ok(self
            .sessions_dir()?
            .join(encode_project_path(&project_root.to_string_lossy())))
    }
}

fn parse_env<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| KraangError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

/// Canonical form of a note title used as its unique key.
///
/// NFC, whitespace runs collapsed to one space, trimmed, lowercased.
pub fn normalize_title(title: &str) -> String {
    let composed: String = title.nfc().collect();
    composed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Nearest ancestor of `start` (inclusive) containing a project marker,
/// or `start` itself when none does
pub fn find_project_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| PROJECT_MARKERS.iter().any(|m| dir.join(m).exists()))
        .unwrap_or(start)
        .to_path_buf()
}

/// Transcript directory name for a project path (`/a/b` -> `-a-b`)
pub fn encode_project_path(project_path: &str) -> String {
    project_path.replace('/', "-")
}

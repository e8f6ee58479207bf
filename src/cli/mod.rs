//! CLI command definitions and parsing
pub mod init;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "kraang",
    version,
    about = "Project knowledge base for humans and their coding agents",
    long_about = "kraang keeps project-scoped notes and indexes agent session transcripts into a \
                  local SQLite full-text index. Use it from the shell or run it as an MCP server \
                  so an agent can remember, recall and forget knowledge."
)]
pub struct Cli {
    /// Database path (defaults to <project>/.kraang/kraang.db)
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set up kraang for a project
    Init {
        /// Project directory (defaults to the current project root)
        path: Option<PathBuf>,
    },

    /// Run the MCP server over stdio
    Serve,

    /// Index agent session transcripts for the project
    Index {
        /// Read a hook payload from stdin and index only that transcript
        #[arg(long)]
        from_hook: bool,

        /// Project directory (defaults to the current project root)
        path: Option<PathBuf>,
    },

    /// List indexed sessions, newest first
    Sessions {
        /// Maximum number of sessions to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show a session transcript
    Session {
        /// Full session id or 8 character prefix
        id: String,

        /// Maximum turns to show (0 = all)
        #[arg(short = 'n', long, default_value = "0")]
        max_turns: usize,
    },

    /// Search notes and sessions
    Search {
        /// Query text; supports "phrases", AND/OR/NOT and tag:name
        query: String,

        /// Maximum number of results per kind
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// What to search
        #[arg(long, value_parser = ["all", "notes", "sessions"], default_value = "all")]
        scope: String,
    },

    /// List notes, most recently updated first
    Notes {
        /// Include forgotten notes
        #[arg(short, long)]
        all: bool,

        /// Maximum number of notes to show
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },

    /// Create or update a note
    Remember {
        #[arg(long)]
        title: String,

        #[arg(long)]
        content: String,

        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long, default_value = "")]
        category: String,
    },

    /// Downweight or hide a note
    Forget {
        /// Note title
        title: String,

        /// New relevance from 0.0 (hidden) to 1.0 (full weight)
        #[arg(long, default_value = "0.0")]
        relevance: f64,
    },

    /// Show notes related to a note
    Related {
        /// Note title
        title: String,

        /// Maximum number of related notes
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// List notes that have not been updated recently
    Stale {
        /// Age threshold in days (defaults to analysis.stale_days)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Summarize the knowledge base
    Digest,

    /// Show counts, recent activity and tags
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Write the default configuration to .kraang/config.toml
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to config file (defaults to the project config)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_remember_collects_repeated_tags() {
        let cli = Cli::try_parse_from([
            "kraang", "remember", "--title", "T", "--content", "C", "--tag", "a", "--tag", "b",
        ])
        .unwrap();
        match cli.command {
            Commands::Remember { tags, category, .. } => {
                assert_eq!(tags, vec!["a", "b"]);
                assert_eq!(category, "");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["kraang", "status", "--db", "/tmp/k.db", "-v"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/k.db")));
        assert!(cli.verbose);
    }

    #[test]
    fn test_search_scope_is_checked() {
        assert!(Cli::try_parse_from(["kraang", "search", "x", "--scope", "files"]).is_err());
        let cli = Cli::try_parse_from(["kraang", "search", "x", "-n", "3"]).unwrap();
        match cli.command {
            Commands::Search { limit, scope, .. } => {
                assert_eq!(limit, Some(3));
                assert_eq!(scope, "all");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}

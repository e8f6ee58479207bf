use chrono::Utc;
use kraang::cli::init::setup_project;
use kraang::cli::{Cli, Commands, ConfigAction};
use kraang::config::{find_project_root, Config, ConfigValidator, DATA_DIR_NAME};
use kraang::error::{KraangError, Result};
use kraang::formatter;
use kraang::indexer::{index_sessions, read_transcript, IndexOptions};
use kraang::models::Note;
use kraang::search::{build_digest, find_related, find_stale, RecallScope, Searcher};
use kraang::server::Server;
use kraang::storage::{DbStats, SqliteStore};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    let ctx = Context::load(cli.db)?;

    match cli.command {
        Commands::Init { path } => cmd_init(&ctx, path)?,
        Commands::Serve => cmd_serve(ctx)?,
        Commands::Index { from_hook, path } => cmd_index(&ctx, from_hook, path)?,
        Commands::Sessions { limit } => cmd_sessions(&ctx, limit)?,
        Commands::Session { id, max_turns } => cmd_session(&ctx, &id, max_turns)?,
        Commands::Search {
            query,
            limit,
            scope,
        } => cmd_search(&ctx, &query, limit, &scope)?,
        Commands::Notes { all, limit } => cmd_notes(&ctx, all, limit)?,
        Commands::Remember {
            title,
            content,
            tags,
            category,
        } => cmd_remember(&ctx, &title, &content, tags, &category)?,
        Commands::Forget { title, relevance } => cmd_forget(&ctx, &title, relevance)?,
        Commands::Related { title, limit } => cmd_related(&ctx, &title, limit)?,
        Commands::Stale { days } => cmd_stale(&ctx, days)?,
        Commands::Digest => cmd_digest(&ctx)?,
        Commands::Status => cmd_status(&ctx)?,
        Commands::Config { action } => cmd_config(&ctx, action)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "kraang=debug" } else { "kraang=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // stdout carries MCP traffic in `serve`
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Project root, effective configuration and database location
struct Context {
    root: PathBuf,
    config: Config,
    db_path: PathBuf,
    db_override: Option<PathBuf>,
}

impl Context {
    fn load(db_override: Option<PathBuf>) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| KraangError::Io {
            source: e,
            context: "Failed to read current directory".to_string(),
        })?;
        Self::for_root(find_project_root(&cwd), db_override)
    }

    fn for_root(root: PathBuf, db_override: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::load_for_project(&root)?;
        if let Some(db) = &db_override {
            config.storage.db_path = Some(db.clone());
        }
        let db_path = config.resolve_db_path(&root);
        Ok(Self {
            root,
            config,
            db_path,
            db_override,
        })
    }

    /// Open the existing database; `kraang init` creates it
    fn open_store(&self) -> Result<SqliteStore> {
        if !self.db_path.exists() {
            return Err(KraangError::DatabaseNotFound {
                path: self.db_path.clone(),
            });
        }
        SqliteStore::open_with_pool_size(&self.db_path, self.config.storage.pool_size)
    }

    fn index_options(&self, project_root: &Path) -> Result<IndexOptions> {
        Ok(
            IndexOptions::new(project_root, self.config.project_sessions_dir(project_root)?)
                .with_summary_max_chars(self.config.sessions.summary_max_chars),
        )
    }
}

fn cmd_init(ctx: &Context, path: Option<PathBuf>) -> Result<()> {
    let root = match path {
        Some(path) => std::fs::canonicalize(&path).map_err(|e| KraangError::Io {
            source: e,
            context: format!("Failed to resolve project path: {:?}", path),
        })?,
        None => ctx.root.clone(),
    };
    let ctx = Context::for_root(root, ctx.db_override.clone())?;

    println!("Initializing kraang in {}", ctx.root.display());

    let data_dir = ctx.root.join(DATA_DIR_NAME);
    std::fs::create_dir_all(&data_dir).map_err(|e| KraangError::Io {
        source: e,
        context: format!("Failed to create data directory: {:?}", data_dir),
    })?;
    if let Some(parent) = ctx.db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| KraangError::Io {
            source: e,
            context: format!("Failed to create database directory: {:?}", parent),
        })?;
    }
    let store = SqliteStore::open_with_pool_size(&ctx.db_path, ctx.config.storage.pool_size)?;
    println!("✓ Database ready at {}", ctx.db_path.display());

    let report = setup_project(&ctx.root)?;
    for backup in &report.backups {
        println!("⚠ Unreadable file backed up to {}", backup.display());
    }
    if report.gitignore_updated {
        println!("✓ .gitignore updated");
    }
    if report.mcp_json_updated {
        println!("✓ .mcp.json configured");
    }
    if report.hook_configured {
        println!("✓ SessionEnd hook configured");
    }

    let options = ctx.index_options(&ctx.root)?;
    let indexed = index_sessions(&store, &options)?;
    println!("✓ Indexed {} session(s)", indexed);

    Ok(())
}

fn cmd_serve(ctx: Context) -> Result<()> {
    if let Some(parent) = ctx.db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| KraangError::Io {
            source: e,
            context: format!("Failed to create database directory: {:?}", parent),
        })?;
    }
    let store = SqliteStore::open_with_pool_size(&ctx.db_path, ctx.config.storage.pool_size)?;
    let server = Server::new(Arc::new(store), ctx.config);

    let rt = tokio::runtime::Runtime::new().map_err(|e| KraangError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    rt.block_on(server.serve_stdio())
}

/// Payload the agent passes to the session-end hook on stdin
#[derive(Debug, Deserialize)]
struct HookPayload {
    #[serde(default)]
    transcript_path: Option<PathBuf>,
    #[serde(default)]
    cwd: Option<PathBuf>,
}

fn cmd_index(ctx: &Context, from_hook: bool, path: Option<PathBuf>) -> Result<()> {
    let root = path.unwrap_or_else(|| ctx.root.clone());
    let store = ctx.open_store()?;

    if !from_hook {
        let count = index_sessions(&store, &ctx.index_options(&root)?)?;
        println!("✓ Indexed {} session(s)", count);
        return Ok(());
    }

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| KraangError::Io {
            source: e,
            context: "Failed to read hook payload".to_string(),
        })?;

    match serde_json::from_str::<HookPayload>(&input) {
        Ok(payload) => {
            let Some(transcript) = payload.transcript_path.filter(|p| p.exists()) else {
                tracing::debug!("Hook payload has no readable transcript");
                return Ok(());
            };
            let project = payload.cwd.unwrap_or(root);
            let options = ctx.index_options(&project)?.with_single_file(transcript);
            index_sessions(&store, &options)?;
        }
        Err(e) => {
            tracing::warn!("Invalid hook payload ({}), indexing all sessions", e);
            index_sessions(&store, &ctx.index_options(&root)?)?;
        }
    }
    Ok(())
}

fn cmd_sessions(ctx: &Context, limit: usize) -> Result<()> {
    let store = ctx.open_store()?;
    let sessions = store.list_sessions(limit, 0)?;
    println!("{}", formatter::format_session_list(&sessions));
    Ok(())
}

fn cmd_session(ctx: &Context, id: &str, max_turns: usize) -> Result<()> {
    let store = ctx.open_store()?;
    let Some(session) = store.get_session(id)? else {
        println!("Session \"{}\" not found.", id);
        return Ok(());
    };

    let path = ctx
        .config
        .sessions_dir()?
        .join(kraang::config::encode_project_path(&session.project_path))
        .join(format!("{}.jsonl", session.session_id));
    if !path.exists() {
        println!("Session transcript file not found for \"{}\".", id);
        return Ok(());
    }

    let turns = read_transcript(&path)?;
    println!(
        "{}",
        formatter::format_transcript(
            &session,
            &turns,
            max_turns,
            ctx.config.sessions.transcript_max_chars
        )
    );
    Ok(())
}

fn cmd_search(ctx: &Context, query: &str, limit: Option<usize>, scope: &str) -> Result<()> {
    let store = ctx.open_store()?;
    let scope: RecallScope = scope.parse()?;
    let limit = ctx.config.search.clamp_limit(limit);

    let recall = Searcher::new(&store)
        .with_snippet_length(ctx.config.search.snippet_length)
        .recall(query, scope, limit);
    println!(
        "{}",
        formatter::format_recall_results(query, &recall.notes, &recall.sessions)
    );
    Ok(())
}

fn cmd_notes(ctx: &Context, all: bool, limit: usize) -> Result<()> {
    let store = ctx.open_store()?;
    let notes = store.list_notes(all, limit, 0)?;
    println!("{}", formatter::format_note_list(&notes, Utc::now()));
    Ok(())
}

fn cmd_remember(
    ctx: &Context,
    title: &str,
    content: &str,
    tags: Vec<String>,
    category: &str,
) -> Result<()> {
    if content.trim().is_empty() {
        return Err(KraangError::InvalidInput(
            "content must not be empty".to_string(),
        ));
    }
    let store = ctx.open_store()?;
    let (note, created) = store.upsert_note(title, content.trim(), tags, category)?;

    if created {
        let limit = ctx.config.search.similar_titles_limit;
        let similar: Vec<Note> = store
            .find_similar_titles(&note.title, limit + 1)
            .into_iter()
            .filter(|other| other.note_id != note.note_id)
            .take(limit)
            .collect();
        println!("✓ {}", formatter::format_remember_created(&note, &similar));
    } else {
        println!("✓ {}", formatter::format_remember_updated(&note));
    }
    Ok(())
}

fn cmd_forget(ctx: &Context, title: &str, relevance: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&relevance) {
        return Err(KraangError::InvalidInput(format!(
            "relevance must be between 0.0 and 1.0, got {}",
            relevance
        )));
    }
    let store = ctx.open_store()?;
    match store.set_relevance(title, relevance)? {
        Some(note) => println!("✓ {}", formatter::format_forget(&note.title, relevance)),
        None => println!("Note \"{}\" not found.", title),
    }
    Ok(())
}

fn cmd_related(ctx: &Context, title: &str, limit: Option<usize>) -> Result<()> {
    let store = ctx.open_store()?;
    let Some(note) = store.get_note_by_title(title)? else {
        println!("Note \"{}\" not found.", title);
        return Ok(());
    };

    let limit = limit.unwrap_or(ctx.config.search.related_limit);
    let related = find_related(&note, &store, limit);
    println!("{}", formatter::format_related(&note.title, &related));
    Ok(())
}

fn cmd_stale(ctx: &Context, days: Option<i64>) -> Result<()> {
    let store = ctx.open_store()?;
    let days = days.unwrap_or(ctx.config.analysis.stale_days);
    let stale = find_stale::<Note, _>(&store, days, Utc::now())?;
    println!("{}", formatter::format_stale(&stale, days));
    Ok(())
}

fn cmd_digest(ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let digest = build_digest::<Note, _>(&store, Utc::now())?;
    println!("{}", formatter::format_digest(&digest));
    Ok(())
}

fn cmd_status(ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let report = store.status_report(&ctx.config.analysis)?;
    println!("{}", formatter::format_status(&report, Utc::now()));

    let stats = store.database().stats()?;
    println!(
        "\nDatabase: {} ({})",
        ctx.db_path.display(),
        DbStats::format_size(stats.file_size_bytes)
    );
    Ok(())
}

fn cmd_config(ctx: &Context, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let text = toml::to_string_pretty(&ctx.config)?;
            println!("{}", text);
        }
        ConfigAction::Init { force } => {
            let path = Config::project_config_path(&ctx.root);
            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }
            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Validate { file } => {
            let path = file.unwrap_or_else(|| Config::project_config_path(&ctx.root));
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
    }

    Ok(())
}

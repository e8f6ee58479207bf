use chrono::{Duration, SecondsFormat, Utc};
use kraang::models::{Note, Searchable};
use kraang::search::{compile, Searcher};
use kraang::storage::{ItemStatus, SearchCapability, SearchFilters, SqliteStore};
use rusqlite::params;
use tempfile::TempDir;

const CORPUS: &[(&str, &str, &[&str], &str)] = &[
    (
        "SQLite FTS5 guide",
        "FTS5 is a full-text search extension for SQLite using BM25 ranking.",
        &["sqlite", "search", "database"],
        "engineering",
    ),
    (
        "Postgres tuning",
        "Shared buffers, work_mem and autovacuum settings for Postgres.",
        &["database"],
        "engineering",
    ),
    (
        "Embedded databases",
        "Comparing SQLite, LMDB and RocksDB. SQLite also ships FTS5 for text search.",
        &["database"],
        "research",
    ),
    (
        "Release checklist",
        "Bump the version, tag the commit, publish the crate.",
        &["process"],
        "ops",
    ),
    (
        "Tokio runtime notes",
        "Multi-threaded scheduler, spawn_blocking for synchronous work.",
        &["rust", "async"],
        "engineering",
    ),
    (
        "Search relevance ideas",
        "Boost title matches, decay old documents, try BM25 weights.",
        &["search"],
        "research",
    ),
    (
        "Onboarding",
        "Install the toolchain, clone the repo and run the test suite.",
        &["process"],
        "ops",
    ),
    (
        "Backup strategy",
        "Nightly snapshots of the SQLite file plus WAL checkpointing.",
        &["database", "ops"],
        "ops",
    ),
    (
        "Error handling",
        "Use thiserror for library errors and anyhow at the binary edge.",
        &["rust"],
        "engineering",
    ),
    (
        "Logging setup",
        "tracing with an EnvFilter writing to stderr.",
        &["rust", "observability"],
        "engineering",
    ),
    (
        "Meeting notes March",
        "Discussed roadmap, hiring and the search rewrite.",
        &[],
        "",
    ),
    (
        "Unicode handling",
        "Normalize titles with NFC before comparing them.",
        &["text"],
        "engineering",
    ),
    (
        "Config layering",
        "Defaults, then TOML file, then environment overrides.",
        &["config"],
        "engineering",
    ),
    (
        "CI pipeline",
        "Build, clippy, tests and a release job on tags.",
        &["process"],
        "ops",
    ),
    (
        "Ideas backlog",
        "Session indexing, related notes, a weekly digest.",
        &[],
        "product",
    ),
];

fn seeded_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = SqliteStore::open(&dir.path().join("kraang.db")).expect("Failed to open store");
    for (title, content, tags, category) in CORPUS {
        let tags = tags.iter().map(|t| t.to_string()).collect();
        store
            .upsert_note(title, content, tags, category)
            .expect("Failed to seed note");
    }
    (dir, store)
}

fn titles(results: &[kraang::models::ScoredResult<Note>]) -> Vec<&str> {
    results.iter().map(|r| r.item.title.as_str()).collect()
}

#[test]
fn test_phrase_query_ranks_title_match_first() {
    let (_dir, store) = seeded_store();
    let response =
        Searcher::new(&store).search::<Note>("\"SQLite FTS5\"", &SearchFilters::new(), 10, 0);

    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].item.title, "SQLite FTS5 guide");
    assert_eq!(response.total, response.results.len());
    for pair in response.results.windows(2) {
        assert!(pair[0].score >= pair[1].score, "results not sorted by score");
    }
    println!("✓ Phrase query ranked: {:?}", titles(&response.results));
}

#[test]
fn test_scores_are_positive_and_snippets_highlight_terms() {
    let (_dir, store) = seeded_store();
    let response = Searcher::new(&store).search::<Note>("sqlite", &SearchFilters::new(), 10, 0);

    assert!(response.results.len() >= 3);
    for result in &response.results {
        assert!(result.score > 0.0);
        assert!(!result.snippet.is_empty());
    }
    assert!(response
        .results
        .iter()
        .any(|r| r.snippet.contains(">>>") && r.snippet.contains("<<<")));
}

#[test]
fn test_unsafe_input_never_errors() {
    let (_dir, store) = seeded_store();
    let searcher = Searcher::new(&store);
    for raw in ["", "^*()", "\"", "AND", "OR", "NOT", "sqlite AND", "(((", "tag:"] {
        let response = searcher.search::<Note>(raw, &SearchFilters::new(), 10, 0);
        assert!(response.total >= response.results.len(), "bad total for {:?}", raw);
    }
}

#[test]
fn test_control_characters_compile_to_valid_expressions() {
    let (_dir, store) = seeded_store();
    for raw in ["sqlite\u{0}fts5", "\"SQLite\u{0}FTS5\"", "\u{0}sqlite\u{1}"] {
        let expression = compile(raw);
        assert!(!expression.as_str().contains('\u{0}'));
        let hits = SearchCapability::<Note>::match_search(
            &store,
            &expression,
            &SearchFilters::new(),
            10,
            0,
        )
        .expect("engine rejected a compiled expression");
        assert!(
            hits.iter().any(|hit| hit.item.title == "SQLite FTS5 guide"),
            "no hit for {:?}",
            raw
        );
    }
}

#[test]
fn test_pagination_and_total() {
    let (_dir, store) = seeded_store();
    let searcher = Searcher::new(&store);
    let first = searcher.search::<Note>("database OR sqlite", &SearchFilters::new(), 2, 0);
    let second = searcher.search::<Note>("database OR sqlite", &SearchFilters::new(), 2, 2);

    assert_eq!(first.results.len(), 2);
    assert!(first.total >= 4);
    assert_eq!(first.total, second.total);
    let first_titles = titles(&first.results);
    assert!(second
        .results
        .iter()
        .all(|r| !first_titles.contains(&r.item.title.as_str())));
}

#[test]
fn test_filters_narrow_results() {
    let (_dir, store) = seeded_store();
    let searcher = Searcher::new(&store);

    let ops = searcher.search::<Note>(
        "sqlite",
        &SearchFilters::new().with_category("ops"),
        10,
        0,
    );
    assert_eq!(titles(&ops.results), vec!["Backup strategy"]);

    let tagged = searcher.search::<Note>("sqlite tag:search", &SearchFilters::new(), 10, 0);
    assert_eq!(titles(&tagged.results), vec!["SQLite FTS5 guide"]);
}

#[test]
fn test_forget_hides_and_remember_restores() {
    let (_dir, store) = seeded_store();
    let searcher = Searcher::new(&store);

    store
        .set_relevance("sqlite fts5 GUIDE", 0.0)
        .expect("Failed to forget")
        .expect("Note should exist");
    let hidden = searcher.search::<Note>("\"SQLite FTS5\"", &SearchFilters::new(), 10, 0);
    assert!(!titles(&hidden.results).contains(&"SQLite FTS5 guide"));
    assert!(!titles(&store.search_notes(&compile("\"SQLite FTS5\""), 10))
        .contains(&"SQLite FTS5 guide"));

    let (note, created) = store
        .upsert_note(
            "SQLite FTS5 guide",
            "FTS5 is a full-text search extension for SQLite using BM25 ranking.",
            vec!["sqlite".to_string()],
            "engineering",
        )
        .expect("Failed to re-remember");
    assert!(!created);
    assert_eq!(note.relevance, 1.0);

    let restored = searcher.search::<Note>("\"SQLite FTS5\"", &SearchFilters::new(), 10, 0);
    assert_eq!(restored.results[0].item.title, "SQLite FTS5 guide");
    assert_eq!(
        store.search_notes(&compile("\"SQLite FTS5\""), 10)[0].item.title,
        "SQLite FTS5 guide"
    );
}

#[test]
fn test_downweighted_note_scores_lower() {
    let (_dir, store) = seeded_store();
    let searcher = Searcher::new(&store);
    let before = searcher.search::<Note>("postgres", &SearchFilters::new(), 10, 0);
    let full = before.results[0].score;

    store.set_relevance("Postgres tuning", 0.3).expect("Failed to downweight");
    let after = searcher.search::<Note>("postgres", &SearchFilters::new(), 10, 0);
    assert!((after.results[0].score - full * 0.3).abs() < 1e-9);

    let downweighted = searcher.search::<Note>(
        "postgres",
        &SearchFilters::new().with_status(ItemStatus::Downweighted),
        10,
        0,
    );
    assert_eq!(titles(&downweighted.results), vec!["Postgres tuning"]);
}

#[test]
fn test_capability_lookup_and_listing() {
    let (_dir, store) = seeded_store();
    let note = SearchCapability::<Note>::lookup_by_key(&store, "sqlite fts5 guide")
        .expect("lookup failed")
        .expect("note should exist");
    let by_id = SearchCapability::<Note>::lookup(&store, note.id())
        .expect("lookup failed")
        .expect("note should exist");
    assert_eq!(by_id.title, note.title);

    let all: Vec<Note> = SearchCapability::<Note>::list_all(&store).expect("list failed");
    assert_eq!(all.len(), CORPUS.len());

    let count = SearchCapability::<Note>::count_search(
        &store,
        &compile("sqlite"),
        &SearchFilters::new(),
    )
    .expect("count failed");
    assert!(count >= 3);
}

#[test]
fn test_status_report_counts() {
    let (_dir, store) = seeded_store();
    store.set_relevance("Ideas backlog", 0.0).expect("Failed to forget");

    let conn = store.database().get_conn().expect("Failed to get connection");
    let old = (Utc::now() - Duration::days(90)).to_rfc3339_opts(SecondsFormat::Micros, true);
    conn.execute(
        "UPDATE notes SET updated_at = ?1 WHERE title = ?2",
        params![old, "Onboarding"],
    )
    .expect("Failed to age note");
    drop(conn);

    let report = store
        .status_report(&kraang::config::AnalysisConfig::default())
        .expect("status failed");
    assert_eq!(report.active_notes, CORPUS.len() - 1);
    assert_eq!(report.forgotten_notes, 1);
    assert_eq!(report.session_count, 0);
    assert!(report.last_indexed.is_none());
    assert_eq!(
        report
            .stale_notes
            .iter()
            .map(|n| n.title.as_str())
            .collect::<Vec<_>>(),
        vec!["Onboarding"]
    );
    assert!(report.tags.iter().any(|(tag, count)| tag == "database" && *count == 4));
    println!("✓ Status: {} active, {} forgotten", report.active_notes, report.forgotten_notes);
}

use chrono::{Duration, SecondsFormat, Utc};
use kraang::models::{Note, Searchable};
use kraang::search::{build_digest, deduplicate, find_related, find_stale, suggest_related, Searcher};
use kraang::storage::{MemoryStore, SearchFilters, SqliteStore};
use rusqlite::params;
use tempfile::TempDir;

fn store_with(notes: &[(&str, &str, &[&str], &str)]) -> (TempDir, SqliteStore) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = SqliteStore::open(&dir.path().join("kraang.db")).expect("Failed to open store");
    for (title, content, tags, category) in notes {
        store
            .upsert_note(
                title,
                content,
                tags.iter().map(|t| t.to_string()).collect(),
                category,
            )
            .expect("Failed to insert note");
    }
    (dir, store)
}

fn age_note(store: &SqliteStore, title: &str, days: i64) {
    let at = (Utc::now() - Duration::days(days)).to_rfc3339_opts(SecondsFormat::Micros, true);
    let conn = store.database().get_conn().expect("Failed to get connection");
    conn.execute(
        "UPDATE notes SET updated_at = ?1, created_at = ?1 WHERE title = ?2",
        params![at, title],
    )
    .expect("Failed to age note");
}

const NOTES: &[(&str, &str, &[&str], &str)] = &[
    (
        "Rust error handling",
        "thiserror enums in libraries, anyhow in binaries",
        &["rust", "errors"],
        "engineering",
    ),
    (
        "Rust async runtimes",
        "tokio versus async-std, blocking work goes to spawn_blocking",
        &["rust", "async"],
        "engineering",
    ),
    (
        "Handling errors in Go",
        "wrap errors with context and check them explicitly",
        &["go", "errors"],
        "engineering",
    ),
    (
        "Sourdough starter",
        "feed twice a day with equal weights of flour and water",
        &["baking"],
        "life",
    ),
];

#[test]
fn test_related_excludes_self_and_finds_neighbours() {
    let (_dir, store) = store_with(NOTES);
    let note = store
        .get_note_by_title("Rust error handling")
        .expect("lookup failed")
        .expect("note should exist");

    let related = find_related(&note, &store, 5);
    let titles: Vec<&str> = related.iter().map(|r| r.item.title.as_str()).collect();

    assert!(!titles.contains(&"Rust error handling"));
    assert!(titles.contains(&"Rust async runtimes"));
    assert!(titles.contains(&"Handling errors in Go"));
    assert!(!titles.contains(&"Sourdough starter"));
    println!("✓ Related to {:?}: {:?}", note.title, titles);
}

#[test]
fn test_related_respects_limit_and_unknown_ids() {
    let (_dir, store) = store_with(NOTES);
    let note = store
        .get_note_by_title("Rust error handling")
        .expect("lookup failed")
        .expect("note should exist");

    let one = suggest_related::<Note, _>(note.id(), &store, 1).expect("suggest failed");
    assert_eq!(one.len(), 1);
    assert_ne!(one[0].item.note_id, note.note_id);

    let none = suggest_related::<Note, _>("missing-id", &store, 5).expect("suggest failed");
    assert!(none.is_empty());
}

#[test]
fn test_stale_notes_ordered_oldest_first() {
    let (_dir, store) = store_with(NOTES);
    age_note(&store, "Sourdough starter", 120);
    age_note(&store, "Handling errors in Go", 45);
    age_note(&store, "Rust async runtimes", 10);

    let stale = find_stale::<Note, _>(&store, 30, Utc::now()).expect("stale failed");
    let titles: Vec<&str> = stale.iter().map(|s| s.item.title.as_str()).collect();
    assert_eq!(titles, vec!["Sourdough starter", "Handling errors in Go"]);
    assert!(stale[0].days_since_update >= 119);

    store.set_relevance("Sourdough starter", 0.0).expect("forget failed");
    let stale = find_stale::<Note, _>(&store, 30, Utc::now()).expect("stale failed");
    assert_eq!(stale.len(), 1);
}

#[test]
fn test_digest_over_sqlite() {
    let (_dir, store) = store_with(NOTES);
    age_note(&store, "Sourdough starter", 60);
    store.set_relevance("Handling errors in Go", 0.0).expect("forget failed");

    let digest = build_digest::<Note, _>(&store, Utc::now()).expect("digest failed");
    assert_eq!(digest.total_items, 4);
    assert_eq!(digest.forgotten_items, 1);
    assert_eq!(digest.recent.len(), 2);
    assert_eq!(digest.stale_count, 1);
    assert_eq!(digest.tag_distribution[0], ("rust".to_string(), 2));
    assert_eq!(
        digest.category_distribution,
        vec![("engineering".to_string(), 2), ("life".to_string(), 1)]
    );
}

#[test]
fn test_sqlite_and_memory_agree_on_membership() {
    let (_dir, sqlite) = store_with(NOTES);
    let memory = MemoryStore::new();
    for (title, content, tags, category) in NOTES {
        memory
            .upsert_note(
                title,
                content,
                tags.iter().map(|t| t.to_string()).collect(),
                category,
            )
            .expect("Failed to insert note");
    }

    for query in [
        "errors",
        "rust OR baking",
        "\"spawn_blocking\"",
        "rust NOT async",
        "rust - tokio",
        "flour ;)",
        "rust / async, tokio",
    ] {
        let mut from_sqlite: Vec<String> = Searcher::new(&sqlite)
            .search::<Note>(query, &SearchFilters::new(), 10, 0)
            .results
            .into_iter()
            .map(|r| r.item.title)
            .collect();
        let mut from_memory: Vec<String> = Searcher::new(&memory)
            .search::<Note>(query, &SearchFilters::new(), 10, 0)
            .results
            .into_iter()
            .map(|r| r.item.title)
            .collect();
        from_sqlite.sort();
        from_memory.sort();
        assert_eq!(from_sqlite, from_memory, "engines disagree on {:?}", query);
    }
}

#[test]
fn test_deduplicate_search_results() {
    let (_dir, store) = store_with(NOTES);
    let mut results = Searcher::new(&store)
        .search::<Note>("rust", &SearchFilters::new(), 10, 0)
        .results;
    let copy = results.clone();
    results.extend(copy);

    let unique = deduplicate(results);
    assert_eq!(unique.len(), 2);
}

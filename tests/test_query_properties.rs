use kraang::search::query::UNSAFE_CHARS;
use kraang::search::{compile, parse_query, sanitize};

const SAMPLES: &[&str] = &[
    "",
    "   ",
    "plain words here",
    "sqlite AND fts5",
    "\"exact phrase\" loose words",
    "\"unbalanced quote",
    "a \"b\" \"c",
    "weird ^*(){}[]: characters",
    "key:value pair",
    "tag:rust ownership borrow",
    "NOT deprecated OR legacy",
    "emoji 🚀 and ünïcödé",
    "\"\" empty phrase",
    "\"keep (this) as-is\" strip (that)",
];

fn outside_phrases(text: &str) -> String {
    text.split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 0)
        .map(|(_, part)| part)
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn test_sanitized_text_has_balanced_quotes_and_no_unsafe_chars() {
    for raw in SAMPLES {
        let clean = sanitize(raw);
        assert_eq!(clean.matches('"').count() % 2, 0, "unbalanced quotes for {:?}", raw);
        assert!(
            !outside_phrases(&clean).contains(UNSAFE_CHARS),
            "unsafe character left in {:?} -> {:?}",
            raw,
            clean
        );
        assert_eq!(clean.trim(), clean, "untrimmed output for {:?}", raw);
    }
    println!("✓ Sanitizer output is well-formed for {} samples", SAMPLES.len());
}

#[test]
fn test_sanitize_is_idempotent() {
    for raw in SAMPLES {
        let once = sanitize(raw);
        assert_eq!(sanitize(&once), once, "sanitize not idempotent for {:?}", raw);
    }
}

#[test]
fn test_compiled_words_are_quoted() {
    for raw in SAMPLES {
        let expression = compile(raw);
        if expression.is_empty() {
            continue;
        }
        let text = expression.as_str();
        assert_eq!(text.matches('"').count() % 2, 0, "bad quoting in {:?}", text);
        for word in outside_phrases(text).split_whitespace() {
            assert!(
                ["AND", "OR", "NOT"].contains(&word.to_uppercase().as_str()),
                "bare word {:?} in {:?}",
                word,
                text
            );
        }
    }
}

#[test]
fn test_compile_examples() {
    assert_eq!(compile("sqlite fts5").as_str(), "\"sqlite\" \"fts5\"");
    assert_eq!(compile("\"SQLite FTS5\"").as_str(), "\"SQLite FTS5\"");
    assert_eq!(compile("a OR b").as_str(), "\"a\" OR \"b\"");
    assert_eq!(compile("func(x)").as_str(), "\"func\" \"x\"");
    assert!(compile("^*()").is_empty());
    assert!(compile("").is_empty());
}

#[test]
fn test_tag_filters_are_extracted() {
    let parsed = parse_query("tag:rust tag:async executors");
    assert_eq!(parsed.tags, vec!["rust", "async"]);
    assert_eq!(parsed.expression.as_str(), "\"executors\"");

    let parsed = parse_query("tag:only");
    assert_eq!(parsed.tags, vec!["only"]);
    assert!(parsed.expression.is_empty());
}

#[test]
fn test_terms_round_trip_through_expression() {
    let expression = compile("\"connection pool\" timeout NOT retry");
    assert_eq!(
        expression.terms(),
        vec!["connection pool", "timeout", "retry"]
    );
}

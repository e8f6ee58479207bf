//! Snippet generation
//!
//! Builds a bounded excerpt around the first query-term match and wraps each
//! match with the same markers the SQLite engine uses in `snippet()`.
//! Offsets are in characters, never bytes.

/// Opening highlight marker
pub const HIGHLIGHT_OPEN: &str = ">>>";
/// Closing highlight marker
pub const HIGHLIGHT_CLOSE: &str = "<<<";
/// Marker for clipped content
pub const ELLIPSIS: &str = "...";
/// Default excerpt length in characters
pub const DEFAULT_SNIPPET_LENGTH: usize = 200;

/// Lowercase a char when that keeps a 1:1 mapping, so offsets stay aligned
fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

fn prepare_terms<S: AsRef<str>>(terms: &[S]) -> Vec<Vec<char>> {
    terms
        .iter()
        .map(|t| t.as_ref().trim().trim_matches('"').chars().map(fold).collect::<Vec<_>>())
        .filter(|t| !t.is_empty())
        .collect()
}

fn matches_at(haystack: &[char], at: usize, needle: &[char]) -> bool {
    at + needle.len() <= haystack.len() && haystack[at..at + needle.len()] == *needle
}

fn first_match(haystack: &[char], terms: &[Vec<char>]) -> Option<usize> {
    (0..haystack.len()).find(|&i| terms.iter().any(|t| matches_at(haystack, i, t)))
}

/// Character ranges of every term occurrence, merged when they overlap
fn highlight_ranges(haystack: &[char], terms: &[Vec<char>]) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for i in 0..haystack.len() {
        let longest = terms
            .iter()
            .filter(|t| matches_at(haystack, i, t))
            .map(|t| t.len())
            .max();
        if let Some(len) = longest {
            let end = i + len;
            match ranges.last_mut() {
                Some(last) if i <= last.1 => last.1 = last.1.max(end),
                _ => ranges.push((i, end)),
            }
        }
    }
    ranges
}

/// Excerpt of `content` centered on the first occurrence of any term.
///
/// Terms are matched case-insensitively with wrapping quotes removed. Without
/// usable terms or a match, the first `max_length` characters are returned
/// unmarked.
pub fn generate_snippet<S: AsRef<str>>(content: &str, terms: &[S], max_length: usize) -> String {
    if content.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = content.chars().collect();
    let head = || chars.iter().take(max_length).collect::<String>();

    let terms = prepare_terms(terms);
    if terms.is_empty() {
        return head();
    }

    let folded: Vec<char> = chars.iter().copied().map(fold).collect();
    let Some(pos) = first_match(&folded, &terms) else {
        return head();
    };

    let len = chars.len();
    let mut start = pos.saturating_sub(max_length / 2);
    let end = (start + max_length).min(len);
    if end == len {
        start = end.saturating_sub(max_length);
    }

    let window = &chars[start..end];
    let ranges = highlight_ranges(&folded[start..end], &terms);

    let mut out = String::with_capacity(window.len() + ranges.len() * 6 + 6);
    if start > 0 {
        out.push_str(ELLIPSIS);
    }

    let mut cursor = 0;
    for (from, to) in ranges {
        out.extend(&window[cursor..from]);
        out.push_str(HIGHLIGHT_OPEN);
        out.extend(&window[from..to]);
        out.push_str(HIGHLIGHT_CLOSE);
        cursor = to;
    }
    out.extend(&window[cursor..]);

    if end < len {
        out.push_str(ELLIPSIS);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_TERMS: &[&str] = &[];

    #[test]
    fn test_empty_content() {
        assert_eq!(generate_snippet("", &["x"], 200), "");
    }

    #[test]
    fn test_no_terms_returns_head() {
        assert_eq!(generate_snippet("hello world", NO_TERMS, 200), "hello world");
        assert_eq!(generate_snippet("hello world", NO_TERMS, 5), "hello");
    }

    #[test]
    fn test_no_match_returns_head() {
        assert_eq!(generate_snippet("hello world", &["zzz"], 5), "hello");
    }

    #[test]
    fn test_highlights_case_insensitive() {
        let s = generate_snippet("Python is great. I love python.", &["PYTHON"], 200);
        assert_eq!(s, ">>>Python<<< is great. I love >>>python<<<.");
    }

    #[test]
    fn test_strips_wrapping_quotes() {
        let s = generate_snippet("use sqlite here", &["\"sqlite\""], 200);
        assert_eq!(s, "use >>>sqlite<<< here");
    }

    #[test]
    fn test_window_centered_with_ellipses() {
        let content = format!("{} python {}", "A".repeat(300), "B".repeat(300));
        let s = generate_snippet(&content, &["python"], 50);
        assert!(s.contains(">>>python<<<"));
        assert!(s.starts_with(ELLIPSIS));
        assert!(s.ends_with(ELLIPSIS));
        // 50 window chars, one highlight pair, two ellipses
        assert!(s.chars().count() <= 62, "snippet too long: {}", s.chars().count());
    }

    #[test]
    fn test_window_clipped_at_end_shifts_left() {
        let content = format!("{}needle", "x".repeat(100));
        let s = generate_snippet(&content, &["needle"], 20);
        assert!(s.starts_with(ELLIPSIS));
        assert!(s.ends_with(">>>needle<<<"));
        let plain = s.replace(ELLIPSIS, "").replace(HIGHLIGHT_OPEN, "").replace(HIGHLIGHT_CLOSE, "");
        assert_eq!(plain.chars().count(), 20);
    }

    #[test]
    fn test_match_at_start_has_no_prefix() {
        let content = format!("needle {}", "y".repeat(100));
        let s = generate_snippet(&content, &["needle"], 20);
        assert!(s.starts_with(">>>needle<<<"));
        assert!(s.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_overlapping_terms_merge() {
        let s = generate_snippet("database", &["data", "database"], 200);
        assert_eq!(s, ">>>database<<<");
    }

    #[test]
    fn test_multibyte_content() {
        let s = generate_snippet("café über naïve", &["ÜBER"], 200);
        assert_eq!(s, "café >>>über<<< naïve");
    }
}

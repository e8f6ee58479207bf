//! Result deduplication across combined result sets

use super::scoring::sort_by_score;
use crate::models::{ScoredResult, Searchable};
use ahash::{HashMap, HashMapExt};

/// Collapse results sharing an id, keeping the best-scoring entry.
///
/// Equal scores keep the first-seen entry. Output is sorted by score,
/// descending.
pub fn deduplicate<T: Searchable>(results: Vec<ScoredResult<T>>) -> Vec<ScoredResult<T>> {
    let mut best: HashMap<String, usize> = HashMap::with_capacity(results.len());
    let mut kept: Vec<ScoredResult<T>> = Vec::with_capacity(results.len());

    for result in results {
        match best.get(result.item.id()) {
            Some(&slot) => {
                if result.score > kept[slot].score {
                    kept[slot] = result;
                }
            }
            None => {
                best.insert(result.item.id().to_string(), kept.len());
                kept.push(result);
            }
        }
    }

    sort_by_score(&mut kept);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Note;

    fn result(id: &str, score: f64, snippet: &str) -> ScoredResult<Note> {
        let mut note = Note::new(id, "content", vec![], "");
        note.note_id = id.to_string();
        ScoredResult {
            item: note,
            score,
            snippet: snippet.to_string(),
        }
    }

    #[test]
    fn test_keeps_highest_score_per_id() {
        let results = vec![result("A", 1.0, ""), result("A", 5.0, ""), result("B", 2.0, "")];
        let deduped = deduplicate(results);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].item.note_id, "A");
        assert_eq!(deduped[0].score, 5.0);
        assert_eq!(deduped[1].item.note_id, "B");
        assert_eq!(deduped[1].score, 2.0);
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let results = vec![result("A", 3.0, "first"), result("A", 3.0, "second")];
        let deduped = deduplicate(results);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].snippet, "first");
    }

    #[test]
    fn test_resorts_regardless_of_input_order() {
        let results = vec![result("C", 0.5, ""), result("B", 9.0, ""), result("A", 4.0, "")];
        let ids: Vec<_> = deduplicate(results)
            .into_iter()
            .map(|r| r.item.note_id)
            .collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(deduplicate(Vec::<ScoredResult<Note>>::new()).is_empty());
    }
}

//! Markdown rendering for tool responses and CLI output

use crate::models::{
    truncate_chars, Digest, Note, ScoredResult, Session, StaleItem, StatusReport, TranscriptTurn,
};
use chrono::{DateTime, Utc};

/// Characters of note content shown when a result has no snippet
const FALLBACK_SNIPPET_CHARS: usize = 200;

/// Default cap on one transcript turn's text
pub const TRANSCRIPT_TEXT_MAX_CHARS: usize = 2000;

/// Compact age of a timestamp relative to `now` (`just now`, `5m ago`, `2d ago`, ...)
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now - at;
    let days = delta.num_days();

    match days {
        d if d <= 0 => {
            let hours = delta.num_hours();
            let minutes = delta.num_minutes();
            if hours > 0 {
                format!("{}h ago", hours)
            } else if minutes > 0 {
                format!("{}m ago", minutes)
            } else {
                "just now".to_string()
            }
        }
        d if d < 30 => format!("{}d ago", d),
        d if d < 365 => format!("{}mo ago", d / 30),
        d => format!("{}y ago", d / 365),
    }
}

/// Human readable duration (`45s`, `3m 20s`, `2h 5m`)
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        let (m, s) = (seconds / 60, seconds % 60);
        if s > 0 {
            format!("{}m {}s", m, s)
        } else {
            format!("{}m", m)
        }
    } else {
        let (h, m) = (seconds / 3600, (seconds % 3600) / 60);
        if m > 0 {
            format!("{}h {}m", h, m)
        } else {
            format!("{}h", h)
        }
    }
}

pub fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

fn tags_and_category(note: &Note) -> String {
    let mut out = String::new();
    if !note.tags.is_empty() {
        out.push_str(&format!(" (tags: {})", note.tags.join(" | ")));
    }
    if !note.category.is_empty() {
        out.push_str(&format!(" | category: {}", note.category));
    }
    out
}

fn category_suffix(category: &str) -> String {
    if category.is_empty() {
        String::new()
    } else {
        format!(" ({})", category)
    }
}

/// Confirmation for a new note, with hints about similarly titled notes
pub fn format_remember_created(note: &Note, similar: &[Note]) -> String {
    let mut parts = vec![format!(
        "Created \"{}\"{}",
        note.title,
        tags_and_category(note)
    )];
    for other in similar {
        parts.push(format!(
            "Note: similar existing note \"{}\". Use that exact title to update it instead.",
            other.title
        ));
    }
    parts.join("\n")
}

pub fn format_remember_updated(note: &Note) -> String {
    format!("Updated \"{}\"{}", note.title, tags_and_category(note))
}

fn match_label(count: usize) -> &'static str {
    if count == 1 {
        "match"
    } else {
        "matches"
    }
}

/// Combined note and session results for a query
pub fn format_recall_results(
    query: &str,
    notes: &[ScoredResult<Note>],
    sessions: &[ScoredResult<Session>],
) -> String {
    if notes.is_empty() && sessions.is_empty() {
        return format!("No results found for \"{}\".", query);
    }

    let mut parts = vec![format!("## Results for \"{}\"", query)];

    if !notes.is_empty() {
        parts.push(format!(
            "\n### Notes ({} {})\n",
            notes.len(),
            match_label(notes.len())
        ));
        for result in notes {
            let note = &result.item;
            parts.push(format!("**{}**{}", note.title, category_suffix(&note.category)));

            let mut meta = Vec::new();
            if !note.tags.is_empty() {
                meta.push(format!("Tags: {}", note.tags.join(", ")));
            }
            meta.push(format!("Updated: {}", format_date(note.updated_at)));
            parts.push(meta.join(" | "));

            let snippet = if result.snippet.is_empty() {
                truncate_chars(&note.content, FALLBACK_SNIPPET_CHARS)
            } else {
                result.snippet.as_str()
            };
            parts.push(format!("> {}\n", snippet));
        }
    }

    if !sessions.is_empty() {
        parts.push(format!(
            "\n### Sessions ({} {})\n",
            sessions.len(),
            match_label(sessions.len())
        ));
        for result in sessions {
            let session = &result.item;
            let slug = if session.slug.is_empty() {
                String::new()
            } else {
                format!(" {}", session.slug)
            };
            parts.push(format!(
                "**{}{}** ({}, {} turns)",
                format_date(session.started_at),
                slug,
                format_duration(session.duration_s),
                session.total_turns()
            ));

            let mut meta = Vec::new();
            if !session.git_branch.is_empty() {
                meta.push(format!("Branch: `{}`", session.git_branch));
            }
            meta.push(format!("ID: `{}`", session.short_id()));
            parts.push(meta.join(" | "));

            let snippet = if result.snippet.is_empty() {
                truncate_chars(&session.summary, FALLBACK_SNIPPET_CHARS)
            } else {
                result.snippet.as_str()
            };
            if !snippet.is_empty() {
                parts.push(format!("> {}\n", snippet));
            }
        }
    }

    parts.join("\n")
}

fn turn_clock(timestamp: &str) -> String {
    if timestamp.is_empty() {
        return String::new();
    }
    DateTime::parse_from_rfc3339(timestamp)
        .map(|ts| format!(" ({})", ts.format("%H:%M")))
        .unwrap_or_default()
}

/// A session transcript; `max_turns == 0` shows every turn
pub fn format_transcript(
    session: &Session,
    turns: &[TranscriptTurn],
    max_turns: usize,
    max_text_chars: usize,
) -> String {
    let mut parts = Vec::new();

    if session.slug.is_empty() {
        parts.push("## Session".to_string());
    } else {
        parts.push(format!("## Session: {}", session.slug));
    }

    let mut meta = vec![format!("Date: {}", format_date(session.started_at))];
    if session.duration_s > 0 {
        meta.push(format!("Duration: {}", format_duration(session.duration_s)));
    }
    if !session.git_branch.is_empty() {
        meta.push(format!("Branch: {}", session.git_branch));
    }
    parts.push(meta.join(" | "));
    parts.push(format!("ID: {}", session.session_id));
    parts.push("\n---\n".to_string());

    let shown = if max_turns > 0 {
        &turns[..turns.len().min(max_turns)]
    } else {
        turns
    };

    for turn in shown {
        parts.push(format!("**{}**{}:", turn.role, turn_clock(&turn.timestamp)));
        if !turn.text.is_empty() {
            if turn.text.chars().count() > max_text_chars {
                parts.push(format!(
                    "{}\n...(truncated)",
                    truncate_chars(&turn.text, max_text_chars)
                ));
            } else {
                parts.push(turn.text.clone());
            }
        }
        for call in &turn.tool_calls {
            parts.push(format!("- {}", call));
        }
        parts.push(String::new());
    }

    parts.push("---".to_string());
    let mut footer = vec![format!("*{} turns", turns.len())];
    if !session.model.is_empty() {
        footer.push(format!("Model: {}", session.model));
    }
    parts.push(format!("{}*", footer.join(" | ")));

    parts.join("\n")
}

pub fn format_forget(title: &str, relevance: f64) -> String {
    if relevance == 0.0 {
        format!("Forgot \"{}\" (relevance: 0.0, hidden from search)", title)
    } else {
        format!("Forgot \"{}\" (relevance: {:.1})", title, relevance)
    }
}

fn counts_line(counts: &[(String, usize)]) -> String {
    counts
        .iter()
        .map(|(name, count)| format!("{} ({})", name, count))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn note_age_line(note: &Note, now: DateTime<Utc>) -> String {
    format!(
        "- {}{} - {}",
        note.title,
        category_suffix(&note.category),
        relative_time(note.updated_at, now)
    )
}

/// Knowledge base overview
pub fn format_status(report: &StatusReport, now: DateTime<Utc>) -> String {
    let mut parts = vec!["## Kraang Status\n".to_string()];

    parts.push(format!(
        "**Notes:** {} total ({} active, {} forgotten)",
        report.active_notes + report.forgotten_notes,
        report.active_notes,
        report.forgotten_notes
    ));
    let indexed = report
        .last_indexed
        .map(format_date)
        .unwrap_or_else(|| "never".to_string());
    parts.push(format!(
        "**Sessions indexed:** {} (last indexed: {})",
        report.session_count, indexed
    ));

    if !report.recent_notes.is_empty() {
        parts.push(format!("\n### Recent Notes ({} days)", report.recent_days));
        parts.extend(report.recent_notes.iter().map(|n| note_age_line(n, now)));
    }

    if !report.categories.is_empty() {
        parts.push("\n### Categories".to_string());
        parts.push(counts_line(&report.categories));
    }

    if !report.tags.is_empty() {
        parts.push("\n### Tags".to_string());
        parts.push(counts_line(&report.tags));
    }

    if !report.stale_notes.is_empty() {
        parts.push(format!("\n### Stale (>{} days)", report.stale_days));
        parts.extend(report.stale_notes.iter().map(|n| note_age_line(n, now)));
    }

    parts.join("\n")
}

pub fn format_stale(items: &[StaleItem<Note>], days: i64) -> String {
    if items.is_empty() {
        return format!("No notes older than {} days.", days);
    }

    let mut parts = vec![format!("## Stale notes (>{} days)\n", days)];
    for stale in items {
        parts.push(format!(
            "- {}{} ({} days since update)",
            stale.item.title,
            category_suffix(&stale.item.category),
            stale.days_since_update
        ));
    }
    parts.join("\n")
}

/// Notes related to `title`
pub fn format_related(title: &str, results: &[ScoredResult<Note>]) -> String {
    if results.is_empty() {
        return format!("No notes related to \"{}\".", title);
    }

    let mut parts = vec![format!("## Related to \"{}\"\n", title)];
    for result in results {
        parts.push(format!(
            "- **{}**{} (score: {:.2})",
            result.item.title,
            category_suffix(&result.item.category),
            result.score
        ));
    }
    parts.join("\n")
}

pub fn format_digest(digest: &Digest<Note>) -> String {
    let mut parts = vec!["## Digest\n".to_string()];
    parts.push(format!(
        "**Notes:** {} total, {} forgotten, {} stale",
        digest.total_items, digest.forgotten_items, digest.stale_count
    ));

    parts.push("\n### Last 24 hours".to_string());
    if digest.recent.is_empty() {
        parts.push("Nothing new.".to_string());
    } else {
        parts.extend(
            digest
                .recent
                .iter()
                .map(|n| format!("- {}{}", n.title, category_suffix(&n.category))),
        );
    }

    if !digest.category_distribution.is_empty() {
        parts.push("\n### Categories".to_string());
        parts.push(counts_line(&digest.category_distribution));
    }
    if !digest.tag_distribution.is_empty() {
        parts.push("\n### Tags".to_string());
        parts.push(counts_line(&digest.tag_distribution));
    }

    parts.join("\n")
}

/// One line per note: title, category, relevance marker and age
pub fn format_note_list(notes: &[Note], now: DateTime<Utc>) -> String {
    if notes.is_empty() {
        return "No notes found.".to_string();
    }

    notes
        .iter()
        .map(|note| {
            let marker = if note.is_forgotten() {
                " [forgotten]".to_string()
            } else if note.relevance < 1.0 {
                format!(" [relevance {:.1}]", note.relevance)
            } else {
                String::new()
            };
            format!(
                "- {}{}{} - {}",
                note.title,
                category_suffix(&note.category),
                marker,
                relative_time(note.updated_at, now)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per session: date, short id, slug or summary, turns and duration
pub fn format_session_list(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No sessions found.".to_string();
    }

    sessions
        .iter()
        .map(|session| {
            let label = if session.slug.is_empty() {
                truncate_chars(&session.summary, 60).replace('\n', " ")
            } else {
                session.slug.clone()
            };
            format!(
                "{}  {}  {}  ({} turns, {})",
                format_date(session.started_at),
                session.short_id(),
                label,
                session.total_turns(),
                format_duration(session.duration_s)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

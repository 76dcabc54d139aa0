use std::collections::BTreeMap;

use engram_types::{Handoff, IdentityEntry};

/// Minimum statements sharing a theme before synthesis creates a note.
pub const THEME_MIN_MEMBERS: usize = 10;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "the", "to", "of", "in", "on", "for", "with", "is", "am", "are", "be",
    "being", "becoming", "more", "less", "my", "i", "me", "at", "as", "it", "that", "this",
    "toward", "towards", "about",
];

/// Statements grouped under a keyword-derived theme.
#[derive(Debug, Clone)]
pub struct ThemeBucket {
    pub theme: String,
    pub entries: Vec<IdentityEntry>,
}

/// Bucket becoming statements by their dominant keyword.
///
/// Each statement lands in exactly one bucket: the most frequent
/// non-stopword keyword across the whole thread that appears in it, so
/// related statements converge on the same theme. Buckets come back sorted
/// by size, largest first; only buckets with at least
/// [`THEME_MIN_MEMBERS`] members are returned.
pub fn bucket_becoming_statements(entries: &[IdentityEntry]) -> Vec<ThemeBucket> {
    // global keyword frequency across the thread
    let mut frequency: BTreeMap<String, usize> = BTreeMap::new();
    for entry in entries {
        for word in keywords(&entry.becoming) {
            *frequency.entry(word).or_insert(0) += 1;
        }
    }

    let mut buckets: BTreeMap<String, Vec<IdentityEntry>> = BTreeMap::new();
    for entry in entries {
        let dominant = keywords(&entry.becoming)
            .into_iter()
            .max_by_key(|w| (frequency.get(w).copied().unwrap_or(0), std::cmp::Reverse(w.clone())));
        if let Some(theme) = dominant {
            buckets.entry(theme).or_default().push(entry.clone());
        }
    }

    let mut result: Vec<ThemeBucket> = buckets
        .into_iter()
        .filter(|(_, members)| members.len() >= THEME_MIN_MEMBERS)
        .map(|(theme, entries)| ThemeBucket { theme, entries })
        .collect();

    result.sort_by(|a, b| {
        b.entries
            .len()
            .cmp(&a.entries.len())
            .then_with(|| a.theme.cmp(&b.theme))
    });
    result
}

fn keywords(text: &str) -> Vec<String> {
    let mut words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect();
    words.dedup();
    words
}

/// Assemble the wake-up greeting narrative. Read-only composition; the
/// counts come from the caller so this stays a pure function.
pub fn compose_wake_up_greeting(
    with_whom: &str,
    last_handoff: Option<&Handoff>,
    identity_thread: &[IdentityEntry],
    recent_decisions_count: usize,
    knowledge_notes_count: usize,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(format!("You are waking up to work with {}.", with_whom));

    if let Some(handoff) = last_handoff {
        let recap = handoff
            .story
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&handoff.experienced);
        let recap = handoff
            .compact
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(recap);
        if !recap.is_empty() {
            parts.push(format!("Last time: {}", recap));
        }
        if !handoff.remember.is_empty() {
            parts.push(format!("You asked yourself to remember: {}", handoff.remember));
        }
    }

    let becoming: Vec<&str> = identity_thread
        .iter()
        .take(3)
        .map(|e| e.becoming.as_str())
        .collect();
    if !becoming.is_empty() {
        parts.push(format!("You have been becoming: {}.", becoming.join("; ")));
    }

    parts.push(format!(
        "{} active decisions and {} knowledge notes are in scope.",
        recent_decisions_count, knowledge_notes_count
    ));

    parts.join(" ")
}

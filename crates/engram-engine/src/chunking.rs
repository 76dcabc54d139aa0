use engram_types::EventContent;

/// Derive the searchable chunk text for an event payload.
///
/// `None` means the event produces no chunk (tool calls and artifact
/// registrations are not retrieval units; empty text yields nothing).
pub fn extract_chunk_text(content: &EventContent) -> Option<String> {
    let text = match content {
        EventContent::Message { text } => text.clone(),
        EventContent::ToolResult { excerpt_text, .. } => excerpt_text.clone(),
        EventContent::Decision {
            decision,
            rationale,
        } => {
            let mut parts = vec![decision.clone()];
            parts.extend(rationale.iter().cloned());
            parts.join(" ")
        }
        EventContent::TaskUpdate { task, detail, .. } => match detail {
            Some(detail) => format!("{} {}", task, detail),
            None => task.clone(),
        },
        EventContent::ToolCall { .. } | EventContent::Artifact { .. } => return None,
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Truncate to at most `max_bytes` UTF-8 bytes, aligned to a character
/// boundary so the result is always valid UTF-8.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

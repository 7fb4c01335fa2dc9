//! Defensive JSON recovery for model responses.
//!
//! Models wrap JSON in prose, markdown fences, or stray backticks. The
//! ladder tries progressively looser extractions and stops at the first
//! that parses; a candidate that fails to parse falls through to the next
//! rung rather than aborting.

/// Recover a JSON value from a free-form model response.
pub fn recover_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(candidate) = fenced(trimmed, "```json") {
        if let Ok(value) = serde_json::from_str(candidate.trim()) {
            return Some(value);
        }
    }

    if let Some(candidate) = fenced(trimmed, "```") {
        if let Ok(value) = serde_json::from_str(candidate.trim()) {
            return Some(value);
        }
    }

    if trimmed.starts_with('`') && trimmed.ends_with('`') {
        let candidate = trimmed.trim_matches('`').trim();
        if let Ok(value) = serde_json::from_str(candidate) {
            return Some(value);
        }
    }

    if let Some(candidate) = balanced_object(trimmed) {
        if let Ok(value) = serde_json::from_str(candidate) {
            return Some(value);
        }
    }

    None
}

/// Content between an opening fence marker and the next closing ```.
fn fenced<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}

/// The first balanced `{...}` region, honoring string literals and escapes.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

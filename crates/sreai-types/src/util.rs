//! Utility functions for safe string handling.

/// Find the largest byte index <= `i` that is on a UTF-8 char boundary.
fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut pos = i;
    // Walk backwards while we're at a continuation byte (0b10xxxxxx)
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Find the smallest byte index >= `i` that is on a UTF-8 char boundary.
fn ceil_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut pos = i;
    while pos < s.len() && !s.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Truncate `&str` to at most `max_bytes`, never splitting a UTF-8 codepoint.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        s
    } else {
        &s[..floor_char_boundary(s, max_bytes)]
    }
}

/// Truncate to at most `max_bytes`, replacing the cut-off end with `...`.
pub fn truncate_with_ellipsis(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let keep = max_bytes.saturating_sub(3);
    format!("{}...", truncate_str(s, keep))
}

/// The last `max_bytes` of `s` (never splitting a codepoint), whitespace-trimmed.
pub fn tail_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s.trim();
    }
    let start = ceil_char_boundary(s, s.len() - max_bytes);
    s[start..].trim()
}

/// Mask a possibly sensitive value for debug output: `ab:yz`, or `***` when short.
pub fn mask_value(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = input.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}:{tail}")
}

/// Compact single-line JSON rendering of a value.
pub fn compact_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

//! String helpers for log previews.

/// Largest byte index <= `i` on a UTF-8 char boundary.
fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut pos = i;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Truncate `&str` to at most `max_bytes`, never splitting a UTF-8 codepoint.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    &s[..floor_char_boundary(s, max_bytes)]
}

/// Single-line preview of `s` for logging: newlines collapsed, cut at
/// `max_bytes` with a trailing `...` when anything was dropped.
pub fn log_preview(s: &str, max_bytes: usize) -> String {
    let flat = s.trim().replace(['\r', '\n'], " ");
    if flat.len() <= max_bytes {
        flat
    } else {
        format!("{}...", truncate_str(&flat, max_bytes))
    }
}

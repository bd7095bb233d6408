//! Helpers for sanitizing data before it enters logs, span attributes or
//! error messages.
//!
//! Upload paths point into user storage, and service error bodies can be
//! arbitrarily large, so neither goes into a span or `error_message` raw.

use std::path::Path;

/// Longest service response body kept in an error message.
pub const MAX_ERROR_BODY_LEN: usize = 512;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Lossily decodes a response body and cuts it to `max_chars` characters,
/// appending `…` when anything was dropped. Never splits a UTF-8 sequence.
pub fn truncate_body(body: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

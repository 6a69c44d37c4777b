//! Helpers for sanitizing untrusted job fields before they touch the
//! filesystem or tracing span attributes.
//!
//! Job titles come straight from the submitting application and must never
//! influence path construction beyond a cleaned display component.

use std::path::Path;

const MAX_TITLE_COMPONENT: usize = 50;

/// Reduces a document title to a filename-safe component: alphanumerics and
/// `._-` pass through, everything else becomes `_`, truncated to 50 chars.
/// An empty or all-garbage title yields `untitled`.
pub fn safe_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_ascii())
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TITLE_COMPONENT)
        .collect();

    if cleaned.trim_matches(['_', '.']).is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields — reveals file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

//! Small utility helpers shared across the crate.

use std::env;
use std::path::PathBuf;

/// Return the first non-empty environment variable from `keys`, or `None`.
pub fn env_first(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = env::var(key) {
            if !value.trim().is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// Normalise a URL by prepending `http://` or `https://` when the scheme is missing.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim().trim_end_matches('/');
    if raw.contains("://") {
        return raw.to_string();
    }
    let scheme = if raw.starts_with("localhost") || raw.starts_with("127.") || raw.contains(":80") {
        "http"
    } else {
        "https"
    };
    format!("{scheme}://{raw}")
}

/// Shorten `text` to at most `max` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Expand a leading `~/` in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    match (raw.strip_prefix("~/"), env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(raw),
    }
}

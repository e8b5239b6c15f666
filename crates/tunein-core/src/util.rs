//! Small helpers shared by the config, remote and reflection modules.

/// Longest slice of a server response echoed back in an error message
const MAX_ERROR_TEXT: usize = 180;

/// Trim optional text, treating blank values as absent.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Project URL without surrounding whitespace or trailing slashes.
///
/// `None` unless the value is an http(s) URL.
pub fn supabase_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    is_http_url(trimmed).then(|| trimmed.to_string())
}

/// Server text shortened for inclusion in an error.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(MAX_ERROR_TEXT).collect()
}

/// Current Unix timestamp in seconds.
pub fn unix_timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}

//! Small helpers shared by the config, remote and queue modules.

/// Longest remote error body kept in an error message.
const MAX_ERROR_CHARS: usize = 180;

/// Trim optional text, treating blank values as unset.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Whether an environment flag value means "on" (`1`, `true`, `yes`, `on`).
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Cut a remote response body down to something fit for a log line.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(MAX_ERROR_CHARS).collect()
}

/// Current Unix timestamp in milliseconds, the unit of every stored timestamp.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

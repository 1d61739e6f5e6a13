//! Traffic logging for LLM API calls
//!
//! Emits truncated request/response summaries under the `llm::traffic`
//! target so message content never lands in the log verbatim.

use tracing::{debug, warn};

/// Maximum characters to log for content
const MAX_CONTENT_LOG_CHARS: usize = 200;

/// Truncate a string for logging, adding ellipsis if truncated
pub fn truncate_for_log(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}... ({} chars total)", truncated, char_count)
    }
}

fn summarize(value: &impl serde::Serialize) -> String {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "<serialization error>".to_string());
    truncate_for_log(&json, MAX_CONTENT_LOG_CHARS)
}

pub fn log_stream_start(model: &str, request: &impl serde::Serialize) {
    debug!(target: "llm::traffic", model, request = %summarize(request), "STREAM_START");
}

pub fn log_stream_end(model: &str, fragments: usize, chars: usize) {
    debug!(target: "llm::traffic", model, fragments, chars, "STREAM_END");
}

pub fn log_error(model: &str, error: &str) {
    warn!(target: "llm::traffic", model, error = %truncate_for_log(error, MAX_CONTENT_LOG_CHARS), "ERROR");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_strings_are_untouched() {
        assert_eq!(truncate_for_log("hello", 10), "hello");
    }

    #[test]
    fn test_long_strings_report_total_length() {
        let long = "é".repeat(15);
        let truncated = truncate_for_log(&long, 10);
        assert!(truncated.starts_with(&"é".repeat(10)));
        assert!(truncated.ends_with("(15 chars total)"));
    }
}

//! Shared utilities for storage implementations

use crate::error::{Error, Result};

/// Current unix timestamp in milliseconds
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn check_content(content: &str) -> Result<()> {
    if content.is_empty() {
        return Err(Error::Storage("message content must not be empty".into()));
    }
    Ok(())
}

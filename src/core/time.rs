//! Timestamp helpers for change-log file names.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
pub fn now_epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// `<prefix>-<millis>.xml`, the change-log entry name for one workflow run.
pub fn log_file_name(prefix: &str) -> String {
    format!("{}-{}.xml", prefix, now_epoch_millis())
}

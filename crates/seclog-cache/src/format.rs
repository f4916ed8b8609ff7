//! Turning events into cache lines.
//!
//! Line shape: `2023-10-23T16:47:20.670Z [INFO] [webview-Checkout] message`

use chrono::{DateTime, Utc};
use serde::Deserialize;

use seclog_core::{LogLevel, LogRecord};

/// Source label for events captured from the embedded web content
pub const WEBVIEW_SOURCE: &str = "webview";

/// Source label for events raised inside the host process
pub const NATIVE_SOURCE: &str = "native";

pub const DEFAULT_TAG: &str = "NO_TAG";
pub const MISSING_MESSAGE: &str = "<MISSING_MESSAGE>";

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// UTC ISO-8601 with milliseconds, or `None` if out of range.
pub fn format_timestamp(millis: i64) -> Option<String> {
    let time = DateTime::<Utc>::from_timestamp_millis(millis)?;
    Some(time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

/// Render `record` as one line (no trailing newline).
///
/// An out-of-range timestamp is replaced by the current time.
pub fn format_line(record: &LogRecord) -> String {
    let timestamp = format_timestamp(record.timestamp_ms)
        .or_else(|| format_timestamp(now_millis()))
        .unwrap_or_default();
    format!(
        "{timestamp} [{}] [{}-{}] {}",
        record.level.as_str(),
        record.source,
        record.tag,
        record.message
    )
}

/// An event as posted by web content. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebEvent {
    pub timestamp: Option<i64>,
    pub level: Option<i64>,
    pub tag: Option<String>,
    pub message: Option<String>,
}

impl WebEvent {
    /// Parse one entry of a capture batch. Non-objects and wrongly typed
    /// fields yield `None`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        Self::deserialize(value).ok()
    }

    /// Fill in defaults. `None` if the timestamp cannot be represented.
    pub fn into_record(self, now_ms: i64) -> Option<LogRecord> {
        let timestamp_ms = self.timestamp.unwrap_or(now_ms);
        format_timestamp(timestamp_ms)?;

        Some(LogRecord {
            timestamp_ms,
            level: self
                .level
                .map(LogLevel::from_clamped)
                .unwrap_or(LogLevel::Debug),
            source: WEBVIEW_SOURCE.to_string(),
            tag: self.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            message: self.message.unwrap_or_else(|| MISSING_MESSAGE.to_string()),
        })
    }
}

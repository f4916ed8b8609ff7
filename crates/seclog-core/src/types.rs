use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Severity of a log event.
///
/// Numeric values mirror `android.util.Log` so host callers can pass plain
/// integers across the bridge.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub enum LogLevel {
    #[default]
    Verbose = 2,
    Debug = 3,
    Info = 4,
    Warn = 5,
    Error = 6,
    Fatal = 7,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Verbose,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    /// Map any integer onto a level: values above FATAL become FATAL,
    /// anything else unknown becomes VERBOSE.
    pub fn from_clamped(value: i64) -> Self {
        match LogLevel::try_from(value) {
            Ok(level) => level,
            Err(_) if value > LogLevel::Fatal as i64 => LogLevel::Fatal,
            Err(_) => LogLevel::Verbose,
        }
    }

    /// Label written into formatted log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Verbose => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

impl TryFrom<i64> for LogLevel {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, String> {
        LogLevel::ALL
            .into_iter()
            .find(|level| *level as i64 == value)
            .ok_or_else(|| format!("unknown log level {value} (expected 2..=7)"))
    }
}

impl From<LogLevel> for i64 {
    fn from(level: LogLevel) -> Self {
        level as i64
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured event headed for the cache as a single text line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub level: LogLevel,
    /// Producer of the event, e.g. "webview" or "native"
    pub source: String,
    pub tag: String,
    pub message: String,
}

/// Size and count bounds for the chunk directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheLimits {
    pub max_file_size_bytes: u64,
    pub max_total_cache_size_bytes: u64,
    pub max_file_count: u64,
}

impl CacheLimits {
    pub const FILE_SIZE_RANGE: RangeInclusive<u64> = 1_000..=4_000_000;
    pub const TOTAL_SIZE_RANGE: RangeInclusive<u64> = 1_000..=64_000_000;
    pub const FILE_COUNT_RANGE: RangeInclusive<u64> = 1..=100;
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 2_000_000,
            max_total_cache_size_bytes: 7_000_000,
            max_file_count: 20,
        }
    }
}

/// Partial update from the host. Every field is optional and validated on
/// its own; signed integers so negative input can be reported rather than
/// rejected at parse time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigureOptions {
    pub min_level: Option<i64>,
    pub max_file_size_bytes: Option<i64>,
    pub max_total_cache_size_bytes: Option<i64>,
    pub max_file_count: Option<i64>,
}

/// Why a single option was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureOptionError {
    /// Key from `ConfigureOptions` (camelCase, as the host spells it)
    pub option: String,
    pub error: String,
}

/// Response to a configure call. `success` is false if any option failed
/// or the new settings could not be persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub errors: Vec<ConfigureOptionError>,
}

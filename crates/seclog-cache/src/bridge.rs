//! Host-facing surface of the cache.
//!
//! These are the calls a host app routes from its embedded web content:
//! capture a batch of events, capture raw text, clear, fetch the blob, and
//! configure.

use std::sync::Arc;

use seclog_core::config::SeclogConfig;
use seclog_core::{ConfigureOptions, ConfigureResult, SeclogResult};

use crate::cache::LogCache;
use crate::format::{format_line, now_millis, WebEvent};

#[derive(Clone)]
pub struct SecureLogger {
    cache: Arc<LogCache>,
}

impl SecureLogger {
    pub fn new(cache: Arc<LogCache>) -> Self {
        Self { cache }
    }

    pub fn open(config: &SeclogConfig) -> Self {
        Self::new(Arc::new(LogCache::open(config)))
    }

    pub fn cache(&self) -> &Arc<LogCache> {
        &self.cache
    }

    /// Append each well-formed event as one line. Malformed entries and
    /// events below the minimum level are skipped. Returns the number of
    /// lines written.
    pub fn capture(&self, events: &[serde_json::Value]) -> SeclogResult<usize> {
        let min_level = self.cache.min_level();
        let now = now_millis();
        let mut written = 0;

        for (index, value) in events.iter().enumerate() {
            let Some(record) = WebEvent::from_value(value).and_then(|e| e.into_record(now)) else {
                tracing::debug!(index, "skipping malformed log event");
                continue;
            };
            if record.level < min_level {
                continue;
            }
            self.cache.append_line(&format_line(&record))?;
            written += 1;
        }
        Ok(written)
    }

    pub fn capture_text(&self, text: &str) -> SeclogResult<()> {
        self.cache.append(text)
    }

    pub fn clear_cache(&self) -> SeclogResult<bool> {
        self.cache.clear()
    }

    pub fn get_cache_blob(&self) -> SeclogResult<Vec<u8>> {
        self.cache.assemble_blob()
    }

    pub fn configure(&self, options: &ConfigureOptions) -> ConfigureResult {
        self.cache.configure(options)
    }
}

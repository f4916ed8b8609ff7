//! Feeding native log output into the cache.
//!
//! [`CacheLayer`] forwards `tracing` events from the host process;
//! [`install_panic_hook`] records panics as FATAL lines before the
//! previous hook runs.

use std::cell::Cell;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use seclog_core::{LogLevel, LogRecord, SeclogResult};

use crate::cache::{lock_held_by_current_thread, LogCache};
use crate::format::{format_line, now_millis, NATIVE_SOURCE};

/// Anything that accepts structured log records.
pub trait LogSink: Send + Sync {
    fn accept(&self, record: &LogRecord) -> SeclogResult<()>;
}

impl LogSink for LogCache {
    /// Drops records below the configured minimum level, and records raised
    /// while this thread is already inside the cache.
    fn accept(&self, record: &LogRecord) -> SeclogResult<()> {
        if lock_held_by_current_thread() || record.level < self.min_level() {
            return Ok(());
        }
        self.append_line(&format_line(record))
    }
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn accept(&self, record: &LogRecord) -> SeclogResult<()> {
        (**self).accept(record)
    }
}

/// Targets whose events are never forwarded: the cache's own diagnostics
/// would otherwise be written back into the cache while it holds its lock.
const IGNORED_TARGETS: &[&str] = &["seclog_cache", "seclog_crypto", "seclog_secrets"];

thread_local! {
    static FORWARDING: Cell<bool> = const { Cell::new(false) };
}

/// Clears the re-entrancy flag on scope exit.
struct ForwardGuard;

impl ForwardGuard {
    fn enter() -> Option<Self> {
        FORWARDING.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(ForwardGuard)
            }
        })
    }
}

impl Drop for ForwardGuard {
    fn drop(&mut self) {
        FORWARDING.with(|flag| flag.set(false));
    }
}

/// `tracing` layer that copies events into a [`LogSink`].
pub struct CacheLayer<S> {
    sink: S,
}

impl<S: LogSink> CacheLayer<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

fn level_of(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Verbose,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        _ => LogLevel::Error,
    }
}

/// Collects `message` plus `key=value` pairs for the other fields.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

impl<S, Sub> Layer<Sub> for CacheLayer<S>
where
    S: LogSink + 'static,
    Sub: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, Sub>) {
        let meta = event.metadata();
        if IGNORED_TARGETS
            .iter()
            .any(|target| meta.target().starts_with(target))
        {
            return;
        }
        let Some(_guard) = ForwardGuard::enter() else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord {
            timestamp_ms: now_millis(),
            level: level_of(meta.level()),
            source: NATIVE_SOURCE.to_string(),
            tag: meta.target().to_string(),
            message: visitor.finish(),
        };
        if let Err(e) = self.sink.accept(&record) {
            tracing::warn!("dropping native log record: {e}");
        }
    }
}

/// Record panics into `sink` as FATAL lines, then run the previous hook.
pub fn install_panic_hook(sink: Arc<dyn LogSink>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let what = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".to_string());
        let message = match info.location() {
            Some(location) => format!(
                "panicked at {}:{}: {what}",
                location.file(),
                location.line()
            ),
            None => format!("panicked: {what}"),
        };
        let thread = std::thread::current();

        let record = LogRecord {
            timestamp_ms: now_millis(),
            level: LogLevel::Fatal,
            source: NATIVE_SOURCE.to_string(),
            tag: thread.name().unwrap_or("panic").to_string(),
            message,
        };
        let _ = sink.accept(&record);
        previous(info);
    }));
}

//! seclog-cache: encrypted rotating log cache
//!
//! Appends go to one active chunk, sealed with its own key. When the chunk
//! reaches `max_file_size_bytes` it is closed and a new one started; the
//! oldest chunks are evicted to stay within `max_file_count` and
//! `max_total_cache_size_bytes`. `assemble_blob` decrypts everything back
//! into one chronological blob, marking chunks that fail.

pub mod bridge;
pub mod cache;
pub mod format;
pub mod keys;
pub mod names;
pub mod rotation;
pub mod settings;
pub mod sink;
pub mod store;

pub use bridge::SecureLogger;
pub use cache::LogCache;
pub use keys::KeyProvider;
pub use settings::{ConfigStore, Settings};
pub use sink::{install_panic_hook, CacheLayer, LogSink};
pub use store::{ChunkInfo, ChunkStore};

//! The log cache: one active encrypted chunk, rotated and evicted under a
//! single lock, reassembled into one blob on demand.

use std::cell::Cell;
use std::io::Read;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use seclog_core::config::{expand_tilde, SeclogConfig};
use seclog_core::{
    CacheLimits, ConfigureOptions, ConfigureResult, LogLevel, SeclogError, SeclogResult,
};
use seclog_crypto::{EncryptedReader, EncryptedWriter, KdfParams};

use crate::format::now_millis;
use crate::keys::KeyProvider;
use crate::names::{parse_chunk_name, NameGenerator};
use crate::rotation::{self, ActiveChunk};
use crate::settings::{ConfigStore, Settings};
use crate::store::{ChunkInfo, ChunkStore};

/// Inline diagnostic written into the blob in place of an unreadable chunk.
pub fn decrypt_failure_marker(name: &str, size: u64, error: &str) -> String {
    format!(
        "\n\n[[CHUNK DECRYPT FAILURE - {name} ({size} bytes)]]\n<<<<<<<<<<<<<<<<\n{error}\n>>>>>>>>>>>>>>>>\n\n"
    )
}

thread_local! {
    static HOLDS_LOCK: Cell<bool> = const { Cell::new(false) };
}

/// True while the current thread is inside a cache operation. Log records
/// raised from there (by a dependency, say) must not re-enter the cache.
pub(crate) fn lock_held_by_current_thread() -> bool {
    HOLDS_LOCK.with(Cell::get)
}

/// Lock guard that tracks ownership in [`HOLDS_LOCK`].
struct Locked<'a> {
    guard: MutexGuard<'a, Inner>,
}

impl Deref for Locked<'_> {
    type Target = Inner;

    fn deref(&self) -> &Inner {
        &self.guard
    }
}

impl DerefMut for Locked<'_> {
    fn deref_mut(&mut self) -> &mut Inner {
        &mut self.guard
    }
}

impl Drop for Locked<'_> {
    fn drop(&mut self) {
        HOLDS_LOCK.with(|held| held.set(false));
    }
}

/// Encrypted, size-bounded log cache over one directory.
///
/// Shared between threads via `Arc`. Every operation except `destroy`
/// takes the same lock.
pub struct LogCache {
    inner: Mutex<Inner>,
    destroyed: AtomicBool,
}

struct Inner {
    store: ChunkStore,
    settings: ConfigStore,
    keys: KeyProvider,
    /// Seeded from the newest chunk on disk at the first rotation
    names: Option<NameGenerator>,
    active: Option<ActiveChunk>,
}

impl LogCache {
    pub fn new(dir: impl Into<PathBuf>, settings: ConfigStore, keys: KeyProvider) -> Self {
        Self {
            inner: Mutex::new(Inner {
                store: ChunkStore::new(dir),
                settings,
                keys,
                names: None,
                active: None,
            }),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Build a cache from the TOML config: chunk dir, persisted settings,
    /// secret backend, and KDF salt.
    pub fn open(config: &SeclogConfig) -> Self {
        let defaults = Settings {
            limits: config.cache.limits(),
            min_level: config.cache.min_level,
        };
        let settings = ConfigStore::load(expand_tilde(&config.cache.settings_file), defaults);
        let keys = KeyProvider::from_store(
            seclog_secrets::store_from_config(&config.secrets),
            KdfParams::with_salt(&config.crypto.kdf_salt),
        );
        Self::new(expand_tilde(&config.cache.dir), settings, keys)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Locked<'_> {
        // chunk state is re-read from the directory on every rotation
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        HOLDS_LOCK.with(|held| held.set(true));
        Locked { guard }
    }

    /// Append `text` as-is. Empty text and a destroyed cache are no-ops.
    pub fn append(&self, text: &str) -> SeclogResult<()> {
        if text.is_empty() || self.is_destroyed() {
            return Ok(());
        }
        let mut inner = self.lock();
        if self.is_destroyed() {
            return Ok(());
        }
        inner.append(text.as_bytes())
    }

    /// Append `text` followed by a newline.
    pub fn append_line(&self, text: &str) -> SeclogResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.append(&format!("{text}\n"))
    }

    /// Delete every chunk. `Ok(false)` if the cache was destroyed.
    pub fn clear(&self) -> SeclogResult<bool> {
        if self.is_destroyed() {
            return Ok(false);
        }
        let mut inner = self.lock();
        if self.is_destroyed() {
            return Ok(false);
        }
        inner.close_active();
        inner.store.reset()?;
        tracing::info!(dir = %inner.store.dir().display(), "cleared log cache");
        Ok(true)
    }

    /// Decrypt and concatenate every chunk, oldest first, after evicting
    /// whatever the current limits no longer allow.
    ///
    /// A chunk that fails to open or decrypt contributes whatever it
    /// authenticated before the failure, followed by a failure marker.
    pub fn assemble_blob(&self) -> SeclogResult<Vec<u8>> {
        if self.is_destroyed() {
            return Err(SeclogError::Destroyed);
        }
        let mut inner = self.lock();
        if self.is_destroyed() {
            return Err(SeclogError::Destroyed);
        }

        let limits = inner.settings.limits();
        inner.trim(&limits)?;
        inner.close_active();
        let chunks = inner.store.list()?;

        let mut blob = Vec::new();
        for chunk in &chunks {
            if let Err(e) = inner.decrypt_into(&chunk.name, &mut blob) {
                tracing::warn!(chunk = %chunk.name, size = chunk.size, "chunk decrypt failed: {e}");
                blob.extend_from_slice(
                    decrypt_failure_marker(&chunk.name, chunk.size, &e.to_string()).as_bytes(),
                );
            }
        }
        tracing::debug!(chunks = chunks.len(), bytes = blob.len(), "assembled cache blob");
        Ok(blob)
    }

    /// Close the active chunk and refuse all further work. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut inner = self.lock();
        inner.close_active();
        tracing::debug!("log cache destroyed");
    }

    /// Validate and apply `options`, persisting whatever was accepted.
    pub fn configure(&self, options: &ConfigureOptions) -> ConfigureResult {
        if self.is_destroyed() {
            return ConfigureResult {
                success: false,
                error: Some(SeclogError::Destroyed.to_string()),
                errors: Vec::new(),
            };
        }
        let mut inner = self.lock();

        let before = inner.settings.limits();
        let errors = inner.settings.apply(options);
        let error = match inner.settings.persist() {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("failed to save cache settings: {e}");
                Some(e.to_string())
            }
        };

        let limits = inner.settings.limits();
        if limits != before {
            if let Err(e) = inner.trim(&limits) {
                tracing::warn!("eviction after reconfigure failed: {e}");
            }
        }

        tracing::info!(
            min_level = %inner.settings.min_level(),
            max_file_size_bytes = limits.max_file_size_bytes,
            max_total_cache_size_bytes = limits.max_total_cache_size_bytes,
            max_file_count = limits.max_file_count,
            rejected = errors.len(),
            "cache configured"
        );

        ConfigureResult {
            success: errors.is_empty() && error.is_none(),
            error,
            errors,
        }
    }

    /// Chunks currently on disk, oldest first.
    pub fn chunks(&self) -> SeclogResult<Vec<ChunkInfo>> {
        Ok(self.lock().store.list()?)
    }

    pub fn limits(&self) -> CacheLimits {
        self.lock().settings.limits()
    }

    pub fn min_level(&self) -> LogLevel {
        self.lock().settings.min_level()
    }

    /// Name of the chunk open for appends, if any.
    pub fn active_chunk(&self) -> Option<String> {
        self.lock().active.as_ref().map(|a| a.name().to_string())
    }
}

impl Drop for LogCache {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl Inner {
    fn append(&mut self, bytes: &[u8]) -> SeclogResult<()> {
        let limits = self.settings.limits();
        if !rotation::is_writable(self.active.as_ref(), &self.store, &limits) {
            self.rotate(&limits)?;
        }

        let active = self
            .active
            .as_mut()
            .ok_or_else(|| SeclogError::Cipher("no active chunk after rotation".into()))?;
        if active.writer_mut().write(bytes) != bytes.len() {
            return Err(SeclogError::CipherFinalize(format!(
                "chunk {} rejected the write",
                active.name()
            )));
        }
        active.writer_mut().flush()?;

        let chunks = self.store.list()?;
        let total: u64 = chunks.iter().map(|c| c.size).sum();
        if total > limits.max_total_cache_size_bytes {
            let active_name = self.active.as_ref().map(|a| a.name());
            rotation::evict(&chunks, active_name, &limits, 0, &self.store).log();
        }
        Ok(())
    }

    /// Close the current chunk, make room, and open a new one.
    fn rotate(&mut self, limits: &CacheLimits) -> SeclogResult<()> {
        self.close_active();
        self.store.ensure_dir()?;

        let chunks = self.store.list()?;
        rotation::evict(&chunks, None, limits, 1, &self.store).log();

        let newest = chunks.last().and_then(|c| parse_chunk_name(&c.name));
        let name = self
            .names
            .get_or_insert_with(|| NameGenerator::seeded(newest))
            .next_name(now_millis().max(0) as u64);

        if self.store.size_of(&name).is_some() {
            tracing::warn!(chunk = %name, "replacing existing file with new chunk name");
            self.store.remove(&name)?;
        }

        let key = self.keys.chunk_key(&name)?;
        let writer = EncryptedWriter::create(&self.store.path_of(&name), &key)?;
        tracing::debug!(chunk = %name, "opened new chunk");
        self.active = Some(ActiveChunk::new(name, writer));
        Ok(())
    }

    /// Evict sealed chunks until the current limits hold.
    fn trim(&mut self, limits: &CacheLimits) -> SeclogResult<()> {
        let chunks = self.store.list()?;
        let active_name = self.active.as_ref().map(|a| a.name());
        rotation::evict(&chunks, active_name, limits, 0, &self.store).log();
        Ok(())
    }

    fn close_active(&mut self) {
        if let Some(active) = self.active.take() {
            let name = active.name().to_string();
            if let Err(e) = active.close() {
                tracing::warn!(chunk = %name, "closing active chunk: {e}");
            }
        }
    }

    fn decrypt_into(&mut self, name: &str, out: &mut Vec<u8>) -> SeclogResult<()> {
        let key = self.keys.chunk_key(name)?;
        let mut reader = EncryptedReader::open(&self.store.path_of(name), &key)?;
        reader.read_to_end(out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seclog_crypto::InstallSecret;

    fn cache_in(dir: &std::path::Path, limits: CacheLimits) -> LogCache {
        let settings = ConfigStore::in_memory(Settings {
            limits,
            min_level: LogLevel::Verbose,
        });
        let secret = InstallSecret::from_bytes(vec![0x42; 32]).unwrap();
        LogCache::new(dir, settings, KeyProvider::from_secret(secret, KdfParams::default()))
    }

    #[test]
    fn lines_roundtrip_without_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), CacheLimits::default());

        cache.append_line("one").unwrap();
        cache.append_line("two").unwrap();
        cache.append("three").unwrap();

        assert_eq!(cache.assemble_blob().unwrap(), b"one\ntwo\nthree");
        assert_eq!(cache.chunks().unwrap().len(), 1);
    }

    #[test]
    fn empty_appends_create_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir.path().join("logs"), CacheLimits::default());

        cache.append("").unwrap();
        cache.append_line("").unwrap();

        assert!(cache.chunks().unwrap().is_empty());
        assert!(cache.assemble_blob().unwrap().is_empty());
    }

    #[test]
    fn assembly_closes_active_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), CacheLimits::default());

        cache.append("before").unwrap();
        assert!(cache.active_chunk().is_some());
        cache.assemble_blob().unwrap();
        assert!(cache.active_chunk().is_none());

        cache.append(" after").unwrap();
        assert_eq!(cache.chunks().unwrap().len(), 2);
        assert_eq!(cache.assemble_blob().unwrap(), b"before after");
    }

    #[test]
    fn marker_format() {
        assert_eq!(
            decrypt_failure_marker("SLOG-V1-000000000000001.log", 42, "boom"),
            "\n\n[[CHUNK DECRYPT FAILURE - SLOG-V1-000000000000001.log (42 bytes)]]\n<<<<<<<<<<<<<<<<\nboom\n>>>>>>>>>>>>>>>>\n\n"
        );
    }

    #[test]
    fn destroy_is_idempotent_and_final() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), CacheLimits::default());
        cache.append("kept").unwrap();

        cache.destroy();
        cache.destroy();

        assert!(cache.is_destroyed());
        assert!(cache.active_chunk().is_none());
        cache.append("ignored").unwrap();
        assert!(!cache.clear().unwrap());
        assert!(matches!(cache.assemble_blob(), Err(SeclogError::Destroyed)));
        assert!(!cache.configure(&ConfigureOptions::default()).success);

        // files stay on disk
        assert_eq!(cache.chunks().unwrap().len(), 1);
    }

    #[test]
    fn failed_flush_surfaces_then_next_append_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), CacheLimits::default());

        cache.append("first ").unwrap();
        let first = cache.active_chunk().unwrap();
        {
            let mut inner = cache.lock();
            let active = inner.active.as_mut().unwrap();
            active.writer_mut().reopen_read_only().unwrap();
        }

        let err = cache.append("lost ").unwrap_err();
        assert!(matches!(err, SeclogError::CipherFinalize(_)));
        assert_eq!(cache.active_chunk().as_deref(), Some(first.as_str()));

        cache.append("second").unwrap();
        let second = cache.active_chunk().unwrap();
        assert_ne!(second, first);
        assert_eq!(cache.chunks().unwrap().len(), 2);
        assert_eq!(cache.assemble_blob().unwrap(), b"first second");
    }

    #[test]
    fn assembly_evicts_chunks_over_the_limits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(
            dir.path(),
            CacheLimits {
                max_file_size_bytes: 1_000,
                ..Default::default()
            },
        );
        for fill in ["a", "b", "c"] {
            cache.append(&fill.repeat(1_200)).unwrap();
        }

        // limits changed behind the cache's back, as by an older settings file
        cache.lock().settings = ConfigStore::in_memory(Settings {
            limits: CacheLimits {
                max_file_size_bytes: 1_000,
                max_file_count: 2,
                ..Default::default()
            },
            min_level: LogLevel::Verbose,
        });

        let blob = cache.assemble_blob().unwrap();
        assert_eq!(blob, format!("{}{}", "b".repeat(1_200), "c".repeat(1_200)).as_bytes());
        assert_eq!(cache.chunks().unwrap().len(), 2);
    }

    #[test]
    fn shrinking_limits_evicts_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(
            dir.path(),
            CacheLimits {
                max_file_size_bytes: 1_000,
                ..Default::default()
            },
        );
        for _ in 0..5 {
            cache.append(&"x".repeat(1_200)).unwrap();
        }
        assert_eq!(cache.chunks().unwrap().len(), 5);

        let result = cache.configure(&ConfigureOptions {
            max_file_count: Some(2),
            ..Default::default()
        });
        assert!(result.success);
        assert_eq!(cache.chunks().unwrap().len(), 2);
    }
}

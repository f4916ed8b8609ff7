//! When to start a new chunk, and which old chunks to delete.
//!
//! Eviction runs in a fixed order: the count bound first (leaving room for
//! a chunk about to be created), then the total size bound. Candidates are
//! taken oldest first and the active chunk is never one of them.

use std::io;

use seclog_core::{CacheLimits, SeclogResult};
use seclog_crypto::EncryptedWriter;

use crate::store::{ChunkInfo, ChunkStore};

/// Attempts per chunk before eviction gives up on it
pub const MAX_DELETE_ATTEMPTS: u32 = 3;

/// The chunk currently open for appends.
pub struct ActiveChunk {
    name: String,
    writer: EncryptedWriter,
}

impl ActiveChunk {
    pub fn new(name: String, writer: EncryptedWriter) -> Self {
        Self { name, writer }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn writer_mut(&mut self) -> &mut EncryptedWriter {
        &mut self.writer
    }

    pub fn close(mut self) -> SeclogResult<()> {
        self.writer.close()
    }
}

/// True if the next append can go to `active` without rotating.
pub fn is_writable(active: Option<&ActiveChunk>, store: &ChunkStore, limits: &CacheLimits) -> bool {
    let Some(active) = active else {
        return false;
    };
    if !active.writer.is_writable() {
        return false;
    }
    match store.size_of(&active.name) {
        Some(size) => size < limits.max_file_size_bytes,
        None => false,
    }
}

/// Deletes a chunk by name. Implemented by [`ChunkStore`]; tests substitute
/// files that refuse to go away.
pub trait ChunkRemover {
    fn remove_chunk(&self, name: &str) -> io::Result<()>;
}

impl ChunkRemover for ChunkStore {
    fn remove_chunk(&self, name: &str) -> io::Result<()> {
        self.remove(name)
    }
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub evicted: Vec<String>,
    /// Chunks that survived every delete attempt; they still count toward
    /// the limits.
    pub stuck: Vec<String>,
}

impl EvictionReport {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.stuck.is_empty()
    }

    pub fn log(&self) {
        if !self.evicted.is_empty() {
            tracing::debug!(count = self.evicted.len(), chunks = ?self.evicted, "evicted chunks");
        }
        for name in &self.stuck {
            tracing::warn!(chunk = %name, "could not evict chunk after {MAX_DELETE_ATTEMPTS} attempts");
        }
    }
}

/// Delete the oldest chunks until both bounds hold.
///
/// `chunks` must be sorted oldest first (as [`ChunkStore::list`] returns
/// them). `reserve` extra slots are counted against `max_file_count`, so
/// passing 1 before a rotation keeps the count within bounds once the new
/// chunk exists.
pub fn evict(
    chunks: &[ChunkInfo],
    active: Option<&str>,
    limits: &CacheLimits,
    reserve: u64,
    remover: &dyn ChunkRemover,
) -> EvictionReport {
    let mut report = EvictionReport::default();
    let mut count = chunks.len() as u64 + reserve;
    let mut total: u64 = chunks.iter().map(|c| c.size).sum();

    let mut candidates = chunks
        .iter()
        .filter(|chunk| Some(chunk.name.as_str()) != active);

    while count > limits.max_file_count {
        let Some(chunk) = candidates.next() else {
            break;
        };
        if remove_with_retry(remover, &chunk.name) {
            count -= 1;
            total = total.saturating_sub(chunk.size);
            report.evicted.push(chunk.name.clone());
        } else {
            report.stuck.push(chunk.name.clone());
        }
    }

    while total > limits.max_total_cache_size_bytes {
        let Some(chunk) = candidates.next() else {
            break;
        };
        if remove_with_retry(remover, &chunk.name) {
            total = total.saturating_sub(chunk.size);
            report.evicted.push(chunk.name.clone());
        } else {
            report.stuck.push(chunk.name.clone());
        }
    }

    report
}

fn remove_with_retry(remover: &dyn ChunkRemover, name: &str) -> bool {
    for attempt in 1..=MAX_DELETE_ATTEMPTS {
        match remover.remove_chunk(name) {
            Ok(()) => return true,
            Err(e) => {
                tracing::debug!(chunk = %name, attempt, "delete failed: {e}");
            }
        }
    }
    false
}

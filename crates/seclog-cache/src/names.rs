//! Chunk file naming.
//!
//! `SLOG-V1-001698079640670.log`: prefix, format version, creation time in
//! milliseconds zero-padded to 15 digits, extension. Zero padding makes
//! lexicographic order match chronological order.

/// Leading tag of every chunk file name
pub const CHUNK_PREFIX: &str = "SLOG-";

/// Chunk format version embedded in the name
pub const FORMAT_VERSION: &str = "V1";

pub const CHUNK_EXTENSION: &str = ".log";

const MILLIS_WIDTH: usize = 15;

/// Name of the chunk created at `millis`.
pub fn chunk_name(millis: u64) -> String {
    format!("{CHUNK_PREFIX}{FORMAT_VERSION}-{millis:0width$}{CHUNK_EXTENSION}", width = MILLIS_WIDTH)
}

/// Creation time encoded in `name`, or `None` if `name` is not a chunk of
/// the current format version.
pub fn parse_chunk_name(name: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(CHUNK_PREFIX)?
        .strip_prefix(FORMAT_VERSION)?
        .strip_prefix('-')?
        .strip_suffix(CHUNK_EXTENSION)?;
    if digits.len() != MILLIS_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn is_chunk_name(name: &str) -> bool {
    parse_chunk_name(name).is_some()
}

/// Issues strictly increasing chunk timestamps.
///
/// Each name uses `max(now, last + 1)`, so two rotations within the same
/// millisecond (or across a backwards clock step) still sort after every
/// chunk already on disk.
#[derive(Debug, Clone, Default)]
pub struct NameGenerator {
    last: Option<u64>,
}

impl NameGenerator {
    /// Start after `newest`, typically the newest chunk found on disk.
    pub fn seeded(newest: Option<u64>) -> Self {
        Self { last: newest }
    }

    pub fn next_name(&mut self, now_ms: u64) -> String {
        let millis = match self.last {
            Some(last) => now_ms.max(last.saturating_add(1)),
            None => now_ms,
        };
        self.last = Some(millis);
        chunk_name(millis)
    }
}

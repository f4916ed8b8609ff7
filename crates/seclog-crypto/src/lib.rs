//! seclog-crypto: at-rest encryption for log cache chunks
//!
//! Every chunk file is sealed under its own key:
//! ```text
//! Install Secret (256-bit random, stored once per install)
//!   └── Chunk Key (HKDF-SHA256, info = "seclog-chunk:" || chunk file name)
//!       └── Record AEAD: XChaCha20-Poly1305 (nonce = file IV || record_idx, AAD = record_idx)
//! ```
//!
//! Chunks are written append-only as a stream of authenticated records, so
//! a reader recovers every record that was flushed before a crash.

pub mod codec;
pub mod kdf;

pub use codec::{EncryptedReader, EncryptedWriter, MAX_RECORD_PLAINTEXT};
pub use kdf::{derive_chunk_key, ChunkKey, InstallSecret, KdfParams, KeyDeriver};

/// Size of a chunk key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the random IV header at the start of each chunk file
pub const IV_SIZE: usize = 16;

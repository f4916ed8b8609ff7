//! Key derivation: install secret + chunk name → per-chunk key (HKDF-SHA256)
//!
//! ```text
//! HKDF-SHA256(
//!     salt = params.salt,
//!     ikm  = install secret,
//!     info = "seclog-chunk:" || chunk_name
//! )
//! ```
//!
//! The install secret is already 256 bits of OS randomness, so no password
//! stretching is applied. Deterministic for a given (secret, name, salt), so a
//! sealed chunk can be reopened from its file name alone.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use seclog_core::{SeclogError, SeclogResult};

use crate::KEY_SIZE;

/// Domain prefix of the HKDF info string
const CHUNK_INFO_PREFIX: &[u8] = b"seclog-chunk:";

/// Shortest install secret accepted (128-bit)
pub const MIN_SECRET_LEN: usize = 16;

/// The per-install secret every chunk key is derived from.
///
/// Zeroized on drop to prevent secrets lingering in memory.
pub struct InstallSecret {
    bytes: Vec<u8>,
}

impl InstallSecret {
    pub fn from_bytes(mut bytes: Vec<u8>) -> SeclogResult<Self> {
        if bytes.len() < MIN_SECRET_LEN {
            let len = bytes.len();
            bytes.zeroize();
            return Err(SeclogError::KeyUnavailable(format!(
                "install secret too short: {len} bytes (minimum {MIN_SECRET_LEN})"
            )));
        }
        Ok(Self { bytes })
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for InstallSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for InstallSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A 256-bit key for exactly one chunk file. Zeroized on drop.
#[derive(Clone)]
pub struct ChunkKey {
    bytes: [u8; KEY_SIZE],
}

impl ChunkKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ChunkKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// KDF parameters
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// HKDF salt (not secret, but must stay stable for existing chunks)
    pub salt: Vec<u8>,
}

impl KdfParams {
    pub fn with_salt(salt: impl AsRef<[u8]>) -> Self {
        Self {
            salt: salt.as_ref().to_vec(),
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::with_salt("seclog-chunk-salt-v1")
    }
}

/// Derive the key for the chunk file named `chunk_name`.
pub fn derive_chunk_key(
    secret: &InstallSecret,
    chunk_name: &str,
    params: &KdfParams,
) -> SeclogResult<ChunkKey> {
    let hkdf = Hkdf::<Sha256>::new(Some(params.salt.as_slice()), secret.as_bytes());

    let mut info = Vec::with_capacity(CHUNK_INFO_PREFIX.len() + chunk_name.len());
    info.extend_from_slice(CHUNK_INFO_PREFIX);
    info.extend_from_slice(chunk_name.as_bytes());

    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(&info, &mut okm)
        .map_err(|e| SeclogError::KeyUnavailable(format!("HKDF expand failed: {e}")))?;
    Ok(ChunkKey::from_bytes(okm))
}

/// An install secret bound to its KDF parameters.
#[derive(Debug)]
pub struct KeyDeriver {
    secret: InstallSecret,
    params: KdfParams,
}

impl KeyDeriver {
    pub fn new(secret: InstallSecret, params: KdfParams) -> Self {
        Self { secret, params }
    }

    pub fn chunk_key(&self, chunk_name: &str) -> SeclogResult<ChunkKey> {
        derive_chunk_key(&self.secret, chunk_name, &self.params)
    }
}

//! Streaming encryption for one chunk file.
//!
//! Chunk file format (binary):
//! ```text
//! [16 bytes: random IV]
//! repeated records:
//!   [4 bytes: sealed length, big-endian][ciphertext][16 bytes: Poly1305 tag]
//! ```
//! Record `i` is sealed with XChaCha20-Poly1305 under the chunk key,
//! nonce = IV || i (8 bytes, big-endian), AAD = i (8 bytes, big-endian).
//!
//! Every `flush()` seals what has been written since the previous flush, so a
//! process that dies between appends loses nothing that was flushed. The
//! record index in nonce and AAD rejects reordered or dropped records.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

use seclog_core::{SeclogError, SeclogResult};

use crate::kdf::ChunkKey;
use crate::{IV_SIZE, NONCE_SIZE, TAG_SIZE};

/// Size of the per-record length prefix
const LEN_SIZE: usize = 4;

/// Largest plaintext sealed into a single record; bigger flushes are split.
pub const MAX_RECORD_PLAINTEXT: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Closed,
}

/// Build the nonce for record `index`: IV || index (BE)
fn record_nonce(iv: &[u8; IV_SIZE], index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..IV_SIZE].copy_from_slice(iv);
    nonce[IV_SIZE..].copy_from_slice(&index.to_be_bytes());
    nonce
}

/// Encrypting writer for the active chunk.
pub struct EncryptedWriter {
    path: PathBuf,
    file: File,
    cipher: XChaCha20Poly1305,
    iv: [u8; IV_SIZE],
    record_index: u64,
    pending: Vec<u8>,
    state: StreamState,
    poisoned: bool,
}

impl EncryptedWriter {
    /// Create (truncating) `path` and write a fresh random IV header.
    pub fn create(path: &Path, key: &ChunkKey) -> SeclogResult<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        file.write_all(&iv)?;
        file.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
            iv,
            record_index: 0,
            pending: Vec::new(),
            state: StreamState::Open,
            poisoned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True while the writer accepts bytes: open and not poisoned.
    pub fn is_writable(&self) -> bool {
        self.state == StreamState::Open && !self.poisoned
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Buffer `buf` for the next record. Returns the number of bytes
    /// accepted, which is 0 once the writer is closed or poisoned.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        if !self.is_writable() {
            return 0;
        }
        self.pending.extend_from_slice(buf);
        buf.len()
    }

    /// Seal all buffered bytes and write them through to the file.
    pub fn flush(&mut self) -> SeclogResult<()> {
        if !self.is_writable() || self.pending.is_empty() {
            return Ok(());
        }

        let mut pending = std::mem::take(&mut self.pending);
        let result = self.seal_and_write(&pending);
        pending.zeroize();

        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    /// Flush the final record, sync, and close. Closing twice is a no-op.
    pub fn close(&mut self) -> SeclogResult<()> {
        if self.state == StreamState::Closed {
            return Ok(());
        }
        let flushed = self.flush();
        self.state = StreamState::Closed;
        flushed?;
        self.file.sync_all()?;
        Ok(())
    }

    fn seal_and_write(&mut self, plaintext: &[u8]) -> SeclogResult<()> {
        let mut frames = Vec::with_capacity(plaintext.len() + LEN_SIZE + TAG_SIZE);

        for piece in plaintext.chunks(MAX_RECORD_PLAINTEXT) {
            let index = self.record_index;
            let nonce_bytes = record_nonce(&self.iv, index);
            let aad = index.to_be_bytes();
            let sealed = self
                .cipher
                .encrypt(
                    XNonce::from_slice(&nonce_bytes),
                    Payload {
                        msg: piece,
                        aad: &aad,
                    },
                )
                .map_err(|e| {
                    SeclogError::CipherFinalize(format!(
                        "sealing record {index} of {}: {e}",
                        self.path.display()
                    ))
                })?;

            let len = u32::try_from(sealed.len()).map_err(|_| {
                SeclogError::CipherFinalize(format!("record {index} too large"))
            })?;
            frames.extend_from_slice(&len.to_be_bytes());
            frames.extend_from_slice(&sealed);
            self.record_index += 1;
        }

        // one write per flush keeps a torn record confined to the tail
        self.file
            .write_all(&frames)
            .and_then(|()| self.file.flush())
            .map_err(|e| {
                SeclogError::CipherFinalize(format!(
                    "writing record {} of {}: {e}",
                    self.record_index - 1,
                    self.path.display()
                ))
            })
    }

    /// Swap the file handle for a read-only one, so the next flush fails.
    #[cfg(any(test, feature = "test-util"))]
    pub fn reopen_read_only(&mut self) -> io::Result<()> {
        self.file = File::open(&self.path)?;
        Ok(())
    }
}

impl Drop for EncryptedWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), "closing chunk writer on drop: {e}");
        }
    }
}

/// Decrypting reader over a sealed chunk.
///
/// The first malformed, truncated, or unauthentic record returns an error;
/// every read after that returns 0 bytes.
pub struct EncryptedReader {
    file: BufReader<File>,
    cipher: XChaCha20Poly1305,
    iv: [u8; IV_SIZE],
    record_index: u64,
    plain: Vec<u8>,
    pos: usize,
    poisoned: bool,
}

impl EncryptedReader {
    /// Open `path` and consume the IV header. A missing or short header is
    /// a hard error.
    pub fn open(path: &Path, key: &ChunkKey) -> SeclogResult<Self> {
        let mut file = BufReader::new(File::open(path)?);

        let mut iv = [0u8; IV_SIZE];
        file.read_exact(&mut iv).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => SeclogError::Cipher(format!(
                "truncated header in {} (expected {IV_SIZE}-byte IV)",
                path.display()
            )),
            _ => SeclogError::Io(e),
        })?;

        Ok(Self {
            file,
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
            iv,
            record_index: 0,
            plain: Vec::new(),
            pos: 0,
            poisoned: false,
        })
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Load the next record into `plain`. `Ok(false)` at a clean end of file.
    fn next_record(&mut self) -> io::Result<bool> {
        let index = self.record_index;

        let mut len_buf = [0u8; LEN_SIZE];
        if !read_exact_or_eof(&mut self.file, &mut len_buf)? {
            return Ok(false);
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if !(TAG_SIZE..=MAX_RECORD_PLAINTEXT + TAG_SIZE).contains(&len) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("record {index}: implausible sealed length {len}"),
            ));
        }

        let mut sealed = vec![0u8; len];
        self.file.read_exact(&mut sealed).map_err(|e| {
            io::Error::new(e.kind(), format!("record {index}: truncated ({e})"))
        })?;

        let nonce_bytes = record_nonce(&self.iv, index);
        let aad = index.to_be_bytes();
        let plaintext = self
            .cipher
            .decrypt(
                XNonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("record {index}: decryption failed (wrong key or corrupted data)"),
                )
            })?;

        self.plain.zeroize();
        self.plain = plaintext;
        self.pos = 0;
        self.record_index += 1;
        Ok(true)
    }
}

impl Read for EncryptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.plain.len() {
                let n = buf.len().min(self.plain.len() - self.pos);
                buf[..n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.poisoned {
                return Ok(0);
            }
            match self.next_record() {
                Ok(true) => continue,
                Ok(false) => return Ok(0),
                Err(e) => {
                    self.poisoned = true;
                    self.plain.zeroize();
                    self.plain.clear();
                    self.pos = 0;
                    return Err(e);
                }
            }
        }
    }
}

impl Drop for EncryptedReader {
    fn drop(&mut self) {
        self.plain.zeroize();
    }
}

/// Fill `buf` completely, or return `Ok(false)` if the reader is already at
/// end of file. A partial fill is an `UnexpectedEof` error.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated record header",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

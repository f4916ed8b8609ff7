//! File backend for the install secret, for hosts without a usable keychain.
//!
//! The secret is written with mode 0600 via temp file + rename.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::io::Write;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

use crate::SecretStore;

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecretStore for FileStore {
    fn load(&self) -> Result<Option<SecretString>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading secret file: {}", self.path.display()))?;
        let secret = SecretString::from(content.trim().to_string());
        content.zeroize();
        if secret.expose_secret().is_empty() {
            return Ok(None);
        }
        Ok(Some(secret))
    }

    fn store(&self, secret: &SecretString) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating dir: {}", parent.display()))?;
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = open_private(&tmp)
            .with_context(|| format!("creating secret tmp: {}", tmp.display()))?;
        file.write_all(secret.expose_secret().as_bytes())
            .and_then(|_| file.sync_all())
            .with_context(|| format!("writing secret tmp: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming secret file: {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), "stored install secret in file");
        Ok(())
    }

    fn source(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

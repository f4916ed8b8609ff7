//! seclog-secrets: storage for the per-install secret
//!
//! The install secret is a random 256-bit value generated once per
//! installation. Every chunk key is derived from it, so losing it makes the
//! existing cache unreadable.
//!
//! Backends:
//!   - `keychain`: platform keychain via `keyring`
//!   - `file`: a 0600 file, for headless hosts

pub mod file;
pub mod install;
pub mod keychain;

pub use file::FileStore;
pub use install::{load_or_create, InstallSecretMaterial, INSTALL_SECRET_ENV};
pub use keychain::KeychainStore;

use anyhow::Result;
use secrecy::SecretString;
use seclog_core::config::{expand_tilde, SecretBackend, SecretsConfig};

/// A single-slot secret store.
pub trait SecretStore: Send + Sync {
    /// Returns `None` when nothing has been stored yet.
    fn load(&self) -> Result<Option<SecretString>>;

    fn store(&self, secret: &SecretString) -> Result<()>;

    /// Human-readable location, for logs and errors
    fn source(&self) -> String;
}

/// Build the store selected in the config.
pub fn store_from_config(config: &SecretsConfig) -> Box<dyn SecretStore> {
    match config.backend {
        SecretBackend::Keychain => Box::new(KeychainStore::new(config.service.clone())),
        SecretBackend::File => Box::new(FileStore::new(expand_tilde(&config.secret_file))),
    }
}

//! Platform keychain backend for the install secret.
//!
//! Uses the `keyring` crate for cross-platform access:
//! - macOS / iOS: Keychain Services
//! - Linux: GNOME Keyring / Secret Service (D-Bus)
//! - Windows: Credential Manager (DPAPI)

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::SecretStore;

/// Keychain entry holding the install secret
pub const INSTALL_SECRET_ENTRY: &str = "install-secret";

/// One keychain entry addressed by service + entry name.
#[derive(Debug, Clone)]
pub struct KeychainStore {
    service: String,
    entry: String,
}

impl KeychainStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            entry: INSTALL_SECRET_ENTRY.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.entry)
            .map_err(|e| anyhow::anyhow!("keychain entry creation: {e}"))
    }
}

impl SecretStore for KeychainStore {
    fn load(&self) -> Result<Option<SecretString>> {
        match self.entry()?.get_password() {
            Ok(mut password) => {
                let secret = SecretString::from(password.clone());
                password.zeroize();
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("keychain get for '{}': {e}", self.entry)),
        }
    }

    fn store(&self, secret: &SecretString) -> Result<()> {
        self.entry()?
            .set_password(secret.expose_secret())
            .map_err(|e| anyhow::anyhow!("keychain store for '{}': {e}", self.entry))?;
        tracing::debug!(service = %self.service, "stored install secret in platform keychain");
        Ok(())
    }

    fn source(&self) -> String {
        format!("keychain:{}/{}", self.service, self.entry)
    }
}

/// Check if the platform keychain is reachable.
pub fn is_available(service: &str) -> bool {
    keyring::Entry::new(service, "__seclog_availability__").is_ok()
}

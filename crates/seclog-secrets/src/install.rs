//! Install secret discovery chain

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::SecretStore;

/// Environment override holding a literal base64 install secret
pub const INSTALL_SECRET_ENV: &str = "SECLOG_INSTALL_SECRET";

/// Raw length of a generated install secret (256-bit)
pub const INSTALL_SECRET_LEN: usize = 32;

/// A resolved install secret (base64 text) and where it came from.
pub struct InstallSecretMaterial {
    pub secret: SecretString,
    pub source: String,
}

impl std::fmt::Debug for InstallSecretMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallSecretMaterial")
            .field("secret", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

/// Resolve the install secret using the priority chain:
///   1. $SECLOG_INSTALL_SECRET  (literal base64, provisioning and CI)
///   2. the configured store    (keychain or file)
///   3. generate a fresh secret and persist it in the configured store
pub fn load_or_create(store: &dyn SecretStore) -> Result<InstallSecretMaterial> {
    if let Ok(value) = std::env::var(INSTALL_SECRET_ENV) {
        if !value.is_empty() {
            return Ok(InstallSecretMaterial {
                secret: SecretString::from(value),
                source: format!("{INSTALL_SECRET_ENV} (env)"),
            });
        }
    }

    if let Some(secret) = store
        .load()
        .with_context(|| format!("loading install secret from {}", store.source()))?
    {
        return Ok(InstallSecretMaterial {
            secret,
            source: store.source(),
        });
    }

    let secret = generate();
    store
        .store(&secret)
        .with_context(|| format!("persisting new install secret to {}", store.source()))?;
    tracing::info!(source = %store.source(), "generated new install secret");

    Ok(InstallSecretMaterial {
        secret,
        source: store.source(),
    })
}

/// Generate a random 256-bit secret, base64 encoded.
pub fn generate() -> SecretString {
    let mut bytes = [0u8; INSTALL_SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = B64.encode(bytes);
    bytes.zeroize();
    SecretString::from(encoded)
}

/// Decode a base64 install secret into raw bytes.
pub fn decode(secret: &SecretString) -> Result<Vec<u8>> {
    B64.decode(secret.expose_secret().trim())
        .map_err(|e| anyhow::anyhow!("install secret is not valid base64: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileStore;

    #[test]
    fn generated_secret_decodes_to_32_bytes() {
        let secret = generate();
        assert_eq!(decode(&secret).unwrap().len(), INSTALL_SECRET_LEN);
    }

    #[test]
    fn generated_secrets_differ() {
        let a = generate();
        let b = generate();
        assert_ne!(a.expose_secret(), b.expose_secret());
    }

    #[test]
    fn create_once_then_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("secret"));

        let first = load_or_create(&store).unwrap();
        let second = load_or_create(&store).unwrap();

        if std::env::var(INSTALL_SECRET_ENV).is_err() {
            assert!(store.path().exists());
            assert_eq!(first.source, store.source());
        }
        assert_eq!(first.secret.expose_secret(), second.secret.expose_secret());
    }

    #[test]
    fn unwritable_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let store = FileStore::new(blocker.join("secret"));

        if std::env::var(INSTALL_SECRET_ENV).is_err() {
            assert!(load_or_create(&store).is_err());
        }
    }
}

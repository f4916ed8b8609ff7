//! Lazily resolved chunk keys.
//!
//! The install secret is looked up (or created) the first time a chunk is
//! opened, then kept for the life of the cache.

use seclog_core::{SeclogError, SeclogResult};
use seclog_crypto::{ChunkKey, InstallSecret, KdfParams, KeyDeriver};
use seclog_secrets::SecretStore;

pub struct KeyProvider {
    store: Option<Box<dyn SecretStore>>,
    params: KdfParams,
    deriver: Option<KeyDeriver>,
}

impl KeyProvider {
    /// Resolve the install secret from `store` on first use.
    pub fn from_store(store: Box<dyn SecretStore>, params: KdfParams) -> Self {
        Self {
            store: Some(store),
            params,
            deriver: None,
        }
    }

    /// Use an already known install secret.
    pub fn from_secret(secret: InstallSecret, params: KdfParams) -> Self {
        Self {
            store: None,
            params: params.clone(),
            deriver: Some(KeyDeriver::new(secret, params)),
        }
    }

    pub fn chunk_key(&mut self, chunk_name: &str) -> SeclogResult<ChunkKey> {
        let deriver = match self.deriver.take() {
            Some(deriver) => deriver,
            None => self.resolve()?,
        };
        let key = deriver.chunk_key(chunk_name);
        self.deriver = Some(deriver);
        key
    }

    fn resolve(&self) -> SeclogResult<KeyDeriver> {
        let store = self.store.as_deref().ok_or_else(|| {
            SeclogError::KeyUnavailable("no install secret store configured".into())
        })?;

        let material = seclog_secrets::load_or_create(store)
            .map_err(|e| SeclogError::KeyUnavailable(format!("{e:#}")))?;
        let bytes = seclog_secrets::install::decode(&material.secret).map_err(|e| {
            SeclogError::KeyUnavailable(format!("{} ({})", e, material.source))
        })?;
        let secret = InstallSecret::from_bytes(bytes)?;

        tracing::debug!(source = %material.source, "resolved install secret");
        Ok(KeyDeriver::new(secret, self.params.clone()))
    }
}

impl std::fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyProvider")
            .field("store", &self.store.as_ref().map(|s| s.source()))
            .field("resolved", &self.deriver.is_some())
            .finish()
    }
}

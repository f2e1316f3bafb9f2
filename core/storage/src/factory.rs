//! Adapter factory with a per-config client cache.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use snapstore_common::{Error, Result};

use crate::adapter::StorageAdapter;
use crate::config::{
    ProviderConfigId, ProviderCredentials, ProviderKind, StorageProviderConfig,
    CURRENT_ADAPTER_VERSION,
};
use crate::bucket::BucketAdapter;

struct CachedAdapter {
    fingerprint: String,
    adapter: Arc<dyn StorageAdapter>,
}

/// Builds adapters from provider configs and caches one per config id.
///
/// A cached adapter is reused only while the config's connection settings and
/// credentials are unchanged; anything else rebuilds it.
#[derive(Default)]
pub struct AdapterFactory {
    cache: RwLock<HashMap<ProviderConfigId, CachedAdapter>>,
}

impl AdapterFactory {
    /// Create a factory with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the adapter for `config`, building and caching it on first use.
    ///
    /// # Errors
    /// - `UnsupportedProviderType` for an unknown `type` (nothing is cached)
    /// - `InvalidInput` for disabled or newer-version configs, an empty
    ///   bucket, or incomplete credentials
    pub async fn adapter_for(
        &self,
        config: &StorageProviderConfig,
        credentials: &ProviderCredentials,
    ) -> Result<Arc<dyn StorageAdapter>> {
        let kind = check_config(config, credentials)?;
        let fingerprint = fingerprint(kind, config, credentials);

        if let Some(cached) = self.cache.read().await.get(&config.id) {
            if cached.fingerprint == fingerprint {
                debug!(provider = %config.id, "Adapter cache hit");
                return Ok(cached.adapter.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have rebuilt it while we waited for the lock.
        if let Some(cached) = cache.get(&config.id) {
            if cached.fingerprint == fingerprint {
                return Ok(cached.adapter.clone());
            }
        }

        let adapter = construct(kind, config, credentials)?;
        let replaced = cache
            .insert(
                config.id.clone(),
                CachedAdapter {
                    fingerprint,
                    adapter: adapter.clone(),
                },
            )
            .is_some();
        info!(provider = %config.id, backend = %kind, replaced, "Adapter built");
        Ok(adapter)
    }

    /// Build a fresh adapter without touching the cache.
    ///
    /// # Errors
    /// Same as `adapter_for`.
    pub fn build(
        &self,
        config: &StorageProviderConfig,
        credentials: &ProviderCredentials,
    ) -> Result<Arc<dyn StorageAdapter>> {
        let kind = check_config(config, credentials)?;
        construct(kind, config, credentials)
    }

    /// Drop the cached adapter for `id`. Returns whether one was cached.
    pub async fn evict(&self, id: &ProviderConfigId) -> bool {
        let removed = self.cache.write().await.remove(id).is_some();
        if removed {
            debug!(provider = %id, "Adapter evicted");
        }
        removed
    }

    /// Drop every cached adapter.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    /// Number of cached adapters.
    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Reject configs the factory must not build. The type is parsed first.
fn check_config(
    config: &StorageProviderConfig,
    credentials: &ProviderCredentials,
) -> Result<ProviderKind> {
    let kind = config.kind()?;
    if !config.is_enabled {
        return Err(Error::InvalidInput(format!(
            "Provider config '{}' is disabled",
            config.id
        )));
    }
    if config.adapter_version > CURRENT_ADAPTER_VERSION {
        return Err(Error::InvalidInput(format!(
            "Provider config '{}' needs adapter version {} (supported: {})",
            config.id, config.adapter_version, CURRENT_ADAPTER_VERSION
        )));
    }
    if config.bucket.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Provider config '{}' has no bucket",
            config.id
        )));
    }
    credentials.validate()?;
    Ok(kind)
}

fn construct(
    kind: ProviderKind,
    config: &StorageProviderConfig,
    credentials: &ProviderCredentials,
) -> Result<Arc<dyn StorageAdapter>> {
    let adapter = BucketAdapter::new(kind, config.client_settings(), credentials)?;
    Ok(Arc::new(adapter))
}

/// Digest of everything that shapes the underlying client.
fn fingerprint(
    kind: ProviderKind,
    config: &StorageProviderConfig,
    credentials: &ProviderCredentials,
) -> String {
    let mut hasher = Sha256::new();
    let fields = [
        kind.as_str(),
        config.bucket.as_str(),
        config.region.as_deref().unwrap_or(""),
        config.endpoint.as_deref().unwrap_or(""),
        match config.force_path_style {
            Some(true) => "path",
            Some(false) => "virtual",
            None => "",
        },
        credentials.access_key_id.as_str(),
        credentials.secret_access_key.expose(),
    ];
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

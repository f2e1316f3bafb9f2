//! In-memory storage adapter for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;
use uuid::Uuid;

use snapstore_common::{Error, ObjectPath, Result};

use crate::adapter::{
    encode_component, encode_key, split_metadata, ObjectMetadata, SignedUrl, SignedUrlOptions,
    StorageAdapter, CONTENT_TYPE_KEY,
};
use crate::config::ProviderKind;

/// In-memory object entry.
#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    metadata: ObjectMetadata,
}

/// In-memory storage adapter.
///
/// Useful for testing callers of the adapter contract. Every operation bumps
/// a call counter so tests can assert that no backend call happened. Signed
/// URLs are only available when a base URL is configured with
/// `with_signed_urls`.
pub struct MemoryAdapter {
    bucket: String,
    kind: ProviderKind,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    calls: AtomicUsize,
    signing_base: Option<Url>,
}

impl MemoryAdapter {
    /// Create a new empty adapter.
    pub fn new() -> Self {
        Self {
            bucket: "memory".to_string(),
            kind: ProviderKind::S3Compatible,
            objects: RwLock::new(BTreeMap::new()),
            calls: AtomicUsize::new(0),
            signing_base: None,
        }
    }

    /// Issue fake signed URLs under `base`.
    pub fn with_signed_urls(mut self, base: Url) -> Self {
        self.signing_base = Some(base);
        self
    }

    /// Report `kind` as the backend.
    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    /// Number of adapter operations performed so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn objects(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, StoredObject>>> {
        self.objects
            .read()
            .map_err(|_| Error::backend("Memory store lock poisoned"))
    }

    fn objects_mut(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, StoredObject>>> {
        self.objects
            .write()
            .map_err(|_| Error::backend("Memory store lock poisoned"))
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    fn backend(&self) -> ProviderKind {
        self.kind
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn write(
        &self,
        path: &ObjectPath,
        data: Bytes,
        metadata: Option<ObjectMetadata>,
    ) -> Result<()> {
        self.record_call();
        let (content_type, user) = split_metadata(metadata);

        let mut metadata: ObjectMetadata = user.into_iter().collect();
        metadata.insert(CONTENT_TYPE_KEY.to_string(), content_type);
        metadata.insert("content-length".to_string(), data.len().to_string());
        metadata.insert("etag".to_string(), format!("\"{}\"", Uuid::new_v4().simple()));
        metadata.insert("last-modified".to_string(), Utc::now().to_rfc2822());

        // Whole-object swap under the lock: concurrent writers never interleave.
        self.objects_mut()?
            .insert(path.as_str().to_string(), StoredObject { data, metadata });
        Ok(())
    }

    async fn read(&self, path: &ObjectPath) -> Result<Bytes> {
        self.record_call();
        self.objects()?
            .get(path.as_str())
            .map(|object| object.data.clone())
            .ok_or_else(|| Error::ObjectNotFound(path.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.record_call();
        Ok(self
            .objects()?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, path: &ObjectPath) -> Result<()> {
        self.record_call();
        self.objects_mut()?.remove(path.as_str());
        Ok(())
    }

    async fn exists(&self, path: &ObjectPath) -> Result<bool> {
        self.record_call();
        Ok(self.objects()?.contains_key(path.as_str()))
    }

    async fn get_metadata(&self, path: &ObjectPath) -> Result<Option<ObjectMetadata>> {
        self.record_call();
        Ok(self
            .objects()?
            .get(path.as_str())
            .map(|object| object.metadata.clone()))
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> Result<()> {
        self.record_call();
        let mut objects = self.objects_mut()?;
        let source = objects
            .get(from.as_str())
            .cloned()
            .ok_or_else(|| Error::ObjectNotFound(from.to_string()))?;
        objects.insert(to.as_str().to_string(), source);
        Ok(())
    }

    async fn signed_read_url(
        &self,
        path: &ObjectPath,
        options: &SignedUrlOptions,
    ) -> Result<SignedUrl> {
        self.record_call();
        let base = self.signing_base.as_ref().ok_or(Error::NotSupportedByBackend {
            backend: "memory",
            operation: "signed_read_url",
        })?;
        options.validate()?;

        let expires_at =
            Utc::now() + chrono::Duration::seconds(options.expires_in.as_secs() as i64);
        let mut query = vec![
            ("expires".to_string(), expires_at.timestamp().to_string()),
            ("signature".to_string(), Uuid::new_v4().simple().to_string()),
        ];
        if let Some(disposition) = &options.content_disposition {
            query.push(("response-content-disposition".to_string(), disposition.clone()));
        }
        let query = query
            .iter()
            .map(|(key, value)| format!("{}={}", key, encode_component(value)))
            .collect::<Vec<_>>()
            .join("&");

        let raw = format!(
            "{}/{}/{}?{}",
            base.as_str().trim_end_matches('/'),
            encode_component(&self.bucket),
            encode_key(path.as_str()),
            query
        );
        let url = Url::parse(&raw)
            .map_err(|e| Error::InvalidInput(format!("Invalid signing base: {}", e)))?;
        Ok(SignedUrl { url, expires_at })
    }
}

//! Storage adapter trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use url::Url;

use snapstore_common::{Error, ObjectPath, Result};

use crate::config::ProviderKind;

/// Payloads larger than this are uploaded in parts.
///
/// Identical for every backend so the strategy a write takes depends only on
/// the payload size.
pub const MULTIPART_THRESHOLD: usize = 5 * 1024 * 1024;

/// Size of each part of a multipart upload.
///
/// 5 MiB is the smallest part S3 and GCS accept for every part but the last.
pub const UPLOAD_PART_SIZE: usize = 5 * 1024 * 1024;

/// Longest validity a backend-native signed URL may have.
pub const MAX_SIGNED_URL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Metadata key carrying the object's content type.
pub const CONTENT_TYPE_KEY: &str = "content-type";

/// Content type used when the caller does not provide one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// RFC 3986 unreserved characters pass through; everything else is escaped.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// String tags attached to an object.
pub type ObjectMetadata = BTreeMap<String, String>;

/// How a payload is transferred to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// One atomic put request.
    Single,
    /// Multipart upload in `UPLOAD_PART_SIZE` slices.
    Chunked,
}

impl UploadStrategy {
    /// Pick the strategy for a payload of `len` bytes.
    pub fn for_len(len: usize) -> Self {
        if len > MULTIPART_THRESHOLD {
            Self::Chunked
        } else {
            Self::Single
        }
    }
}

/// Options for a pre-signed read URL.
#[derive(Debug, Clone)]
pub struct SignedUrlOptions {
    /// How long the URL stays valid.
    pub expires_in: Duration,
    /// Value the backend echoes as `Content-Disposition` when redeemed.
    pub content_disposition: Option<String>,
}

impl SignedUrlOptions {
    /// Options with the given lifetime and no disposition override.
    pub fn expiring_in(expires_in: Duration) -> Self {
        Self {
            expires_in,
            content_disposition: None,
        }
    }

    /// Force the browser to download the object under `filename`.
    pub fn with_attachment(mut self, filename: &str) -> Self {
        self.content_disposition = Some(attachment_disposition(filename));
        self
    }

    /// Check the lifetime against what backends accept.
    ///
    /// Backends count in whole seconds, so anything under one second is
    /// rejected rather than truncated to zero.
    pub fn validate(&self) -> Result<()> {
        if self.expires_in.as_secs() == 0 || self.expires_in > MAX_SIGNED_URL_TTL {
            return Err(Error::InvalidInput(format!(
                "Signed URL lifetime must be between 1s and {}s",
                MAX_SIGNED_URL_TTL.as_secs()
            )));
        }
        Ok(())
    }
}

/// A time-limited URL granting read access to one object.
///
/// The query string embeds credentials and a signature, so `Debug` prints
/// only the scheme, host and path.
#[derive(Clone)]
pub struct SignedUrl {
    /// URL to hand to the client.
    pub url: Url,
    /// Instant after which the backend rejects the URL.
    pub expires_at: DateTime<Utc>,
}

impl SignedUrl {
    /// URL without its query string, safe to log.
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.to_string()
    }
}

impl fmt::Debug for SignedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedUrl")
            .field("url", &format_args!("{}?[REDACTED]", self.redacted()))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Build an `attachment` Content-Disposition value for `filename`.
pub fn attachment_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// Percent-encode one URL component.
pub(crate) fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, UNRESERVED).to_string()
}

/// Percent-encode an object key segment by segment, keeping `/`.
pub(crate) fn encode_key(key: &str) -> String {
    key.split('/').map(encode_component).collect::<Vec<_>>().join("/")
}

/// Split caller metadata into the content type and user tags.
pub(crate) fn split_metadata(metadata: Option<ObjectMetadata>) -> (String, Vec<(String, String)>) {
    let mut content_type = DEFAULT_CONTENT_TYPE.to_string();
    let mut user = Vec::new();
    for (key, value) in metadata.unwrap_or_default() {
        let key = key.to_ascii_lowercase();
        if key == CONTENT_TYPE_KEY {
            content_type = value;
        } else {
            user.push((key, value));
        }
    }
    (content_type, user)
}

/// Storage adapter trait for different object-store backends.
///
/// Every backend implements the whole contract. Backend-specific failures are
/// classified before they leave the adapter: a missing object is always
/// `Error::ObjectNotFound`, anything else is `Error::Backend`.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Backend this adapter talks to.
    fn backend(&self) -> ProviderKind;

    /// Bucket the adapter is bound to.
    fn bucket(&self) -> &str;

    /// Store `data` at `path`, replacing any previous object.
    ///
    /// Payloads above `MULTIPART_THRESHOLD` are uploaded in parts; the
    /// strategy is invisible to readers. A `content-type` metadata entry sets
    /// the object's content type; other entries become user metadata.
    async fn write(
        &self,
        path: &ObjectPath,
        data: Bytes,
        metadata: Option<ObjectMetadata>,
    ) -> Result<()>;

    /// Read the complete object.
    ///
    /// # Errors
    /// - `ObjectNotFound` if nothing is stored at `path`
    async fn read(&self, path: &ObjectPath) -> Result<Bytes>;

    /// Keys of every object under `prefix`. Order is backend-defined.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove the object. Removing a missing object succeeds.
    async fn delete(&self, path: &ObjectPath) -> Result<()>;

    /// Check whether an object exists with a metadata-only request.
    async fn exists(&self, path: &ObjectPath) -> Result<bool>;

    /// Metadata of the object, or `None` when it is absent.
    async fn get_metadata(&self, path: &ObjectPath) -> Result<Option<ObjectMetadata>>;

    /// Server-side copy of `from` to `to`.
    ///
    /// # Errors
    /// - `ObjectNotFound` if `from` is absent
    async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> Result<()>;

    /// Pre-signed, read-only URL for `path`.
    async fn signed_read_url(
        &self,
        path: &ObjectPath,
        options: &SignedUrlOptions,
    ) -> Result<SignedUrl>;
}

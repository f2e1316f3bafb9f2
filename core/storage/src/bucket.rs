//! Bucket adapter over the S3 XML API, shared by S3-compatible stores and GCS.

use async_trait::async_trait;
use aws_sdk_s3::config::{
    BehaviorVersion, Builder as ConfigBuilder, Credentials, RequestChecksumCalculation,
    ResponseChecksumValidation,
};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::{HeadObjectError, HeadObjectOutput};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt::Debug;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

use snapstore_common::{Error, ObjectPath, Result};

use crate::adapter::{
    encode_key, split_metadata, ObjectMetadata, SignedUrl, SignedUrlOptions, StorageAdapter,
    UploadStrategy, CONTENT_TYPE_KEY, UPLOAD_PART_SIZE,
};
use crate::config::{ClientSettings, ProviderCredentials, ProviderKind};
use crate::{gcs, s3};

/// Provider name reported by the static credentials.
const CREDENTIALS_PROVIDER: &str = "snapstore-provider-config";

/// SDK settings common to every backend.
///
/// Checksums are only sent where the API requires them: GCS and several
/// S3-compatible stores reject the newer flexible-checksum headers.
pub(crate) fn base_config(credentials: &ProviderCredentials) -> ConfigBuilder {
    let credentials = Credentials::new(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.expose().to_string(),
        None,
        None,
        CREDENTIALS_PROVIDER,
    );
    ConfigBuilder::new()
        .behavior_version(BehaviorVersion::latest())
        .credentials_provider(credentials)
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
        .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
}

/// Reject endpoints the SDK could only fail on at request time.
pub(crate) fn checked_endpoint(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint)
        .map_err(|e| Error::InvalidInput(format!("Invalid endpoint: {}", e)))?;
    if url.host_str().is_none() {
        return Err(Error::InvalidInput("Endpoint has no host".to_string()));
    }
    Ok(endpoint.trim_end_matches('/').to_string())
}

/// Wrap any SDK failure as a backend error, keeping the original as source.
fn backend_error<E, R>(operation: &str, key: &str, err: SdkError<E, R>) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    Error::backend_with(
        format!("{} of '{}' failed: {}", operation, key, DisplayErrorContext(&err)),
        err,
    )
}

/// User metadata travels as `x-amz-meta-*` headers.
fn check_user_metadata(user: &[(String, String)]) -> Result<()> {
    for (key, value) in user {
        let valid_key = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        if !valid_key {
            return Err(Error::InvalidInput(format!("Invalid metadata key {:?}", key)));
        }
        if value.chars().any(|c| c.is_control() || !c.is_ascii()) {
            return Err(Error::InvalidInput(format!(
                "Invalid metadata value for {:?}",
                key
            )));
        }
    }
    Ok(())
}

fn metadata_from_head(head: &HeadObjectOutput) -> ObjectMetadata {
    let mut metadata: ObjectMetadata = head
        .metadata()
        .map(|user| user.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    if let Some(content_type) = head.content_type() {
        metadata.insert(CONTENT_TYPE_KEY.to_string(), content_type.to_string());
    }
    if let Some(length) = head.content_length() {
        metadata.insert("content-length".to_string(), length.to_string());
    }
    if let Some(etag) = head.e_tag() {
        metadata.insert("etag".to_string(), etag.to_string());
    }
    if let Some(modified) = head
        .last_modified()
        .and_then(|t| chrono::DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
    {
        metadata.insert("last-modified".to_string(), modified.to_rfc2822());
    }
    metadata
}

/// Storage adapter for one bucket of an S3-compatible store or of GCS.
///
/// A missing object is reported as `ObjectNotFound` only by `read`,
/// `exists`, `get_metadata` and the source side of `copy`. Every other
/// failure is `Error::Backend`.
pub struct BucketAdapter {
    kind: ProviderKind,
    client: Client,
    bucket: String,
    /// Set once a bucket-level call has confirmed the bucket exists.
    bucket_confirmed: OnceCell<()>,
}

impl BucketAdapter {
    /// Create an adapter. No network I/O happens here.
    pub fn new(
        kind: ProviderKind,
        settings: ClientSettings,
        credentials: &ProviderCredentials,
    ) -> Result<Self> {
        let config = match kind {
            ProviderKind::S3Compatible => s3::client_config(&settings, credentials)?,
            ProviderKind::Gcs => gcs::client_config(&settings, credentials)?,
        };
        Ok(Self {
            kind,
            client: Client::from_conf(config),
            bucket: settings.bucket,
            bucket_confirmed: OnceCell::new(),
        })
    }

    /// Object metadata, or `None` when the object is absent.
    ///
    /// A HEAD answers a missing bucket and a missing object with the same
    /// bare 404, so a miss is only trusted once the bucket is confirmed.
    async fn head(&self, path: &ObjectPath) -> Result<Option<HeadObjectOutput>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path.as_str())
            .send()
            .await;

        match result {
            Ok(head) => Ok(Some(head)),
            Err(err) if err.as_service_error().is_some_and(HeadObjectError::is_not_found) => {
                self.confirm_bucket().await?;
                Ok(None)
            }
            Err(err) => Err(backend_error("Metadata lookup", path.as_str(), err)),
        }
    }

    async fn confirm_bucket(&self) -> Result<()> {
        self.bucket_confirmed
            .get_or_try_init(|| async {
                self.client
                    .head_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map_err(|e| backend_error("Bucket lookup", &self.bucket, e))?;
                debug!(bucket = %self.bucket, "Bucket confirmed");
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    async fn put_single(
        &self,
        key: &str,
        data: Bytes,
        content_type: String,
        user: HashMap<String, String>,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata((!user.is_empty()).then_some(user))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| backend_error("Write", key, e))?;
        Ok(())
    }

    /// Multipart upload in `UPLOAD_PART_SIZE` slices, aborted on failure.
    async fn put_multipart(
        &self,
        key: &str,
        data: Bytes,
        content_type: String,
        user: HashMap<String, String>,
    ) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata((!user.is_empty()).then_some(user))
            .send()
            .await
            .map_err(|e| backend_error("Multipart start", key, e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| Error::backend(format!("No upload id returned for '{}'", key)))?
            .to_string();

        let result = async {
            let parts = self.upload_parts(key, &upload_id, data).await?;
            self.client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map_err(|e| backend_error("Multipart completion", key, e))?;
            Ok::<(), Error>(())
        }
        .await;

        if result.is_err() {
            let aborted = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await;
            if let Err(abort_err) = aborted {
                warn!(path = %key, error = %DisplayErrorContext(&abort_err), "Failed to abort multipart upload");
            }
        }
        result
    }

    async fn upload_parts(&self, key: &str, upload_id: &str, data: Bytes) -> Result<Vec<CompletedPart>> {
        let mut parts = Vec::with_capacity(data.len().div_ceil(UPLOAD_PART_SIZE));
        let mut offset = 0;
        let mut part_number = 1;

        while offset < data.len() {
            let end = (offset + UPLOAD_PART_SIZE).min(data.len());
            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(data.slice(offset..end)))
                .send()
                .await
                .map_err(|e| backend_error("Part upload", key, e))?;
            let etag = uploaded.e_tag().ok_or_else(|| {
                Error::backend(format!("Part {} of '{}' acknowledged without ETag", part_number, key))
            })?;
            debug!(path = %key, part_number, size = end - offset, "Part uploaded");
            parts.push(
                CompletedPart::builder()
                    .e_tag(etag)
                    .part_number(part_number)
                    .build(),
            );
            offset = end;
            part_number += 1;
        }

        Ok(parts)
    }
}

#[async_trait]
impl StorageAdapter for BucketAdapter {
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
        let key = path.as_str();
        let size = data.len();
        let (content_type, user) = split_metadata(metadata);
        check_user_metadata(&user)?;
        let user: HashMap<String, String> = user.into_iter().collect();

        match UploadStrategy::for_len(size) {
            UploadStrategy::Single => {
                debug!(path = %path, size, "Putting object");
                self.put_single(key, data, content_type, user).await?;
            }
            UploadStrategy::Chunked => {
                debug!(path = %path, size, "Starting multipart upload");
                self.put_multipart(key, data, content_type, user).await?;
            }
        }

        info!(backend = %self.kind, path = %path, size, "Object written");
        Ok(())
    }

    async fn read(&self, path: &ObjectPath) -> Result<Bytes> {
        debug!(path = %path, "Reading object");
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path.as_str())
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(GetObjectError::is_no_such_key) {
                    Error::ObjectNotFound(path.to_string())
                } else {
                    backend_error("Read", path.as_str(), err)
                }
            })?;

        let body = output.body.collect().await.map_err(|e| {
            Error::backend_with(format!("Read of '{}' was interrupted", path), e)
        })?;
        Ok(body.into_bytes())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| backend_error("Listing", prefix, e))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
        }

        debug!(prefix, count = keys.len(), "Listed objects");
        Ok(keys)
    }

    async fn delete(&self, path: &ObjectPath) -> Result<()> {
        let result = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(path.as_str())
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(path = %path, "Object deleted");
                Ok(())
            }
            // GCS answers a delete of a missing object with NoSuchKey.
            Err(err) if err.code() == Some("NoSuchKey") => {
                debug!(path = %path, "Object already absent");
                Ok(())
            }
            Err(err) => Err(backend_error("Delete", path.as_str(), err)),
        }
    }

    async fn exists(&self, path: &ObjectPath) -> Result<bool> {
        Ok(self.head(path).await?.is_some())
    }

    async fn get_metadata(&self, path: &ObjectPath) -> Result<Option<ObjectMetadata>> {
        Ok(self.head(path).await?.as_ref().map(metadata_from_head))
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> Result<()> {
        let source = format!("{}/{}", self.bucket, encode_key(from.as_str()));
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(to.as_str())
            .copy_source(source)
            .send()
            .await
            .map_err(|err| {
                if err.code() == Some("NoSuchKey") {
                    Error::ObjectNotFound(from.to_string())
                } else {
                    backend_error("Copy", from.as_str(), err)
                }
            })?;
        info!(from = %from, to = %to, "Object copied");
        Ok(())
    }

    async fn signed_read_url(
        &self,
        path: &ObjectPath,
        options: &SignedUrlOptions,
    ) -> Result<SignedUrl> {
        options.validate()?;
        let now = Utc::now();
        let presigning = PresigningConfig::builder()
            .start_time(now.into())
            .expires_in(options.expires_in)
            .build()
            .map_err(|e| Error::InvalidInput(format!("Invalid signed URL lifetime: {}", e)))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path.as_str())
            .set_response_content_disposition(options.content_disposition.clone())
            .presigned(presigning)
            .await
            .map_err(|e| backend_error("Signing", path.as_str(), e))?;
        let url = Url::parse(presigned.uri())
            .map_err(|e| Error::backend(format!("Signed URL is malformed: {}", e)))?;

        Ok(SignedUrl {
            url,
            expires_at: now + chrono::Duration::seconds(options.expires_in.as_secs() as i64),
        })
    }
}

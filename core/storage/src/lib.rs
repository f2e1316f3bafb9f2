//! Object storage abstraction for SnapStore.
//!
//! This crate provides one adapter contract over several object-store
//! backends (S3-compatible stores and Google Cloud Storage, both reached
//! through the S3 XML API with `aws-sdk-s3`), a factory that
//! selects and caches adapters from tenant provider configs, and a gateway
//! issuing short-lived signed download URLs.
//!
//! # Design Principles
//! - Backend isolation: no backend-specific error shape leaves an adapter
//! - Async operations: all I/O operations are async
//! - Large payloads are uploaded in parts, invisibly to readers
//! - Credentials and signed URLs never reach the logs

pub mod adapter;
pub mod bucket;
pub mod config;
pub mod factory;
pub mod gateway;
pub mod gcs;
pub mod memory;
pub mod s3;
pub mod validation;

#[cfg(test)]
mod testing;

pub use adapter::{
    attachment_disposition, ObjectMetadata, SignedUrl, SignedUrlOptions, StorageAdapter,
    UploadStrategy, MULTIPART_THRESHOLD, UPLOAD_PART_SIZE,
};
pub use bucket::BucketAdapter;
pub use config::{
    ClientSettings, ProviderConfigId, ProviderCredentials, ProviderKind, ReplicationMode,
    StorageProviderConfig, ValidationOutcome, ValidationStatus, CURRENT_ADAPTER_VERSION,
};
pub use factory::AdapterFactory;
pub use gateway::{SignedAccessGateway, SignedDownload, DOWNLOAD_URL_TTL};
pub use memory::MemoryAdapter;
pub use validation::validate_provider;

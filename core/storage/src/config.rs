//! Tenant-owned storage provider configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use snapstore_common::{Error, Result, SecretString};

/// Adapter schema version written into new provider configs.
pub const CURRENT_ADAPTER_VERSION: u32 = 1;

/// Supported backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// AWS S3 and S3-compatible stores (R2, MinIO, ...).
    S3Compatible,
    /// Google Cloud Storage through its XML API.
    Gcs,
}

impl ProviderKind {
    /// Tag persisted in `StorageProviderConfig::provider_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3Compatible => "s3",
            Self::Gcs => "gcs",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "s3" => Ok(Self::S3Compatible),
            "gcs" => Ok(Self::Gcs),
            other => Err(Error::UnsupportedProviderType(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a provider config; the key of the factory's client cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderConfigId(String);

impl ProviderConfigId {
    /// Create a new id from a string.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidInput(
                "Provider config id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How snapshots reach the external provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMode {
    /// Every snapshot is copied to the provider.
    Mirror,
    /// The provider is the long-term home of snapshots.
    Archive,
}

/// Result of the last validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pending,
    Success,
    Error,
}

/// Outcome of probing a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Success,
    /// Failure with a message safe to show the tenant.
    Failed(String),
}

/// Storage provider configuration persisted with the tenant record.
///
/// Credentials are only ever held encrypted here; decryption belongs to the
/// caller, which hands the result to the factory as `ProviderCredentials`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProviderConfig {
    pub id: ProviderConfigId,
    /// Raw provider tag. Kept as a string so configs written by a newer
    /// release still load; the factory rejects unknown tags.
    #[serde(rename = "type")]
    pub provider_type: String,
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_path_style: Option<bool>,
    pub encrypted_access_key_id: String,
    pub encrypted_secret_access_key: String,
    pub is_enabled: bool,
    pub replication_mode: ReplicationMode,
    pub adapter_version: u32,
    pub validation_status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl StorageProviderConfig {
    /// Create an enabled, not yet validated config.
    pub fn new(
        kind: ProviderKind,
        bucket: impl Into<String>,
        encrypted_access_key_id: impl Into<String>,
        encrypted_secret_access_key: impl Into<String>,
        replication_mode: ReplicationMode,
    ) -> Self {
        Self {
            id: ProviderConfigId::generate(),
            provider_type: kind.as_str().to_string(),
            bucket: bucket.into(),
            region: None,
            endpoint: None,
            force_path_style: None,
            encrypted_access_key_id: encrypted_access_key_id.into(),
            encrypted_secret_access_key: encrypted_secret_access_key.into(),
            is_enabled: true,
            replication_mode,
            adapter_version: CURRENT_ADAPTER_VERSION,
            validation_status: ValidationStatus::Pending,
            validation_error: None,
            created_at: Utc::now(),
            last_validated_at: None,
        }
    }

    /// Set the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set a custom endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Force path-style addressing.
    pub fn with_path_style(mut self, force: bool) -> Self {
        self.force_path_style = Some(force);
        self
    }

    /// Parse the provider tag.
    ///
    /// # Errors
    /// - `UnsupportedProviderType` for tags outside the supported set
    pub fn kind(&self) -> Result<ProviderKind> {
        self.provider_type.parse()
    }

    /// Connection settings handed to a blob client.
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            force_path_style: self.force_path_style,
        }
    }

    /// Stop using this provider. Configs are never deleted.
    pub fn disable(&mut self) {
        self.is_enabled = false;
    }

    /// Record the outcome of a validation run.
    pub fn record_validation(&mut self, outcome: &ValidationOutcome, at: DateTime<Utc>) {
        match outcome {
            ValidationOutcome::Success => {
                self.validation_status = ValidationStatus::Success;
                self.validation_error = None;
            }
            ValidationOutcome::Failed(message) => {
                self.validation_status = ValidationStatus::Error;
                self.validation_error = Some(message.clone());
            }
        }
        self.last_validated_at = Some(at);
    }
}

/// Bucket addressing for one blob client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub force_path_style: Option<bool>,
}

/// Decrypted credential pair supplied by the caller's secret store.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl ProviderCredentials {
    /// Wrap a decrypted key pair.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::new(secret_access_key),
        }
    }

    /// Check both halves are present.
    pub fn validate(&self) -> Result<()> {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(Error::InvalidInput(
                "Provider credentials are incomplete".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderCredentials([REDACTED])")
    }
}

//! Common types used throughout SnapStore.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Longest object key every supported backend accepts.
const MAX_PATH_BYTES: usize = 1024;

/// Identifier of a tenant (the owner of a path prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create a new TenantId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or contains a path separator
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "TenantId cannot be empty".to_string(),
            ));
        }
        if id.contains('/') || id.contains('\\') {
            return Err(crate::Error::InvalidInput(
                "TenantId cannot contain separators".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of an object within one bucket.
///
/// Paths follow the `"{tenantId}/{objectId}.json.gz"` convention; the first
/// segment names the owning tenant, which is what download authorization
/// checks against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Parse and validate an object key.
    ///
    /// # Errors
    /// - Empty, absolute, or longer than 1024 bytes
    /// - Empty, `.` or `..` segments
    /// - Backslashes or control characters
    pub fn parse(path: &str) -> crate::Result<Self> {
        if path.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Object path cannot be empty".to_string(),
            ));
        }
        if path.len() > MAX_PATH_BYTES {
            return Err(crate::Error::InvalidInput(format!(
                "Object path exceeds {} bytes",
                MAX_PATH_BYTES
            )));
        }
        if path.contains('\\') || path.chars().any(char::is_control) {
            return Err(crate::Error::InvalidInput(
                "Object path contains forbidden characters".to_string(),
            ));
        }
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(crate::Error::InvalidInput(format!(
                    "Invalid object path segment: {:?}",
                    segment
                )));
            }
        }
        Ok(Self(path.to_string()))
    }

    /// Build the canonical snapshot path `"{tenant}/{object_id}.json.gz"`.
    pub fn snapshot(tenant: &TenantId, object_id: &str) -> crate::Result<Self> {
        Self::parse(&format!("{}/{}.json.gz", tenant, object_id))
    }

    /// First segment of the path.
    pub fn tenant(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// Last segment of the path.
    pub fn basename(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Whether the path lives under `"{tenant}/"`.
    pub fn is_owned_by(&self, tenant: &TenantId) -> bool {
        self.0
            .strip_prefix(tenant.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<ObjectPath> for String {
    fn from(path: ObjectPath) -> Self {
        path.0
    }
}

/// Secret string that zeroizes on drop and never prints its value.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Access the secret. Callers must not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

//! Signed download URLs for tenant-owned objects.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use snapstore_common::{Error, ObjectPath, Result, TenantId};

use crate::adapter::{SignedUrl, SignedUrlOptions, StorageAdapter};

/// Lifetime of an issued download URL.
pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(10 * 60);

/// A download URL plus the filename the browser will save it under.
///
/// `Debug` never prints the signed query string.
#[derive(Debug, Clone)]
pub struct SignedDownload {
    pub signed: SignedUrl,
    pub filename: String,
}

/// Issues short-lived, read-only URLs after checking path ownership.
pub struct SignedAccessGateway {
    adapter: Arc<dyn StorageAdapter>,
    ttl: Duration,
}

impl SignedAccessGateway {
    /// Gateway over `adapter` issuing `DOWNLOAD_URL_TTL` URLs.
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            ttl: DOWNLOAD_URL_TTL,
        }
    }

    /// Lifetime of issued URLs.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a download URL for `path` on behalf of `requester_id`.
    ///
    /// # Preconditions
    /// - `path` lives under `"{requester_id}/"`
    ///
    /// # Postconditions
    /// - The URL allows GET only and expires after `ttl()`
    /// - Nothing is persisted
    ///
    /// # Errors
    /// - `Forbidden` for a foreign or malformed path; no backend call is made
    /// - `ObjectNotFound` if nothing is stored at `path`
    pub async fn issue_download_url(
        &self,
        requester_id: &str,
        path: &str,
    ) -> Result<SignedDownload> {
        let path = match owned_path(requester_id, path) {
            Ok(path) => path,
            Err(refusal) => {
                warn!(requester = %requester_id, reason = refusal.as_str(), "Download refused");
                return Err(Error::Forbidden(
                    "Object is outside the requester's namespace".to_string(),
                ));
            }
        };

        if !self.adapter.exists(&path).await? {
            debug!(path = %path, "Download requested for missing object");
            return Err(Error::ObjectNotFound(path.to_string()));
        }

        let filename = path.basename().to_string();
        let options = SignedUrlOptions::expiring_in(self.ttl).with_attachment(&filename);
        let signed = self.adapter.signed_read_url(&path, &options).await?;

        info!(path = %path, expires_at = %signed.expires_at, "Download URL issued");
        Ok(SignedDownload { signed, filename })
    }
}

/// Why a download request was refused. Logged instead of the raw path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refusal {
    InvalidRequester,
    MalformedPath,
    ForeignPrefix,
}

impl Refusal {
    fn as_str(self) -> &'static str {
        match self {
            Refusal::InvalidRequester => "invalid_requester",
            Refusal::MalformedPath => "malformed_path",
            Refusal::ForeignPrefix => "foreign_prefix",
        }
    }
}

/// The parsed path, if it is valid and under the requester's prefix.
fn owned_path(requester_id: &str, path: &str) -> std::result::Result<ObjectPath, Refusal> {
    let tenant = TenantId::new(requester_id).map_err(|_| Refusal::InvalidRequester)?;
    let path = ObjectPath::parse(path).map_err(|_| Refusal::MalformedPath)?;
    if path.is_owned_by(&tenant) {
        Ok(path)
    } else {
        Err(Refusal::ForeignPrefix)
    }
}

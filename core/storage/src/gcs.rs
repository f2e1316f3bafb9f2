//! Google Cloud Storage through its S3-compatible XML API.
//!
//! Requests are authenticated with GCS HMAC keys, so the same access-key and
//! secret pair a tenant configures for S3 works here.

use aws_sdk_s3::config::Region;
use aws_sdk_s3::Config;

use snapstore_common::Result;

use crate::bucket::{base_config, checked_endpoint};
use crate::config::{ClientSettings, ProviderCredentials};

/// Public XML API endpoint.
pub const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// GCS accepts any region in the credential scope; `auto` is canonical.
pub const DEFAULT_REGION: &str = "auto";

/// SDK configuration for a GCS bucket.
///
/// The XML API is always addressed path-style; `force_path_style` has no
/// effect.
pub fn client_config(settings: &ClientSettings, credentials: &ProviderCredentials) -> Result<Config> {
    let endpoint = checked_endpoint(settings.endpoint.as_deref().unwrap_or(GCS_ENDPOINT))?;
    let region = settings.region.as_deref().unwrap_or(DEFAULT_REGION).to_string();
    Ok(base_config(credentials)
        .region(Region::new(region))
        .endpoint_url(endpoint)
        .force_path_style(true)
        .build())
}

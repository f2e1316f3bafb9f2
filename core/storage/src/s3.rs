//! AWS S3 and S3-compatible stores (R2, MinIO, ...).

use aws_sdk_s3::config::Region;
use aws_sdk_s3::Config;

use snapstore_common::Result;

use crate::bucket::{base_config, checked_endpoint};
use crate::config::{ClientSettings, ProviderCredentials};

/// Region used for signing when the config names none.
pub const DEFAULT_REGION: &str = "us-east-1";

/// SDK configuration for an S3-compatible bucket.
///
/// Without an endpoint the SDK resolves the AWS endpoint for the region.
/// Addressing is virtual-hosted unless the config forces path style.
pub fn client_config(settings: &ClientSettings, credentials: &ProviderCredentials) -> Result<Config> {
    let region = settings.region.as_deref().unwrap_or(DEFAULT_REGION).to_string();
    let mut builder = base_config(credentials)
        .region(Region::new(region))
        .force_path_style(settings.force_path_style.unwrap_or(false));
    if let Some(endpoint) = &settings.endpoint {
        builder = builder.endpoint_url(checked_endpoint(endpoint)?);
    }
    Ok(builder.build())
}

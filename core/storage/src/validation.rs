//! Connectivity probe for tenant-configured providers.

use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use snapstore_common::{Error, ObjectPath, Result, TenantId};

use crate::adapter::StorageAdapter;
use crate::config::ValidationOutcome;

/// Directory under the tenant prefix that holds probe objects.
pub const VALIDATION_DIR: &str = ".snapstore-validation";

/// Write, read back and delete a probe object through `adapter`.
///
/// Never fails: problems are reported as `ValidationOutcome::Failed` with an
/// end-user safe message. Details go to the log.
pub async fn validate_provider(adapter: &dyn StorageAdapter, tenant: &TenantId) -> ValidationOutcome {
    let probe = format!("{}/{}/{}", tenant, VALIDATION_DIR, Uuid::new_v4());
    match run_probe(adapter, &probe).await {
        Ok(()) => {
            info!(backend = %adapter.backend(), tenant = %tenant, "Provider validated");
            ValidationOutcome::Success
        }
        Err(e) => {
            warn!(backend = %adapter.backend(), tenant = %tenant, error = %e, "Provider validation failed");
            ValidationOutcome::Failed(e.public_message().to_string())
        }
    }
}

async fn run_probe(adapter: &dyn StorageAdapter, probe: &str) -> Result<()> {
    let path = ObjectPath::parse(probe)?;
    let payload = Bytes::from(format!("snapstore validation probe {}", path.basename()));

    adapter.write(&path, payload.clone(), None).await?;
    let read_back = adapter.read(&path).await;
    // Clean up even when the read failed.
    let deleted = adapter.delete(&path).await;

    if read_back? != payload {
        return Err(Error::backend("Probe object came back altered"));
    }
    deleted
}

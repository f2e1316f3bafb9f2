//! Common utilities and types shared across SnapStore crates.
//!
//! This module provides the error taxonomy every storage backend reports
//! through, plus the validated identifiers used to address objects.

pub mod error;
pub mod types;

pub use error::{BoxError, Error, Result};
pub use types::{ObjectPath, SecretString, TenantId};

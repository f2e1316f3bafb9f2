//! Common error types for SnapStore.

use thiserror::Error;

/// Boxed error used to carry a backend's original failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for storage operations.
///
/// Backend adapters classify every provider-specific failure into one of
/// these kinds before it leaves the adapter.
#[derive(Debug, Error)]
pub enum Error {
    /// Object is absent from the bucket.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Requester does not own the path it asked for.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Provider type outside the supported set.
    #[error("Unsupported provider type: {0}")]
    UnsupportedProviderType(String),

    /// Operation the backend cannot perform.
    #[error("Operation '{operation}' is not supported by the {backend} backend")]
    NotSupportedByBackend {
        backend: &'static str,
        operation: &'static str,
    },

    /// Any other backend failure.
    #[error("Storage backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Backend failure without an underlying cause.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Backend failure wrapping the original cause.
    pub fn backend_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Whether this error reports a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound(_))
    }

    /// HTTP status an API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ObjectNotFound(_) => 404,
            Self::Forbidden(_) => 403,
            Self::InvalidInput(_) => 400,
            Self::NotSupportedByBackend { .. } => 501,
            Self::UnsupportedProviderType(_) | Self::Backend { .. } | Self::Serialization(_) => {
                500
            }
        }
    }

    /// Message safe to return to end users.
    ///
    /// Never contains paths, bucket names, endpoints or credentials; the full
    /// error stays in server-side logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::ObjectNotFound(_) => "The requested object does not exist",
            Self::Forbidden(_) => "Access to this object is not allowed",
            Self::InvalidInput(_) => "The request was invalid",
            Self::NotSupportedByBackend { .. } => {
                "This operation is not available for the configured storage provider"
            }
            Self::UnsupportedProviderType(_) | Self::Backend { .. } | Self::Serialization(_) => {
                "Storage is temporarily unavailable"
            }
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

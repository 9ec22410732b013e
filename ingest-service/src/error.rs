use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur in the item store.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// An error from the storage backend.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// An item could not be serialized before upload.
    #[error("failed to serialize item: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A stored object does not contain valid JSON.
    #[error("failed to parse stored object `{key}`: {cause}")]
    Parse {
        /// The key of the offending object.
        key: String,
        #[source]
        cause: serde_json::Error,
    },

    /// An object disappeared between listing and reading it.
    #[error("stored object `{key}` vanished while reading")]
    Vanished {
        /// The key of the missing object.
        key: String,
    },
}

/// Result type for item store operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

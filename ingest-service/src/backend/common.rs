use std::fmt::Debug;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("ingest-service/", env!("CARGO_PKG_VERSION"));

/// Content type of stored item records.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A type-erased [`Backend`] instance.
pub type BoxedBackend = Box<dyn Backend>;

/// A blob store that can hold objects under string keys.
///
/// Keys are `/`-separated paths. Backends never overwrite objects: [`put_object`] must fail with
/// [`BackendError::AlreadyExists`] if the key is taken.
///
/// [`put_object`]: Backend::put_object
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Creates a new object at the given key.
    async fn put_object(&self, key: &str, content_type: &str, payload: Bytes)
    -> BackendResult<()>;

    /// Lists the keys of all objects starting with `prefix`.
    ///
    /// Implementations must consume all pages of a paginated listing before returning.
    async fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>>;

    /// Retrieves the contents of the object at the given key.
    async fn get_object(&self, key: &str) -> BackendResult<Option<Bytes>>;
}

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum BackendError {
    /// IO errors related to file operations.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An object already exists at the key of a create-only write.
    #[error("object already exists: {key}")]
    AlreadyExists {
        /// The conflicting key.
        key: String,
    },

    /// All errors stemming from the reqwest client.
    ///
    /// These can be network errors encountered when sending the requests, but can also indicate
    /// errors returned by the API itself.
    #[error("reqwest error: {context}: {cause}")]
    Reqwest {
        /// What the backend was doing.
        context: String,
        #[source]
        cause: reqwest::Error,
    },

    /// The store answered with an unexpected status code.
    #[error("{context}: unexpected status {status}: {message}")]
    Status {
        /// What the backend was doing.
        context: String,
        /// The HTTP status code of the response.
        status: reqwest::StatusCode,
        /// The error message reported by the store, if any.
        message: String,
    },

    /// A listing response could not be decoded.
    #[error("malformed listing response: {0}")]
    Listing(#[from] quick_xml::de::DeError),

    /// The configured service endpoint is not a usable base URL.
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    /// No access token could be obtained for the configured identity.
    #[error("failed to obtain access token: {0}")]
    Credential(#[source] azure_core::Error),
}

impl BackendError {
    /// Creates a [`BackendError::Reqwest`] with the given context.
    pub fn reqwest(context: impl Into<String>, cause: reqwest::Error) -> Self {
        Self::Reqwest {
            context: context.into(),
            cause,
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Creates a reqwest client with required defaults.
pub fn reqwest_client(timeout: Duration) -> BackendResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|cause| BackendError::reqwest("building http client", cause))
}

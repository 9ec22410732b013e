//! Configuration for the ingest server.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables prefixed with `INGEST__`
//! 2. The plain Azure variables `AZURE_STORAGE_ACCOUNT_NAME`, `AZURE_CONTAINER_NAME` and
//!    `AZURE_FOLDER_NAME`
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults. The storage
//! account, container and folder have no usable defaults; loading fails if they are not set.
//!
//! # Environment Variables
//!
//! Environment variables use `INGEST__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `INGEST__HTTP_ADDR=0.0.0.0:8000` sets the HTTP server address
//! - `INGEST__FOLDER=sensors` sets the folder items are stored in
//! - `INGEST__STORAGE__ACCOUNT=mystorageaccount` sets the storage account
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! http_addr: 0.0.0.0:8000
//! folder: sensors
//!
//! storage:
//!   type: azure
//!   account: mystorageaccount
//!   container: items
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use ingest_service::StorageConfig;
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "INGEST__";

/// Plain environment variables accepted for compatibility, with the setting they map to.
const COMPAT_ENV: &[(&str, &str)] = &[
    ("AZURE_STORAGE_ACCOUNT_NAME", "storage.account"),
    ("AZURE_CONTAINER_NAME", "storage.container"),
    ("AZURE_FOLDER_NAME", "folder"),
];

/// Errors raised while loading the configuration.
///
/// These are fatal: the server must not start with an incomplete configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read, or a value has the wrong type.
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    /// A required setting is absent or empty.
    #[error("missing required setting `{setting}` (set {env} or {compat})")]
    Missing {
        /// The path of the setting within the configuration.
        setting: &'static str,
        /// The prefixed environment variable.
        env: &'static str,
        /// The plain environment variable.
        compat: &'static str,
    },

    /// The folder is not a relative `/`-separated path.
    #[error("invalid folder `{0}`: expected a relative path without `.` or `..` segments")]
    InvalidFolder(String),
}

/// Newtype around `String` that may protect against accidental
/// logging of secrets in our configuration struct. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

fn default_storage_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Storage backend configuration.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
/// If omitted, Azure Blob Storage is assumed.
///
/// Used in: [`Config::storage`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// [Azure Blob Storage] backend (type `"azure"`).
    ///
    /// Authentication uses the ambient identity of the process: a service principal from
    /// `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET` if all are set, otherwise
    /// the managed identity of the host.
    ///
    /// [Azure Blob Storage]: https://azure.microsoft.com/products/storage/blobs
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: azure
    ///   account: mystorageaccount
    ///   container: items
    /// ```
    Azure {
        /// Name of the storage account.
        ///
        /// # Environment Variables
        ///
        /// - `INGEST__STORAGE__ACCOUNT`
        /// - `AZURE_STORAGE_ACCOUNT_NAME`
        account: String,

        /// Name of the blob container. The container must exist before starting the server.
        ///
        /// # Environment Variables
        ///
        /// - `INGEST__STORAGE__CONTAINER`
        /// - `AZURE_CONTAINER_NAME`
        container: String,

        /// Optional blob service URL, replacing `https://<account>.blob.core.windows.net`.
        ///
        /// Useful for testing with emulators. Requests to a custom endpoint are not
        /// authenticated.
        ///
        /// # Environment Variable
        ///
        /// `INGEST__STORAGE__ENDPOINT`
        #[serde(default)]
        endpoint: Option<String>,

        /// Timeout for each request to the storage account, e.g. `30s`.
        ///
        /// # Default
        ///
        /// `30s`
        #[serde(default = "default_storage_timeout", with = "humantime_serde")]
        timeout: Duration,
    },

    /// Local filesystem storage backend (type `"filesystem"`).
    ///
    /// Stores items as files on the local filesystem. Suitable for development and
    /// single-server deployments.
    ///
    /// ```yaml
    /// storage:
    ///   type: filesystem
    ///   path: /data
    /// ```
    FileSystem {
        /// Directory path for storing items. Created on first write.
        path: PathBuf,
    },

    /// In-memory storage (type `"memory"`). Items are lost on restart.
    Memory,
}

impl Storage {
    /// Returns the backend configuration for the [`ItemStore`](ingest_service::ItemStore).
    pub fn as_storage_config(&self) -> StorageConfig<'_> {
        match self {
            Storage::Azure {
                account,
                container,
                endpoint,
                timeout,
            } => StorageConfig::Azure {
                account,
                container,
                endpoint: endpoint.as_deref(),
                timeout: *timeout,
            },
            Storage::FileSystem { path } => StorageConfig::FileSystem { path },
            Storage::Memory => StorageConfig::Memory,
        }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Storage::Azure {
            account: String::new(),
            container: String::new(),
            endpoint: None,
            timeout: default_storage_timeout(),
        }
    }
}

/// Runtime configuration for the Tokio async runtime.
///
/// Used in: [`Config::runtime`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads for the server runtime.
    ///
    /// # Default
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `INGEST__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
        }
    }
}

/// [Sentry](https://sentry.io/) error tracking and performance monitoring configuration.
///
/// Sentry is disabled by default and only enabled when a DSN is provided.
///
/// Used in: [`Config::sentry`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// Sentry DSN (Data Source Name).
    ///
    /// # Environment Variable
    ///
    /// `INGEST__SENTRY__DSN`
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name for this deployment, e.g. "production".
    ///
    /// # Environment Variable
    ///
    /// `INGEST__SENTRY__ENVIRONMENT`
    pub environment: Option<Cow<'static, str>>,

    /// Server name or identifier, such as the hostname or pod name.
    ///
    /// # Environment Variable
    ///
    /// `INGEST__SENTRY__SERVER_NAME`
    pub server_name: Option<Cow<'static, str>>,

    /// Error event sampling rate between `0.0` and `1.0`.
    ///
    /// # Default
    ///
    /// `1.0` (send all errors)
    pub sample_rate: f32,

    /// Performance trace sampling rate between `0.0` and `1.0`.
    ///
    /// # Default
    ///
    /// `0.01` (send 1% of traces)
    pub traces_sample_rate: f32,

    /// Enable Sentry SDK debug mode.
    pub debug: bool,

    /// Additional tags to attach to all Sentry events.
    ///
    /// # Environment Variables
    ///
    /// Each tag is set individually:
    /// - `INGEST__SENTRY__TAGS__FOO=foo`
    pub tags: BTreeMap<String, String>,
}

impl Sentry {
    /// Returns whether Sentry integration is enabled.
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            server_name: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.01,
            debug: false,
            tags: BTreeMap::new(),
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable provides more granular control per module if needed.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `INGEST__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `auto` (pretty for TTY, simplified otherwise)
    ///
    /// # Environment Variable
    ///
    /// `INGEST__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the ingest server.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server bind address.
    ///
    /// # Default
    ///
    /// `0.0.0.0:8000`
    ///
    /// # Environment Variable
    ///
    /// `INGEST__HTTP_ADDR`
    pub http_addr: SocketAddr,

    /// The folder (key prefix) within the storage that items are written to and read from.
    ///
    /// # Environment Variables
    ///
    /// - `INGEST__FOLDER`
    /// - `AZURE_FOLDER_NAME`
    pub folder: String,

    /// Storage backend holding the items. See [`Storage`].
    pub storage: Storage,

    /// Configuration of the internal task runtime.
    pub runtime: Runtime,

    /// Logging configuration.
    pub logging: Logging,

    /// Configuration for Sentry error tracking.
    pub sentry: Sentry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            folder: String::new(),
            storage: Storage::default(),
            runtime: Runtime::default(),
            logging: Logging::default(),
            sentry: Sentry::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided in `args`)
    /// 3. Plain Azure environment variables
    /// 4. Environment variables (prefixed with `INGEST__`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables contain invalid values
    /// - The folder, storage account or container is missing
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }

        let compat = Env::raw().filter_map(|key| {
            COMPAT_ENV
                .iter()
                .find(|(name, _)| key == *name)
                .map(|(_, setting)| (*setting).into())
        });

        let config: Config = figment
            .merge(compat)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Checks that all required settings carry a value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let folder = self.folder.trim_end_matches('/');
        if folder.is_empty() {
            return Err(ConfigError::Missing {
                setting: "folder",
                env: "INGEST__FOLDER",
                compat: "AZURE_FOLDER_NAME",
            });
        }
        if folder
            .split('/')
            .any(|segment| matches!(segment, "" | "." | ".."))
        {
            return Err(ConfigError::InvalidFolder(self.folder.clone()));
        }

        if let Storage::Azure {
            account, container, ..
        } = &self.storage
        {
            if account.is_empty() {
                return Err(ConfigError::Missing {
                    setting: "storage.account",
                    env: "INGEST__STORAGE__ACCOUNT",
                    compat: "AZURE_STORAGE_ACCOUNT_NAME",
                });
            }
            if container.is_empty() {
                return Err(ConfigError::Missing {
                    setting: "storage.container",
                    env: "INGEST__STORAGE__CONTAINER",
                    compat: "AZURE_CONTAINER_NAME",
                });
            }
        }

        Ok(())
    }
}

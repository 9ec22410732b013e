use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ingest_service::ItemStore;

use crate::config::Config;

/// Shared reference to the ingest [service state](State).
pub type ServiceState = Arc<State>;

/// Reference to the ingest business logic.
///
/// This structure is created during server startup and shared with all HTTP request handlers.
/// Apart from the drain flag, it is never mutated after construction.
///
/// In request handlers, use `axum::extract::State<ServiceState>` to retrieve a shared reference to
/// this structure.
#[derive(Debug)]
pub struct State {
    /// The server configuration.
    pub config: Config,
    /// The store that items are written to and read from.
    pub store: ItemStore,
    draining: AtomicBool,
}

impl State {
    /// Creates the item store for the configured storage backend.
    pub async fn new(config: Config) -> anyhow::Result<ServiceState> {
        let store = ItemStore::new(config.storage.as_storage_config(), &config.folder).await?;
        Ok(Self::with_store(config, store))
    }

    /// Creates the state from an existing store, ignoring the storage configuration.
    pub fn with_store(config: Config, store: ItemStore) -> ServiceState {
        Arc::new(Self {
            config,
            store,
            draining: AtomicBool::new(false),
        })
    }

    /// Marks the server as shutting down. Readiness checks fail from now on.
    pub fn begin_drain(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown has started.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }
}

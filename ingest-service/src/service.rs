//! The item store and its configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::Item;
use crate::backend::{
    AzureBlobBackend, BoxedBackend, InMemoryBackend, JSON_CONTENT_TYPE, LocalFsBackend,
    credential, reqwest_client,
};
use crate::error::{ServiceError, ServiceResult};

/// File extension of stored item records.
const RECORD_EXTENSION: &str = ".json";

/// Configuration to initialize an [`ItemStore`].
#[derive(Debug, Clone)]
pub enum StorageConfig<'a> {
    /// Use Azure Blob Storage.
    Azure {
        /// The name of the storage account.
        account: &'a str,
        /// The name of the container holding the items.
        container: &'a str,
        /// Optional blob service URL overriding the account's public endpoint.
        ///
        /// Assumes an emulator without authentication if set.
        endpoint: Option<&'a str>,
        /// Timeout for each request to the storage account.
        timeout: Duration,
    },
    /// Use a local filesystem as the storage backend.
    FileSystem {
        /// The path to the directory where files will be stored.
        path: &'a Path,
    },
    /// Keep items in process memory. Everything is lost on restart.
    Memory,
}

/// Confirmation of a successful [`ItemStore::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// The folder the record was written to.
    pub folder: String,
    /// The generated file name, `<token>.json`.
    pub filename: String,
    /// The full object key, `<folder>/<filename>`.
    pub key: String,
}

/// Persists [`Item`]s as individual JSON records in a folder of a blob store.
///
/// The store is cheap to clone and safe to share between requests. It holds no mutable state of
/// its own; consistency between concurrent writers and readers is left to the backend.
#[derive(Clone, Debug)]
pub struct ItemStore(Arc<ItemStoreInner>);

#[derive(Debug)]
struct ItemStoreInner {
    backend: BoxedBackend,
    folder: String,
}

impl ItemStore {
    /// Creates a new `ItemStore` writing to `folder` within the configured storage.
    pub async fn new(config: StorageConfig<'_>, folder: &str) -> anyhow::Result<Self> {
        let backend = create_backend(config)?;
        tracing::debug!(backend = backend.name(), folder, "created item store");
        Ok(Self::from_backend(backend, folder))
    }

    /// Creates an `ItemStore` on top of an existing backend.
    pub fn from_backend(backend: BoxedBackend, folder: &str) -> Self {
        let folder = folder.trim_end_matches('/').to_owned();
        Self(Arc::new(ItemStoreInner { backend, folder }))
    }

    /// The folder this store reads and writes.
    pub fn folder(&self) -> &str {
        &self.0.folder
    }

    /// Writes the item as a new record with a freshly generated name.
    ///
    /// The record is created with create-only semantics and never replaces an existing object.
    /// Nothing is retried: if the backend fails, the error is returned as is.
    pub async fn upload(&self, item: &Item) -> ServiceResult<UploadReceipt> {
        let filename = format!("{}{RECORD_EXTENSION}", Uuid::new_v4());
        let key = format!("{}/{filename}", self.0.folder);

        let payload = serde_json::to_vec(item).map_err(ServiceError::Serialize)?;
        self.0
            .backend
            .put_object(&key, JSON_CONTENT_TYPE, payload.into())
            .await?;

        tracing::debug!(%key, "uploaded item");
        Ok(UploadReceipt {
            folder: self.0.folder.clone(),
            filename,
            key,
        })
    }

    /// Reads and parses every record in the folder.
    ///
    /// Only objects ending in `.json` are considered. Records are returned in the order the
    /// backend lists them, which is usually lexicographic by key and unrelated to upload order.
    /// Any failure aborts the whole read and discards what was read so far.
    pub async fn read_all(&self) -> ServiceResult<Vec<serde_json::Value>> {
        let prefix = format!("{}/", self.0.folder);
        let keys = self.0.backend.list_keys(&prefix).await?;

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if !key.ends_with(RECORD_EXTENSION) {
                tracing::trace!(%key, "skipping non-record object");
                continue;
            }

            let Some(payload) = self.0.backend.get_object(&key).await? else {
                return Err(ServiceError::Vanished { key });
            };
            let record = serde_json::from_slice(&payload)
                .map_err(|cause| ServiceError::Parse { key, cause })?;
            records.push(record);
        }

        tracing::debug!(count = records.len(), "read items");
        Ok(records)
    }
}

fn create_backend(config: StorageConfig<'_>) -> anyhow::Result<BoxedBackend> {
    Ok(match config {
        StorageConfig::Azure {
            account,
            container,
            endpoint,
            timeout,
        } => {
            let client = reqwest_client(timeout)?;
            let backend = match endpoint {
                Some(endpoint) => AzureBlobBackend::new(client, endpoint, container, None)?,
                None => {
                    let credential = credential::default_credential()?;
                    let endpoint = AzureBlobBackend::account_endpoint(account);
                    AzureBlobBackend::new(client, &endpoint, container, Some(credential))?
                }
            };
            Box::new(backend)
        }
        StorageConfig::FileSystem { path } => Box::new(LocalFsBackend::new(path)),
        StorageConfig::Memory => Box::new(InMemoryBackend::new()),
    })
}

//! In-memory backend for tests and local development.
//!
//! This provides a [`Backend`] backed by a `BTreeMap`, so listings come back in lexicographic key
//! order just like the cloud stores. The backend is [`Clone`] so tests can hold a handle for direct
//! inspection while the [`ItemStore`](crate::ItemStore) owns a boxed copy.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::common::{Backend, BackendError, BackendResult};

/// Number of calls received per backend operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Calls to [`Backend::put_object`].
    pub put: usize,
    /// Calls to [`Backend::list_keys`].
    pub list: usize,
    /// Calls to [`Backend::get_object`].
    pub get: usize,
}

impl CallCounts {
    /// Total number of calls across all operations.
    pub fn total(&self) -> usize {
        self.put + self.list + self.get
    }
}

#[derive(Debug, Default)]
struct Counters {
    put: AtomicUsize,
    list: AtomicUsize,
    get: AtomicUsize,
}

/// A [`Backend`] keeping all objects in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<Mutex<BTreeMap<String, Bytes>>>,
    counters: Arc<Counters>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the stored bytes, if present.
    ///
    /// This bypasses the [`Backend`] trait and is not counted.
    pub fn get_stored(&self, key: &str) -> Option<Bytes> {
        self.store.lock().unwrap().get(key).cloned()
    }

    /// Inserts or replaces an object directly, bypassing the [`Backend`] trait.
    ///
    /// Useful for seeding foreign or corrupt objects.
    pub fn insert(&self, key: impl Into<String>, payload: impl Into<Bytes>) {
        self.store
            .lock()
            .unwrap()
            .insert(key.into(), payload.into());
    }

    /// Returns the keys of all stored objects.
    pub fn keys(&self) -> Vec<String> {
        self.store.lock().unwrap().keys().cloned().collect()
    }

    /// Returns `true` if the backend has no stored objects.
    pub fn is_empty(&self) -> bool {
        self.store.lock().unwrap().is_empty()
    }

    /// Returns how often each backend operation has been called.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            put: self.counters.put.load(Ordering::Relaxed),
            list: self.counters.list.load(Ordering::Relaxed),
            get: self.counters.get.load(Ordering::Relaxed),
        }
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn put_object(
        &self,
        key: &str,
        _content_type: &str,
        payload: Bytes,
    ) -> BackendResult<()> {
        self.counters.put.fetch_add(1, Ordering::Relaxed);

        let mut store = self.store.lock().unwrap();
        if store.contains_key(key) {
            return Err(BackendError::AlreadyExists { key: key.into() });
        }
        store.insert(key.to_owned(), payload);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>> {
        self.counters.list.fetch_add(1, Ordering::Relaxed);

        let store = self.store.lock().unwrap();
        let keys = store
            .range(prefix.to_owned()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        Ok(keys)
    }

    async fn get_object(&self, key: &str) -> BackendResult<Option<Bytes>> {
        self.counters.get.fetch_add(1, Ordering::Relaxed);
        Ok(self.store.lock().unwrap().get(key).cloned())
    }
}

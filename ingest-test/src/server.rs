//! Exposes an in-process test server for use in integration tests.
//!
//! ```
//! use ingest_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/health");
//!    // use the URL in tests...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};

use async_trait::async_trait;
use bytes::Bytes;
use ingest_server::config::{Config, Storage};
use ingest_server::state::State;
use ingest_server::web::App;
use ingest_service::ItemStore;
use ingest_service::backend::{Backend, BackendResult, BoxedBackend, InMemoryBackend};

/// The folder test servers store items in.
pub const TEST_FOLDER: &str = "sensors";

/// An in-process test server for use in integration tests.
///
/// The server stores items in memory, or in a backend passed to [`with_backend`](Self::with_backend).
/// It listens on a random available port on localhost and stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
}

impl TestServer {
    /// Starts a server backed by a fresh in-memory store.
    pub async fn new() -> Self {
        Self::with_backend(Box::new(InMemoryBackend::new())).await
    }

    /// Starts a server that stores items in the given backend.
    pub async fn with_backend(backend: BoxedBackend) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let config = Config {
            http_addr: socket,
            folder: TEST_FOLDER.into(),
            storage: Storage::Memory,
            ..Default::default()
        };

        let store = ItemStore::from_backend(backend, &config.folder);
        let app = App::new(State::with_store(config, store));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            app.serve(listener, std::future::pending()).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A backend whose every operation fails with an I/O error.
#[derive(Debug, Default)]
pub struct FailingBackend;

#[async_trait]
impl Backend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn put_object(&self, _key: &str, _ct: &str, _payload: Bytes) -> BackendResult<()> {
        Err(std::io::Error::other("storage unavailable").into())
    }

    async fn list_keys(&self, _prefix: &str) -> BackendResult<Vec<String>> {
        Err(std::io::Error::other("storage unavailable").into())
    }

    async fn get_object(&self, _key: &str) -> BackendResult<Option<Bytes>> {
        Err(std::io::Error::other("storage unavailable").into())
    }
}

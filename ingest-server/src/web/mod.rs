//! The ingest HTTP server.
//!
//! [`App`] sets up routing and middleware and can be served on any Tokio TCP listener until a
//! shutdown future resolves. [`server()`] binds the configured address and ties shutdown to
//! process signals.
//!
//! End-to-end tests start an [`App`] through the `ingest-test` crate.

mod app;
mod middleware;
mod server;

pub use app::App;
pub use server::server;

//! The storage layer of the ingest service.
//!
//! This crate persists [`Item`]s as individual JSON objects in a blob store and reads them back.
//! Every upload is written under a freshly generated key of the form `<folder>/<token>.json` and
//! is never overwritten, which makes the stored folder an append-only log of items.
//!
//! The entry point is [`ItemStore`], which wraps one of the storage backends selected through
//! [`StorageConfig`]:
//!
//! - Azure Blob Storage, talking to the REST API directly,
//! - a local filesystem directory, for development and single-host setups,
//! - an in-memory map, for tests.
//!
//! It is designed as a library crate to be used by the `ingest-server`.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod backend;
mod error;
mod item;
mod service;

pub use error::{ServiceError, ServiceResult};
pub use item::{InvalidItemError, Item};
pub use service::{ItemStore, StorageConfig, UploadReceipt};

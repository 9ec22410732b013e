//! Storage backends for the [`ItemStore`](crate::ItemStore).
//!
//! All backends implement the [`Backend`] trait. Use [`BoxedBackend`] to hold any of them.

mod azure_blob;
mod common;
pub mod credential;
mod in_memory;
mod local_fs;

pub use azure_blob::AzureBlobBackend;
pub use common::*;
pub use in_memory::{CallCounts, InMemoryBackend};
pub use local_fs::LocalFsBackend;

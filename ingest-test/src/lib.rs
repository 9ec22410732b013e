//! Test utilities for the ingest server.
//!
//! This crate provides utilities to run the ingest server in-process from integration tests. See
//! the modules for all available utilities.

pub mod server;
pub mod tracing;

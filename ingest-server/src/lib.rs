//! The ingest HTTP server.
//!
//! This builds on top of [`ingest_service`] and exposes item upload and retrieval as a JSON API.
//! The server is configured through [`config::Config`] and started with [`web::server`].

pub mod cli;
pub mod config;
pub mod endpoints;
pub mod extractors;
pub mod healthcheck;
pub mod observability;
pub mod state;
pub mod web;

//! The `ingest` binary.
//!
//! Run `ingest run` to start the HTTP server. See [`ingest_server::cli`] for all commands.

fn main() -> anyhow::Result<()> {
    ingest_server::cli::execute()
}

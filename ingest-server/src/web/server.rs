use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal::unix::SignalKind;

use crate::config::Config;
use crate::state::{ServiceState, State};
use crate::web::app::App;

/// Pending connections queued by the kernel before new ones are refused.
const TCP_LISTEN_BACKLOG: u32 = 1024;

/// Runs the ingest HTTP server until a termination signal arrives.
///
/// The item store is set up before the listener is bound, so a broken storage configuration fails
/// startup without accepting a single connection. On SIGTERM, SIGINT, SIGHUP or SIGQUIT the
/// readiness check starts failing, the listener closes and in-flight requests run to completion.
pub async fn server(config: Config) -> Result<()> {
    let state = State::new(config)
        .await
        .context("failed to initialize storage")?;
    let addr = state.config.http_addr;
    let listener = listen(addr).with_context(|| format!("failed to listen on {addr}"))?;
    tracing::info!(folder = state.store.folder(), "HTTP server listening on {addr}");

    let app = App::new(state.clone());
    let server_handle = tokio::spawn(async move {
        // Holding the guard keeps the departure waiting until the last response is sent.
        let guard = elegant_departure::get_shutdown_guard();
        app.serve(listener, guard.wait_owned()).await
    });
    tokio::spawn(drain_on_shutdown(state));

    elegant_departure::tokio::depart()
        .on_termination()
        .on_sigint()
        .on_signal(SignalKind::hangup())
        .on_signal(SignalKind::quit())
        .await;

    let server_result = server_handle.await.map_err(From::from).flatten();
    tracing::info!("Shutdown complete");
    server_result
}

async fn drain_on_shutdown(state: ServiceState) {
    elegant_departure::get_shutdown_guard().wait().await;
    state.begin_drain();
    tracing::info!("Shutting down, waiting for in-flight requests");
}

fn listen(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    // Allows a replacement process to bind the port while this one is still draining.
    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(TCP_LISTEN_BACKLOG)
}

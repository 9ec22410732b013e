use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing};

use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route("/health", routing::get(health))
        .route("/ready", routing::get(ready))
}

/// Liveness: answers as long as the server accepts requests.
async fn health() -> &'static str {
    "OK"
}

/// Readiness: fails once a termination signal was received.
async fn ready(State(state): State<ServiceState>) -> (StatusCode, &'static str) {
    if state.is_draining() {
        tracing::debug!("Draining, failing readiness");
        return (StatusCode::SERVICE_UNAVAILABLE, "Shutting down");
    }

    (StatusCode::OK, "OK")
}

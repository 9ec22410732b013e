use axum::extract::State;
use axum::{Json, Router, routing};
use ingest_service::Item;
use serde::{Deserialize, Serialize};

use crate::endpoints::common::ApiResult;
use crate::extractors::Xt;
use crate::state::ServiceState;

/// The text served at the root path.
pub const GREETING: &str = "Hello to Demo App!!!";

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route("/", routing::get(greeting))
        .route("/upload", routing::post(upload))
        .route("/read", routing::get(read))
}

async fn greeting() -> &'static str {
    GREETING
}

/// Response returned when uploading an item.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
}

async fn upload(
    State(state): State<ServiceState>,
    Xt(item): Xt<Item>,
) -> ApiResult<Json<UploadResponse>> {
    let receipt = state.store.upload(&item).await?;
    tracing::info!(key = %receipt.key, "stored item");

    let message = format!(
        "Data uploaded successfully with filename {} in folder {}",
        receipt.filename, receipt.folder
    );
    Ok(Json(UploadResponse { message }))
}

async fn read(State(state): State<ServiceState>) -> ApiResult<Json<Vec<serde_json::Value>>> {
    let records = state.store.read_all().await?;
    Ok(Json(records))
}

use axum::Json;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header;
use ingest_service::Item;

use crate::endpoints::common::ApiError;
use crate::extractors::Xt;
use crate::state::ServiceState;

/// Extracts a validated [`Item`] from a JSON request body.
///
/// Bodies without a `Content-Type` are parsed as JSON. A declared type other than JSON is rejected
/// with `415 Unsupported Media Type`. Unknown fields are ignored.
impl FromRequest<ServiceState> for Xt<Item> {
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &ServiceState) -> Result<Self, Self::Rejection> {
        let Json(item) = if request.headers().contains_key(header::CONTENT_TYPE) {
            Json::<Item>::from_request(request, state).await?
        } else {
            let body = Bytes::from_request(request, state).await?;
            Json::<Item>::from_bytes(&body)?
        };
        item.validate()?;

        sentry::configure_scope(|s| s.set_tag("item.name", &item.name));
        Ok(Xt(item))
    }
}

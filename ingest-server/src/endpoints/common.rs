//! Common types and utilities for API endpoints.

use std::error::Error;

use axum::Json;
use axum::extract::rejection::{BytesRejection, JsonRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ingest_service::{InvalidItemError, ServiceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body is not a JSON document of the expected shape.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    ReadBody(#[from] BytesRejection),

    /// The request body has the right shape, but its contents are not acceptable.
    #[error("invalid item: {0}")]
    InvalidItem(#[from] InvalidItemError),

    /// Server errors, indicating that something went wrong when executing a request.
    #[error("server error: {0}")]
    Server(#[source] Box<dyn Error + Send + Sync>),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Server(Box::new(err))
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// A JSON error response returned by the API.
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiErrorResponse {
    /// The main error message.
    #[serde(default)]
    pub detail: Option<String>,
    /// Chain of error causes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ApiErrorResponse {
    /// Creates an error response from an error, extracting the full cause chain.
    pub fn from_error<E: Error + ?Sized>(error: &E) -> Self {
        let detail = Some(error.to_string());

        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(s) = source {
            causes.push(s.to_string());
            source = s.source();
        }

        Self { detail, causes }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidBody(rejection) => {
                tracing::debug!(error = &self as &dyn Error, "rejected request body");
                rejection.status()
            }
            ApiError::ReadBody(rejection) => {
                tracing::debug!(error = &self as &dyn Error, "failed to read request body");
                rejection.status()
            }
            ApiError::InvalidItem(_) => {
                tracing::debug!(error = &self as &dyn Error, "rejected item");
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Server(_) => {
                tracing::error!(error = &self as &dyn Error, "error handling request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ApiErrorResponse::from_error(&self);
        (status, Json(body)).into_response()
    }
}

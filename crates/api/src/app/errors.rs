//! Consistent error responses.
//!
//! Every failure leaves the service as `{"error": <code>, "message": <text>}`.
//! Internal failures (store, counter) are logged in full and answered with a
//! generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use stockgate_admission::GateError;
use stockgate_core::ProductId;
use stockgate_inventory::LedgerError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Body could not be decoded into the expected shape.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Reserve touched zero rows (short on stock, or no such product).
    #[error("insufficient stock for product {0}")]
    InsufficientStock(ProductId),

    #[error("product {0} not found")]
    NotFound(ProductId),

    /// Path segment that is not a positive integer; the route does not exist.
    #[error("no such resource: {0:?}")]
    UnknownResource(String),

    #[error("too many concurrent requests")]
    AdmissionRejected,

    #[error("admission gate unavailable: {0}")]
    GateUnavailable(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => ApiError::NotFound(id),
            LedgerError::Storage(msg) => ApiError::Storage(msg),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Rejected { .. } => ApiError::AdmissionRejected,
            GateError::Unavailable(msg) => ApiError::GateUnavailable(msg),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedInput(_) | ApiError::InsufficientStock(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::UnknownResource(_) => StatusCode::NOT_FOUND,
            ApiError::AdmissionRejected => StatusCode::TOO_MANY_REQUESTS,
            ApiError::GateUnavailable(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MalformedInput(_) => "malformed_input",
            ApiError::InsufficientStock(_) => "insufficient_stock",
            ApiError::NotFound(_) | ApiError::UnknownResource(_) => "not_found",
            ApiError::AdmissionRejected => "too_many_requests",
            ApiError::GateUnavailable(_) | ApiError::Storage(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        json_error(status, self.code(), message)
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

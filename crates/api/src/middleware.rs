//! Request pipeline stages wrapped around handlers.
//!
//! Each stage is a plain `axum::middleware` function; the router composes them
//! explicitly (`route_layer` for admission, `ServiceBuilder` for the rest).

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use stockgate_admission::AdmissionGate;

use crate::app::errors::ApiError;

/// Admission stage for the order path.
///
/// Rejected callers never reach the handler. Admitted callers release their
/// slot once the handler has produced a response, whatever the outcome. If the
/// request future is dropped (client gone) or the handler panics, the permit's
/// `Drop` returns the slot instead.
pub async fn admission(State(gate): State<AdmissionGate>, req: Request, next: Next) -> Response {
    let permit = match gate.admit().await {
        Ok(permit) => permit,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let response = next.run(req).await;
    permit.release().await;
    response
}

/// Response-shaping stage: every response is labelled as JSON unless the
/// handler already set a content type.
pub async fn json_content_type(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .entry(header::CONTENT_TYPE)
        .or_insert(HeaderValue::from_static("application/json"));
    response
}

//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: which ledger / counter store back the API
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs and body decoding
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let gate = services.gate().clone();

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router(gate))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::json_content_type))
                .layer(Extension(services)),
        )
}

use axum::Router;

use stockgate_admission::AdmissionGate;

pub mod store;
pub mod system;

/// Router for the store endpoints.
pub fn router(gate: AdmissionGate) -> Router {
    Router::new().nest("/store", store::router(gate))
}

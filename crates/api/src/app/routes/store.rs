use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path},
    routing::{get, post},
};

use stockgate_admission::AdmissionGate;
use stockgate_core::ProductId;
use stockgate_inventory::Product;

use crate::app::{dto, errors::ApiError, services::AppServices};
use crate::middleware;

/// `/add`, `/order` and `/:product_id`; only `/order` passes the admission gate.
pub fn router(gate: AdmissionGate) -> Router {
    Router::new()
        .route("/add", post(add))
        .route(
            "/order",
            post(order).route_layer(axum::middleware::from_fn_with_state(
                gate,
                middleware::admission,
            )),
        )
        .route("/:product_id", get(get_product))
}

pub async fn add(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> Result<Json<dto::AddResponse>, ApiError> {
    let req: dto::StockRequest = dto::decode(&body)?;

    let replenished = services
        .ledger()
        .replenish(req.product_id, req.quantity)
        .await?;

    tracing::info!(
        product_id = %req.product_id,
        added = %req.quantity,
        level = replenished.quantity,
        "stock replenished"
    );
    Ok(Json(replenished.into()))
}

/// Runs behind the admission gate; the body is only decoded once admitted.
pub async fn order(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> Result<Json<dto::OrderResponse>, ApiError> {
    let req: dto::StockRequest = dto::decode(&body)?;

    let rows_affected = services
        .ledger()
        .reserve(req.product_id, req.quantity)
        .await?;

    if rows_affected == 0 {
        tracing::info!(product_id = %req.product_id, requested = %req.quantity, "order rejected: insufficient stock");
        return Err(ApiError::InsufficientStock(req.product_id));
    }

    Ok(Json(dto::OrderResponse { rows_affected }))
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(raw_id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let id: ProductId = raw_id
        .parse()
        .map_err(|_| ApiError::UnknownResource(raw_id))?;

    let product = services.ledger().find_by_id(id).await?;
    Ok(Json(product))
}

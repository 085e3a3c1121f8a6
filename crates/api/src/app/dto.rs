use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use stockgate_core::{ProductId, Quantity};
use stockgate_inventory::Replenished;

use crate::app::errors::ApiError;

// -------------------------
// Request DTOs
// -------------------------

/// Body of both `POST /store/add` and `POST /store/order`.
///
/// `id` is accepted as an alias of `product_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StockRequest {
    #[serde(alias = "id")]
    pub product_id: ProductId,
    pub quantity: Quantity,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddResponse {
    pub rows_affected: u64,
    pub quantity: i64,
}

impl From<Replenished> for AddResponse {
    fn from(r: Replenished) -> Self {
        Self {
            rows_affected: r.rows_affected,
            quantity: r.quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderResponse {
    pub rows_affected: u64,
}

/// Decode a JSON body regardless of the request's `Content-Type`.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::MalformedInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_both_id_spellings() {
        let a: StockRequest = decode(br#"{"product_id": 7, "quantity": 10}"#).unwrap();
        let b: StockRequest = decode(br#"{"id": 7, "quantity": 10}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.product_id.get(), 7);
    }

    #[test]
    fn rejects_bad_bodies() {
        for body in [
            &b""[..],
            b"not json",
            br#"{"product_id": 7}"#,
            br#"{"product_id": 7, "quantity": 0}"#,
            br#"{"product_id": -1, "quantity": 2}"#,
            br#"{"product_id": "7", "quantity": 2}"#,
        ] {
            assert!(
                matches!(decode::<StockRequest>(body), Err(ApiError::MalformedInput(_))),
                "{:?} should be malformed",
                String::from_utf8_lossy(body)
            );
        }
    }
}

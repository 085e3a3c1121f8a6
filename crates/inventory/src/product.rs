use serde::{Deserialize, Serialize};

use stockgate_core::ProductId;

/// A ledger row: how much of a product is currently on hand.
///
/// `quantity` is never negative. Rows are created by the first replenish and
/// are never deleted by this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub quantity: i64,
}

impl Product {
    pub fn new(id: ProductId, quantity: i64) -> Self {
        Self { id, quantity }
    }
}

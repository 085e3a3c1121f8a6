//! Stock ledger boundary.
//!
//! Both mutating operations must be atomic with respect to each other on the
//! same product. Implementations get this from the backing store's own
//! conditional update (a single statement), never from a read in application
//! code followed by a write.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use stockgate_core::{ProductId, Quantity};

use crate::product::Product;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger failure.
///
/// Insufficient stock is deliberately absent: `reserve` reports it as zero
/// affected rows.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Outcome of a successful replenish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replenished {
    /// Always 1 for an upsert that went through.
    pub rows_affected: u64,
    /// Stock level after the increment.
    pub quantity: i64,
}

/// The persistent quantity-per-product record and its operations.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Upsert: create the row with `quantity`, or add `quantity` to the existing level.
    async fn replenish(&self, id: ProductId, quantity: Quantity) -> LedgerResult<Replenished>;

    /// Decrement by `quantity` only if at least `quantity` is on hand.
    ///
    /// Returns the number of rows updated: 1 when the stock was taken, 0 when
    /// the product is missing or short. Errors are reserved for store failures.
    async fn reserve(&self, id: ProductId, quantity: Quantity) -> LedgerResult<u64>;

    /// Point lookup. A missing row is `LedgerError::NotFound`, never a zeroed record.
    async fn find_by_id(&self, id: ProductId) -> LedgerResult<Product>;
}

#[async_trait]
impl<S> StockLedger for Arc<S>
where
    S: StockLedger + ?Sized,
{
    async fn replenish(&self, id: ProductId, quantity: Quantity) -> LedgerResult<Replenished> {
        (**self).replenish(id, quantity).await
    }

    async fn reserve(&self, id: ProductId, quantity: Quantity) -> LedgerResult<u64> {
        (**self).reserve(id, quantity).await
    }

    async fn find_by_id(&self, id: ProductId) -> LedgerResult<Product> {
        (**self).find_by_id(id).await
    }
}

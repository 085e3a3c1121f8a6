use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use stockgate_core::{ProductId, Quantity};
use stockgate_inventory::{LedgerError, LedgerResult, Product, Replenished, StockLedger};

/// In-memory stock ledger for tests/dev.
///
/// Stands in for the relational store: each operation's condition and
/// mutation run under one write lock, the same all-or-nothing step a single
/// SQL statement gives.
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    inner: RwLock<HashMap<ProductId, i64>>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> LedgerError {
        LedgerError::Storage("in-memory ledger lock poisoned".to_string())
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn replenish(&self, id: ProductId, quantity: Quantity) -> LedgerResult<Replenished> {
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        let level = map.entry(id).or_insert(0);
        *level = level
            .checked_add(quantity.get())
            .ok_or_else(|| LedgerError::Storage(format!("quantity overflow for product {id}")))?;
        Ok(Replenished {
            rows_affected: 1,
            quantity: *level,
        })
    }

    async fn reserve(&self, id: ProductId, quantity: Quantity) -> LedgerResult<u64> {
        let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
        match map.get_mut(&id) {
            Some(level) if *level >= quantity.get() => {
                *level -= quantity.get();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn find_by_id(&self, id: ProductId) -> LedgerResult<Product> {
        let map = self.inner.read().map_err(|_| Self::poisoned())?;
        map.get(&id)
            .map(|&quantity| Product::new(id, quantity))
            .ok_or(LedgerError::NotFound(id))
    }
}

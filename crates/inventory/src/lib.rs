//! Inventory domain: the stock ledger contract.
//!
//! This crate only describes the ledger (record shape, operations, errors).
//! Storage-backed implementations live in `stockgate-infra`.

pub mod ledger;
pub mod product;

pub use ledger::{LedgerError, LedgerResult, Replenished, StockLedger};
pub use product::Product;

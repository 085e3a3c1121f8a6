//! Stock ledger implementations.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStockLedger;
pub use postgres::PostgresStockLedger;

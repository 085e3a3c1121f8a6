//! Infrastructure layer: Postgres ledger, Redis counter, in-memory doubles.

pub mod counter;
pub mod ledger;

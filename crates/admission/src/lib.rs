//! Admission control for the order path.
//!
//! A counting gate backed by a shared, named counter. The counter lives behind
//! the [`CounterStore`] boundary so the same gate runs against Redis in
//! production and an in-process map in tests.

pub mod counter;
pub mod gate;

pub use counter::{CounterError, CounterStore, InMemoryCounterStore};
pub use gate::{AdmissionGate, GateError, Permit};

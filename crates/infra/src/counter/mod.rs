//! Counter store implementations.
//!
//! The in-process store ships with `stockgate-admission`; this module adds the
//! Redis-backed one used when several processes share one admission counter.

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "redis")]
pub use self::redis::RedisCounterStore;

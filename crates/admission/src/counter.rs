//! Shared counter boundary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CounterError {
    #[error("counter store connection error: {0}")]
    Connection(String),

    #[error("counter store command error: {0}")]
    Command(String),
}

/// Atomic named integers.
///
/// `incr`/`decr` return the value *after* the operation and must be atomic
/// against concurrent callers on the same key. Keys that were never written
/// read as 0.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn incr(&self, key: &str) -> Result<i64, CounterError>;
    async fn decr(&self, key: &str) -> Result<i64, CounterError>;
    async fn get(&self, key: &str) -> Result<i64, CounterError>;
    /// Set the key back to 0.
    async fn reset(&self, key: &str) -> Result<(), CounterError>;
}

#[async_trait]
impl<S> CounterStore for Arc<S>
where
    S: CounterStore + ?Sized,
{
    async fn incr(&self, key: &str) -> Result<i64, CounterError> {
        (**self).incr(key).await
    }

    async fn decr(&self, key: &str) -> Result<i64, CounterError> {
        (**self).decr(key).await
    }

    async fn get(&self, key: &str) -> Result<i64, CounterError> {
        (**self).get(key).await
    }

    async fn reset(&self, key: &str) -> Result<(), CounterError> {
        (**self).reset(key).await
    }
}

/// In-process counter store for tests/dev (single node only).
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    inner: Mutex<HashMap<String, i64>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, key: &str, delta: i64) -> Result<i64, CounterError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CounterError::Command("counter map poisoned".to_string()))?;
        let value = map.entry(key.to_string()).or_insert(0);
        *value += delta;
        Ok(*value)
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr(&self, key: &str) -> Result<i64, CounterError> {
        self.add(key, 1)
    }

    async fn decr(&self, key: &str) -> Result<i64, CounterError> {
        self.add(key, -1)
    }

    async fn get(&self, key: &str) -> Result<i64, CounterError> {
        self.add(key, 0)
    }

    async fn reset(&self, key: &str) -> Result<(), CounterError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CounterError::Command("counter map poisoned".to_string()))?;
        map.insert(key.to_string(), 0);
        Ok(())
    }
}

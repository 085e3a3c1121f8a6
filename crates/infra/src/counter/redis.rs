//! Redis-backed counter store.
//!
//! `INCR`/`DECR` are atomic on the Redis server and return the new value,
//! which is exactly the contract the admission gate needs. One counter key
//! can be shared by every process pointing at the same Redis database.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::instrument;

use stockgate_admission::{CounterError, CounterStore};

/// Counter store over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl core::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect to Redis.
    ///
    /// * `redis_url` - e.g. `redis://redis-server:6379/0`
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, CounterError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CounterError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CounterError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }
}

fn command_error(err: redis::RedisError) -> CounterError {
    if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        CounterError::Connection(err.to_string())
    } else {
        CounterError::Command(err.to_string())
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    #[instrument(skip(self), err)]
    async fn incr(&self, key: &str) -> Result<i64, CounterError> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1i64).await.map_err(command_error)
    }

    #[instrument(skip(self), err)]
    async fn decr(&self, key: &str) -> Result<i64, CounterError> {
        let mut conn = self.conn.clone();
        conn.decr(key, 1i64).await.map_err(command_error)
    }

    async fn get(&self, key: &str) -> Result<i64, CounterError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn.get(key).await.map_err(command_error)?;
        Ok(value.unwrap_or(0))
    }

    #[instrument(skip(self), err)]
    async fn reset(&self, key: &str) -> Result<(), CounterError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, 0i64).await.map_err(command_error)
    }
}

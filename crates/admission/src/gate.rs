//! Counting admission gate.
//!
//! `admit` increments the shared counter and inspects the post-increment
//! value. Above the limit the increment is undone and the caller is turned
//! away; otherwise the caller gets a [`Permit`] that owes exactly one
//! decrement.
//!
//! ## Known race
//!
//! Increment, check and undo are three separate store operations, not a
//! compare-and-swap. Under a burst the raw counter can briefly read above the
//! limit (by at most the number of callers racing between increment and undo),
//! and a caller may be turned away while another is mid-undo. The number of
//! callers actually holding a permit never exceeds the limit: every holder's
//! own post-increment value was within it.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::counter::{CounterError, CounterStore};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Too many requests in flight. The caller's own increment has already been undone.
    #[error("admission rejected: {in_flight} in flight, limit {limit}")]
    Rejected { in_flight: i64, limit: i64 },

    /// The counter store could not be reached; callers must fail closed.
    #[error("admission gate unavailable: {0}")]
    Unavailable(String),
}

impl From<CounterError> for GateError {
    fn from(err: CounterError) -> Self {
        GateError::Unavailable(err.to_string())
    }
}

/// Bounds the number of concurrent operations sharing one counter key.
#[derive(Clone)]
pub struct AdmissionGate {
    counter: Arc<dyn CounterStore>,
    key: Arc<str>,
    limit: i64,
}

impl core::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("key", &self.key)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl AdmissionGate {
    /// Create a gate. A limit of 0 is raised to 1.
    pub fn new(counter: Arc<dyn CounterStore>, key: impl Into<String>, limit: u32) -> Self {
        Self {
            counter,
            key: Arc::from(key.into()),
            limit: i64::from(limit.max(1)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Zero the counter. Called once at startup before serving traffic.
    pub async fn reset(&self) -> Result<(), GateError> {
        self.counter.reset(&self.key).await?;
        Ok(())
    }

    /// Current raw counter value.
    pub async fn in_flight(&self) -> Result<i64, GateError> {
        Ok(self.counter.get(&self.key).await?)
    }

    #[instrument(skip(self), fields(key = %self.key, limit = self.limit))]
    pub async fn admit(&self) -> Result<Permit, GateError> {
        let in_flight = match self.counter.incr(&self.key).await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "admission counter increment failed");
                return Err(e.into());
            }
        };

        // From here on the increment is owned by a permit, so a cancelled
        // caller still gets it undone.
        let permit = Permit {
            counter: self.counter.clone(),
            key: self.key.clone(),
            in_flight,
            released: false,
        };

        if in_flight > self.limit {
            permit.release().await;
            info!(in_flight, "admission rejected");
            return Err(GateError::Rejected {
                in_flight,
                limit: self.limit,
            });
        }

        debug!(in_flight, "admitted");
        Ok(permit)
    }
}

/// Proof of admission. Owes exactly one decrement of the gate counter.
///
/// Call [`Permit::release`] on the normal path. A permit dropped without it
/// (panic, cancelled request future) schedules the decrement on the Tokio
/// runtime from `Drop`.
#[must_use = "a permit must be released or the gate leaks a slot until it is dropped"]
pub struct Permit {
    counter: Arc<dyn CounterStore>,
    key: Arc<str>,
    in_flight: i64,
    released: bool,
}

impl core::fmt::Debug for Permit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Permit")
            .field("key", &self.key)
            .field("in_flight", &self.in_flight)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Permit {
    /// Counter value observed right after this permit's increment.
    pub fn in_flight(&self) -> i64 {
        self.in_flight
    }

    /// Give the slot back.
    ///
    /// The decrement runs as a spawned task, so dropping this future part way
    /// through neither skips it nor repeats it.
    pub async fn release(mut self) {
        self.released = true;
        match spawn_decrement(self.counter.clone(), self.key.clone()) {
            Some(task) => {
                let _ = task.await;
            }
            None => decrement(self.counter.as_ref(), &self.key).await,
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if spawn_decrement(self.counter.clone(), self.key.clone()).is_none() {
            error!(key = %self.key, "permit dropped outside a Tokio runtime; admission slot leaked");
        }
    }
}

fn spawn_decrement(counter: Arc<dyn CounterStore>, key: Arc<str>) -> Option<JoinHandle<()>> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    Some(handle.spawn(async move { decrement(counter.as_ref(), &key).await }))
}

async fn decrement(counter: &dyn CounterStore, key: &str) {
    match counter.decr(key).await {
        Ok(in_flight) => debug!(key, in_flight, "admission slot released"),
        Err(e) => error!(key, error = %e, "failed to release admission slot"),
    }
}

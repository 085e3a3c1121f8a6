//! Service wiring: which ledger and which counter store back the API.

use std::sync::Arc;

use thiserror::Error;

use stockgate_admission::{AdmissionGate, GateError, InMemoryCounterStore};
use stockgate_infra::counter::RedisCounterStore;
use stockgate_infra::ledger::{InMemoryStockLedger, PostgresStockLedger};
use stockgate_inventory::{LedgerError, StockLedger};

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("database connection failed: {0}")]
    Database(String),

    #[error("counter store connection failed: {0}")]
    Counter(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Gate(#[from] GateError),
}

#[derive(Clone)]
enum Backend {
    InMemory,
    Persistent { ledger: PostgresStockLedger },
}

/// Everything a handler needs: the stock ledger and the order admission gate.
#[derive(Clone)]
pub struct AppServices {
    ledger: Arc<dyn StockLedger>,
    gate: AdmissionGate,
    backend: Backend,
}

impl AppServices {
    /// Wire arbitrary implementations (tests inject failing or slow doubles).
    pub fn new(ledger: Arc<dyn StockLedger>, gate: AdmissionGate) -> Self {
        Self {
            ledger,
            gate,
            backend: Backend::InMemory,
        }
    }

    /// In-memory ledger + in-memory counter.
    pub fn in_memory(admission_limit: u32, admission_key: &str) -> Self {
        let gate = AdmissionGate::new(
            Arc::new(InMemoryCounterStore::new()),
            admission_key,
            admission_limit,
        );
        Self::new(Arc::new(InMemoryStockLedger::new()), gate)
    }

    pub fn ledger(&self) -> &dyn StockLedger {
        self.ledger.as_ref()
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn is_persistent(&self) -> bool {
        !matches!(self.backend, Backend::InMemory)
    }

    /// Release external resources (database pool).
    pub async fn shutdown(&self) {
        match &self.backend {
            Backend::InMemory => {}
            Backend::Persistent { ledger } => ledger.close().await,
        }
    }
}

/// Postgres + Redis when `USE_PERSISTENT_STORES=true`, in-memory stores otherwise.
///
/// A persistent setup that cannot connect is an error; there is no silent
/// fallback to process-local stores.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, ServicesError> {
    if config.use_persistent_stores {
        return build_persistent_services(config).await;
    }

    tracing::warn!("USE_PERSISTENT_STORES not set, using in-memory ledger and counter");
    let services = AppServices::in_memory(config.admission_limit, &config.admission_key);
    services.gate().reset().await?;
    Ok(services)
}

async fn build_persistent_services(config: &AppConfig) -> Result<AppServices, ServicesError> {
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    let pool = PgPoolOptions::new()
        .max_connections(config.pg_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .map_err(|e| ServicesError::Database(e.to_string()))?;

    let ledger = PostgresStockLedger::new(pool);
    ledger.ensure_schema().await?;

    let counter = RedisCounterStore::connect(&config.redis_url)
        .await
        .map_err(|e| ServicesError::Counter(e.to_string()))?;

    let gate = AdmissionGate::new(
        Arc::new(counter),
        config.admission_key.clone(),
        config.admission_limit,
    );
    // Start from zero; a crashed predecessor may have left permits behind.
    gate.reset().await?;

    tracing::info!("using Postgres ledger and Redis admission counter");

    Ok(AppServices {
        ledger: Arc::new(ledger.clone()),
        gate,
        backend: Backend::Persistent { ledger },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_builds_in_memory_services() {
        let services = build_services(&AppConfig::default()).await.unwrap();
        assert!(!services.is_persistent());
        assert_eq!(services.gate().limit(), 3);
        assert_eq!(services.gate().key(), "rlk");
        assert_eq!(services.gate().in_flight().await.unwrap(), 0);
        services.shutdown().await;
    }

    #[tokio::test]
    async fn persistent_request_with_bad_database_fails_startup() {
        let config = AppConfig {
            use_persistent_stores: true,
            database_url: "not a postgres dsn".to_string(),
            ..AppConfig::default()
        };
        match build_services(&config).await {
            Err(ServicesError::Database(_)) => {}
            Err(other) => panic!("expected a database error, got {other}"),
            Ok(_) => panic!("persistent stores must not fall back to in-memory"),
        }
    }
}

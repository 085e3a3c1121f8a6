//! Configuration from environment variables.
//!
//! Empty values count as unset. Every variable has a default suited to the
//! docker-compose layout (`postgres` / `redis-server` hostnames).

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_ADMISSION_LIMIT: u32 = 3;
pub const DEFAULT_ADMISSION_KEY: &str = "rlk";
pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    /// Postgres + Redis when true, in-memory stores otherwise.
    pub use_persistent_stores: bool,
    pub database_url: String,
    pub pg_max_connections: u32,
    pub redis_url: String,
    /// Maximum concurrent order requests.
    pub admission_limit: u32,
    /// Name of the shared admission counter.
    pub admission_key: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(v) => parse_value("PORT", &v)?,
            None => match get("CONTAINER_PORT") {
                Some(v) => parse_value("CONTAINER_PORT", &v)?,
                None => DEFAULT_PORT,
            },
        };

        let use_persistent_stores = match get("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool("USE_PERSISTENT_STORES", &v)?,
            None => false,
        };

        let database_url = match get("DATABASE_URL") {
            Some(url) => url,
            None => {
                let host = get("PG_HOST").unwrap_or_else(|| "postgres".to_string());
                let port: u16 = match get("PG_PORT") {
                    Some(v) => parse_value("PG_PORT", &v)?,
                    None => 5432,
                };
                let user = get("PG_USER").unwrap_or_else(|| "postgres".to_string());
                let password = get("PG_PASSWORD").unwrap_or_default();
                let db = get("PG_DB").unwrap_or_else(|| "postgres".to_string());
                format!("postgres://{user}:{password}@{host}:{port}/{db}")
            }
        };

        let pg_max_connections = match get("PG_MAX_CONNECTIONS") {
            Some(v) => parse_positive("PG_MAX_CONNECTIONS", &v)?,
            None => DEFAULT_PG_MAX_CONNECTIONS,
        };

        let redis_url = match get("REDIS_URL") {
            Some(url) => url,
            None => {
                let host = get("REDIS_HOST").unwrap_or_else(|| "redis-server".to_string());
                let port: u16 = match get("REDIS_PORT") {
                    Some(v) => parse_value("REDIS_PORT", &v)?,
                    None => 6379,
                };
                let db: u32 = match get("REDIS_DB") {
                    Some(v) => parse_value("REDIS_DB", &v)?,
                    None => 0,
                };
                format!("redis://{host}:{port}/{db}")
            }
        };

        let admission_limit = match get("ADMISSION_LIMIT") {
            Some(v) => parse_positive("ADMISSION_LIMIT", &v)?,
            None => DEFAULT_ADMISSION_LIMIT,
        };

        let admission_key = get("ADMISSION_KEY").unwrap_or_else(|| DEFAULT_ADMISSION_KEY.to_string());

        Ok(Self {
            port,
            use_persistent_stores,
            database_url,
            pg_max_connections,
            redis_url,
            admission_limit,
            admission_key,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            use_persistent_stores: false,
            database_url: "postgres://postgres:@postgres:5432/postgres".to_string(),
            pg_max_connections: DEFAULT_PG_MAX_CONNECTIONS,
            redis_url: "redis://redis-server:6379/0".to_string(),
            admission_limit: DEFAULT_ADMISSION_LIMIT,
            admission_key: DEFAULT_ADMISSION_KEY.to_string(),
        }
    }
}

fn parse_value<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_positive(var: &'static str, value: &str) -> Result<u32, ConfigError> {
    let n: u32 = parse_value(var, value)?;
    if n == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(n)
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

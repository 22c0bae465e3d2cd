//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::search::EngineSettings;
use crate::search::cache::DEFAULT_CAPACITY;
use crate::search::engine::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Path to the tables file (default: ./tables.yml).
    pub tables_config: PathBuf,

    /// Rows per page when a request gives none (default: 10).
    pub default_page_size: u32,

    /// Largest page size a request may ask for (default: 100).
    pub max_page_size: u32,

    /// Statement timeout for every data source transaction (default: 10s).
    pub statement_timeout: Duration,

    /// Result cache TTL; zero disables the cache (default: 0).
    pub cache_ttl: Duration,

    /// Maximum cached results per table (default: 1000).
    pub cache_capacity: u64,
}

fn var_or<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("{name} must be a valid {}", std::any::type_name::<T>()))
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = var_or("PORT", "3000")?;

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = var_or("DATABASE_MAX_CONNECTIONS", "10")?;

        let tables_config = env::var("TABLES_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./tables.yml"));

        let default_page_size =
            var_or("SEARCH_DEFAULT_PAGE_SIZE", &DEFAULT_PAGE_SIZE.to_string())?;
        let max_page_size = var_or("SEARCH_MAX_PAGE_SIZE", &MAX_PAGE_SIZE.to_string())?;

        let statement_timeout =
            Duration::from_secs(var_or("SEARCH_STATEMENT_TIMEOUT_SECS", "10")?);
        let cache_ttl = Duration::from_secs(var_or("SEARCH_CACHE_TTL_SECS", "0")?);
        let cache_capacity = var_or("SEARCH_CACHE_CAPACITY", &DEFAULT_CAPACITY.to_string())?;

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            tables_config,
            default_page_size,
            max_page_size,
            statement_timeout,
            cache_ttl,
            cache_capacity,
        })
    }

    /// Paging limits for every engine.
    pub fn engine_settings(&self) -> EngineSettings {
        let max_page_size = self.max_page_size.max(1);
        EngineSettings {
            default_page_size: self.default_page_size.clamp(1, max_page_size),
            max_page_size,
        }
    }

    pub fn cache_enabled(&self) -> bool {
        !self.cache_ttl.is_zero()
    }
}

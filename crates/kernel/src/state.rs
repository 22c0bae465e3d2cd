//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::registry::TableRegistry;
use crate::search::SearchCache;
use crate::source::{DataSource, PgSource};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// One search engine per configured table.
    registry: TableRegistry,

    /// Data source every engine reads from.
    source: Arc<dyn DataSource>,

    /// Optional read-through result cache.
    cache: Option<SearchCache>,
}

impl AppState {
    /// Connect to PostgreSQL and build the table registry.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config)
            .await
            .context("failed to create database pool")?;
        let source: Arc<dyn DataSource> = Arc::new(PgSource::new(pool, config.statement_timeout));

        let registry =
            TableRegistry::from_file(&config.tables_config, source.clone(), config.engine_settings())
                .context("failed to load table registry")?;

        let cache = config.cache_enabled().then(|| {
            info!(
                ttl_secs = config.cache_ttl.as_secs(),
                capacity = config.cache_capacity,
                "search cache enabled"
            );
            SearchCache::new(config.cache_ttl, config.cache_capacity)
        });

        Ok(Self::from_parts(registry, source, cache))
    }

    /// Assemble state from already-built parts.
    pub fn from_parts(
        registry: TableRegistry,
        source: Arc<dyn DataSource>,
        cache: Option<SearchCache>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                registry,
                source,
                cache,
            }),
        }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.inner.registry
    }

    pub fn cache(&self) -> Option<&SearchCache> {
        self.inner.cache.as_ref()
    }

    /// Whether the data source is reachable.
    pub async fn source_healthy(&self) -> bool {
        self.inner.source.is_healthy().await
    }
}

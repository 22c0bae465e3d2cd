//! Read-through cache in front of search engines.
//!
//! Results are cached per table, keyed by the full request. Writes to a
//! table must call [`SearchCache::invalidate_table`]; nothing is inferred.
//! The engine itself stays stateless.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moka::future::Cache;
use tracing::debug;

use super::engine::SearchEngine;
use super::error::SearchError;
use super::types::{SearchRequest, SearchResult};

/// Default maximum cached results per table.
pub const DEFAULT_CAPACITY: u64 = 1_000;

/// Per-table result cache.
#[derive(Clone)]
pub struct SearchCache {
    inner: Arc<SearchCacheInner>,
}

struct SearchCacheInner {
    tables: DashMap<String, Cache<SearchRequest, Arc<SearchResult>>>,
    ttl: Duration,
    capacity: u64,
}

impl SearchCache {
    /// Create a cache whose entries live for `ttl`, at most `capacity` per table.
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        Self {
            inner: Arc::new(SearchCacheInner {
                tables: DashMap::new(),
                ttl,
                capacity,
            }),
        }
    }

    fn new_table_cache(&self) -> Cache<SearchRequest, Arc<SearchResult>> {
        Cache::builder()
            .max_capacity(self.inner.capacity)
            .time_to_live(self.inner.ttl)
            .build()
    }

    fn table_cache(&self, table: &str) -> Cache<SearchRequest, Arc<SearchResult>> {
        // moka caches are cheap handles; clone out so no DashMap guard is held across awaits.
        self.inner
            .tables
            .entry(table.to_string())
            .or_insert_with(|| self.new_table_cache())
            .clone()
    }

    /// Cached result for `request`, running the search on a miss.
    ///
    /// Errors are never cached. A result is stored in the cache handle taken
    /// before the search started, so a search racing an invalidation lands
    /// in the discarded cache.
    pub async fn get_or_search(
        &self,
        engine: &SearchEngine,
        request: &SearchRequest,
    ) -> Result<Arc<SearchResult>, SearchError> {
        let table = engine.config().table_name.as_str();
        let cache = self.table_cache(table);

        if let Some(hit) = cache.get(request).await {
            debug!(table = %table, "search cache hit");
            return Ok(hit);
        }

        let result = Arc::new(engine.search(request).await?);
        cache.insert(request.clone(), result.clone()).await;
        debug!(table = %table, "search cache miss, stored");
        Ok(result)
    }

    /// Drop every cached result for `table`.
    ///
    /// The table gets a fresh cache; searches still in flight keep writing to
    /// the old one, which nothing reads any more.
    pub fn invalidate_table(&self, table: &str) {
        let previous = self
            .inner
            .tables
            .insert(table.to_string(), self.new_table_cache());
        if let Some(previous) = previous {
            previous.invalidate_all();
            debug!(table = %table, "search cache invalidated");
        }
    }

    /// Entries currently held for `table`.
    pub async fn entry_count(&self, table: &str) -> u64 {
        let Some(cache) = self.inner.tables.get(table).map(|c| c.clone()) else {
            return 0;
        };
        cache.run_pending_tasks().await;
        cache.entry_count()
    }
}

//! Configuration-driven search executor.
//!
//! One [`SearchEngine`] serves one [`TableConfig`]. A call classifies the
//! term, ORs together the conditions every field contributes, ANDs the
//! optional status filter, then takes one of two paths:
//!
//! - **direct**: filter, sort and window pushed to the data source in a
//!   single request; the source counts the matches
//! - **materialize**: for derived sort keys only; every matching row is
//!   fetched, enriched, sorted and sliced in memory
//!
//! Both paths append the primary key ascending as a tie-break, so equal
//! sort keys page deterministically.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use super::classifier::{ClassifiedTerm, classify};
use super::condition::{FilterValue, Predicate, build_condition};
use super::enrich::enrich;
use super::error::{ConfigError, SearchError, SourceStage};
use super::foreign_key;
use super::types::{
    AppliedFilters, EchoedSort, Pagination, SearchRequest, SearchResult, SortDirection, SortPath,
    TableConfig,
};
use crate::source::compare::{directed, sort_order};
use crate::source::{DataSource, FetchRequest, Row};

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Maximum rows per page unless a table overrides it.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Engine-wide paging limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

/// Sort resolved for one call.
struct ResolvedSort<'a> {
    field: &'a str,
    direction: SortDirection,
    path: SortPath,
}

/// Search executor for one table.
///
/// Holds only the validated config and a handle to the data source, so
/// concurrent calls need no locking.
#[derive(Clone)]
pub struct SearchEngine {
    config: Arc<TableConfig>,
    source: Arc<dyn DataSource>,
    settings: EngineSettings,
}

impl SearchEngine {
    /// Validate `config` and build an engine over `source`.
    pub fn new(config: TableConfig, source: Arc<dyn DataSource>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            source,
            settings: EngineSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Largest page size this table accepts.
    pub fn max_page_size(&self) -> u32 {
        self.config
            .max_page_size
            .unwrap_or(self.settings.max_page_size)
            .max(1)
    }

    /// Run one search. Returns a complete page or an error, never a partial page.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult, SearchError> {
        let started = Instant::now();
        let config = self.config.as_ref();

        let page = request.page.max(1);
        let requested_size = if request.page_size == 0 {
            self.settings.default_page_size
        } else {
            request.page_size
        };
        let page_size = requested_size.clamp(1, self.max_page_size());
        let offset = u64::from(page - 1) * u64::from(page_size);

        let term = classify(&request.term, config);
        let search_predicate = self.search_predicate(&term).await?;

        let status = self.status_filter(request.status.as_deref());
        let predicate = match (search_predicate, &status) {
            (Some(search), Some((column, value))) => {
                Some(search.and(Predicate::equals(column, FilterValue::String(value.clone()))))
            }
            (None, Some((column, value))) => {
                Some(Predicate::equals(column, FilterValue::String(value.clone())))
            }
            (search, None) => search,
        };

        let sort = self.resolve_sort(request);
        let base = FetchRequest::new(&config.table_name)
            .columns(self.fetch_columns())
            .joins(config.joins.clone())
            .filter(predicate);

        let (rows, total) = match sort.path {
            SortPath::Direct => self.fetch_direct(base, &sort, offset, page_size).await?,
            SortPath::Materialize => self.fetch_materialized(base, &sort, offset, page_size).await?,
        };

        info!(
            table = %config.table_name,
            path = ?sort.path,
            sort = %sort.field,
            total,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search completed"
        );

        Ok(SearchResult {
            rows,
            pagination: Pagination::new(total, page, page_size),
            filters: AppliedFilters {
                search: (!term.is_empty()).then(|| term.raw_value.clone()),
                status: status.map(|(_, value)| value),
            },
            sort: EchoedSort {
                field: sort.field.to_string(),
                direction: sort.direction,
            },
        })
    }

    /// OR of every field's contribution, or `None` for an empty term.
    async fn search_predicate(
        &self,
        term: &ClassifiedTerm,
    ) -> Result<Option<Predicate>, SearchError> {
        if term.is_empty() {
            return Ok(None);
        }

        let mut branches: Vec<Predicate> = self
            .config
            .search_fields
            .iter()
            .map(|field| build_condition(field, term))
            .filter(|parts| !parts.is_empty())
            .map(Predicate::all)
            .collect();
        branches.extend(foreign_key::resolve_all(self.source.as_ref(), &self.config, term).await?);

        debug!(
            table = %self.config.table_name,
            kind = ?term.kind,
            branches = branches.len(),
            "built search predicate"
        );
        // No branch at all means nothing can match: an empty OR is false.
        Ok(Some(Predicate::any(branches)))
    }

    /// Status column and canonical value, if a status filter applies.
    fn status_filter(&self, status: Option<&str>) -> Option<(String, String)> {
        let status = status.map(str::trim).filter(|s| !s.is_empty())?;
        let Some(column) = self.config.resolved_status_column() else {
            debug!(
                table = %self.config.table_name,
                "status filter ignored: table has no status column"
            );
            return None;
        };
        let canonical = self
            .config
            .status_fields()
            .find(|f| f.name == column)
            .and_then(|f| f.canonical_enum_value(status))
            .unwrap_or(status);
        Some((column.to_string(), canonical.to_string()))
    }

    /// Requested sort if the table can sort by it, else the default sort.
    fn resolve_sort<'a>(&'a self, request: &'a SearchRequest) -> ResolvedSort<'a> {
        let direction = request
            .sort_direction
            .unwrap_or(self.config.default_sort_direction);

        let requested = request
            .sort_field
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());
        if let Some(field) = requested {
            if let Some(path) = self.config.sort_path(field) {
                return ResolvedSort {
                    field,
                    direction,
                    path,
                };
            }
            debug!(
                table = %self.config.table_name,
                field,
                "unknown sort field, using default"
            );
        }

        let field = self.config.effective_default_sort();
        ResolvedSort {
            field,
            direction,
            path: self.config.sort_path(field).unwrap_or(SortPath::Direct),
        }
    }

    /// Declared select columns plus the primary key, which enrichment and
    /// the tie-break need.
    fn fetch_columns(&self) -> Vec<String> {
        let mut columns = self.config.select_columns.clone();
        if !columns.is_empty() && !columns.contains(&self.config.primary_key) {
            columns.push(self.config.primary_key.clone());
        }
        columns
    }

    async fn fetch_direct(
        &self,
        base: FetchRequest,
        sort: &ResolvedSort<'_>,
        offset: u64,
        page_size: u32,
    ) -> Result<(Vec<Row>, u64), SearchError> {
        let mut request = base.order_by(sort.field, sort.direction);
        if sort.field != self.config.primary_key {
            request = request.order_by(&self.config.primary_key, SortDirection::Asc);
        }
        let request = request.range(offset, u64::from(page_size));

        let page = self
            .source
            .fetch_page(&request)
            .await
            .map_err(SearchError::at(SourceStage::DirectFetch, &self.config.table_name))?;
        Ok((page.rows, page.total))
    }

    async fn fetch_materialized(
        &self,
        base: FetchRequest,
        sort: &ResolvedSort<'_>,
        offset: u64,
        page_size: u32,
    ) -> Result<(Vec<Row>, u64), SearchError> {
        let mut rows = self.source.fetch_all(&base).await.map_err(SearchError::at(
            SourceStage::MaterializeFetch,
            &self.config.table_name,
        ))?;

        if let Some(derived) = self.config.derived_sorts.get(sort.field) {
            enrich(
                self.source.as_ref(),
                &self.config.primary_key,
                sort.field,
                derived,
                &mut rows,
            )
            .await?;
        }

        let key = &self.config.primary_key;
        rows.sort_by(|a, b| {
            directed(sort_order(a.get(sort.field), b.get(sort.field)), sort.direction)
                .then_with(|| sort_order(a.get(key), b.get(key)))
        });

        let total = rows.len() as u64;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(rows.len());
        let end = start.saturating_add(page_size as usize).min(rows.len());
        let page: Vec<Row> = rows.drain(start..end).collect();
        debug!(
            table = %self.config.table_name,
            total,
            "materialized and sliced rows"
        );
        Ok((page, total))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::search::types::{AggregateFunction, DerivedSort, FieldDefinition};
    use crate::source::{MemorySource, SourceCall};
    use serde_json::json;

    fn config() -> TableConfig {
        TableConfig::new("items", "id")
            .field(FieldDefinition::text("name", "Name"))
            .field(FieldDefinition::status("state", "State", &["Open", "Closed"]))
            .default_sort("name", SortDirection::Asc)
            .derived_sort(
                "part_count",
                DerivedSort::Aggregate {
                    table: "parts".to_string(),
                    foreign_column: "item_id".to_string(),
                    function: AggregateFunction::Count,
                    column: None,
                },
            )
    }

    fn source() -> Arc<MemorySource> {
        Arc::new(
            MemorySource::new()
                .with_table(
                    "items",
                    vec![
                        json!({"id": 1, "name": "bolt", "state": "Open"}),
                        json!({"id": 2, "name": "axle", "state": "Closed"}),
                        json!({"id": 3, "name": "cog", "state": "Open"}),
                        json!({"id": 4, "name": "axle", "state": "Open"}),
                    ],
                )
                .with_table(
                    "parts",
                    vec![
                        json!({"id": 1, "item_id": 3}),
                        json!({"id": 2, "item_id": 3}),
                        json!({"id": 3, "item_id": 1}),
                    ],
                ),
        )
    }

    fn engine(source: Arc<MemorySource>) -> SearchEngine {
        SearchEngine::new(config(), source).unwrap()
    }

    fn ids(result: &SearchResult) -> Vec<i64> {
        result
            .rows
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = TableConfig::new("items", "id").field(FieldDefinition {
            enum_values: Vec::new(),
            ..FieldDefinition::status("state", "State", &[])
        });
        assert!(matches!(
            SearchEngine::new(config, source()),
            Err(ConfigError::EmptyEnumValues { .. })
        ));
    }

    #[tokio::test]
    async fn page_and_size_are_clamped() {
        let engine = engine(source());
        let result = engine
            .search(&SearchRequest::new("").page(0).page_size(1000))
            .await
            .unwrap();
        assert_eq!(result.pagination.page, 1);
        assert_eq!(result.pagination.page_size, MAX_PAGE_SIZE);

        let result = engine.search(&SearchRequest::new("")).await.unwrap();
        assert_eq!(result.pagination.page_size, DEFAULT_PAGE_SIZE);
    }

    #[tokio::test]
    async fn ties_break_on_primary_key() {
        let engine = engine(source());
        let result = engine.search(&SearchRequest::new("")).await.unwrap();
        assert_eq!(ids(&result), vec![2, 4, 1, 3]);
    }

    #[tokio::test]
    async fn status_filter_is_canonicalised_and_anded() {
        let engine = engine(source());
        let result = engine
            .search(&SearchRequest::new("axle").status("open"))
            .await
            .unwrap();
        assert_eq!(ids(&result), vec![4]);
        assert_eq!(result.filters.status.as_deref(), Some("Open"));
        assert_eq!(result.filters.search.as_deref(), Some("axle"));
    }

    #[tokio::test]
    async fn unknown_sort_falls_back_to_default() {
        let engine = engine(source());
        let result = engine
            .search(&SearchRequest::new("").sort("nope; drop", SortDirection::Desc))
            .await
            .unwrap();
        assert_eq!(result.sort.field, "name");
        assert_eq!(result.sort.direction, SortDirection::Desc);
        assert_eq!(ids(&result), vec![3, 1, 2, 4]);
    }

    #[tokio::test]
    async fn derived_sort_takes_materialize_path() {
        let source = source();
        let engine = engine(source.clone());
        let result = engine
            .search(&SearchRequest::new("").sort("part_count", SortDirection::Desc).page_size(2))
            .await
            .unwrap();

        assert_eq!(ids(&result), vec![3, 1]);
        assert_eq!(result.rows[0]["part_count"], json!(2));
        assert_eq!(result.pagination.total_count, 4);
        assert!(
            source
                .calls()
                .iter()
                .all(|call| matches!(call, SourceCall::All { .. }))
        );
    }

    #[tokio::test]
    async fn plain_sort_takes_direct_path() {
        let source = source();
        let engine = engine(source.clone());
        engine
            .search(&SearchRequest::new("").page(2).page_size(3))
            .await
            .unwrap();
        assert_eq!(
            source.calls(),
            vec![SourceCall::Page {
                table: "items".to_string(),
                offset: 3,
                limit: 3
            }]
        );
    }

    #[tokio::test]
    async fn term_matching_no_field_matches_nothing() {
        let engine = engine(source());
        let result = engine.search(&SearchRequest::new("42")).await.unwrap();
        assert!(result.rows.is_empty());
        assert_eq!(result.pagination.total_count, 0);
    }

    #[tokio::test]
    async fn source_failure_propagates() {
        let source = source();
        source.fail_table("items");
        let err = engine(source).search(&SearchRequest::new("")).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::DataSource {
                stage: SourceStage::DirectFetch,
                ..
            }
        ));
    }
}

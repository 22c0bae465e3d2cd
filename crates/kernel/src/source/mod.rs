//! Tabular data sources.
//!
//! The engine never talks to storage directly. It issues declarative
//! [`FetchRequest`]s (predicate tree, sort, optional range) against a
//! [`DataSource`]:
//!
//! - [`MemorySource`]: rows held in memory, for tests and demos
//! - [`PgSource`]: PostgreSQL via SeaQuery-generated SQL and sqlx
//!
//! Connection management, timeouts and retries belong to the source.

pub(crate) mod compare;
mod memory;
mod postgres;

pub use memory::{MemorySource, SourceCall};
pub use postgres::{PgSource, SelectBuilder};

use async_trait::async_trait;
use thiserror::Error;

use crate::search::{JoinDefinition, Predicate, SortDirection};

/// One row as a JSON object. Joined columns use `alias.column` keys.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("data source error: {0}")]
    Backend(String),
}

/// Ordering term of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

/// Window of rows to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub offset: u64,
    pub limit: u64,
}

/// Declarative retrieval request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Primary table.
    pub table: String,
    /// Primary-table columns to return; empty returns all.
    pub columns: Vec<String>,
    /// Joined tables; their selected columns come back as `alias.column`.
    pub joins: Vec<JoinDefinition>,
    /// Row filter; `None` returns every row.
    pub predicate: Option<Predicate>,
    /// Ordering, most significant first.
    pub sort: Vec<SortSpec>,
    /// Window; `None` returns every matching row.
    pub range: Option<RowRange>,
}

impl FetchRequest {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            joins: Vec::new(),
            predicate: None,
            sort: Vec::new(),
            range: None,
        }
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn joins(mut self, joins: Vec<JoinDefinition>) -> Self {
        self.joins = joins;
        self
    }

    pub fn filter(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn order_by(mut self, column: &str, direction: SortDirection) -> Self {
        self.sort.push(SortSpec {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn range(mut self, offset: u64, limit: u64) -> Self {
        self.range = Some(RowRange { offset, limit });
        self
    }
}

/// Rows of one window plus the total matching count.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub rows: Vec<Row>,
    pub total: u64,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Filtered, sorted, range-limited retrieval with the total match count.
    async fn fetch_page(&self, request: &FetchRequest) -> Result<Page, SourceError>;

    /// Every matching row, ignoring `request.range`.
    async fn fetch_all(&self, request: &FetchRequest) -> Result<Vec<Row>, SourceError>;

    /// Whether the source is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }
}

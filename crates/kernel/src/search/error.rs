//! Search engine error types.

use thiserror::Error;

use crate::source::SourceError;

/// Problems with a [`TableConfig`](super::TableConfig), detected before any search runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("table '{table}': foreign-key field '{field}' is missing {missing}")]
    IncompleteForeignKey {
        table: String,
        field: String,
        missing: &'static str,
    },

    #[error("table '{table}': status field '{field}' has no enum values")]
    EmptyEnumValues { table: String, field: String },

    #[error("table '{table}': join alias '{alias}' is declared more than once")]
    DuplicateJoinAlias { table: String, alias: String },

    #[error("table '{table}': default sort field '{field}' is not a sortable column")]
    UnknownDefaultSort { table: String, field: String },

    #[error("table '{table}': '{name}' is not a valid identifier")]
    InvalidIdentifier { table: String, name: String },

    #[error("table '{table}': derived sort '{field}' {reason}")]
    InvalidDerivedSort {
        table: String,
        field: String,
        reason: String,
    },

    #[error("table '{0}' is registered more than once")]
    DuplicateTable(String),
}

/// Stage of a search call that talked to the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStage {
    ForeignKeyLookup,
    DirectFetch,
    MaterializeFetch,
    Enrichment,
}

impl std::fmt::Display for SourceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SourceStage::ForeignKeyLookup => "foreign-key lookup",
            SourceStage::DirectFetch => "direct fetch",
            SourceStage::MaterializeFetch => "materialize fetch",
            SourceStage::Enrichment => "enrichment",
        };
        f.write_str(name)
    }
}

/// Failure of a search call. Nothing is retried or swallowed.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("data source failed during {stage} on '{table}'")]
    DataSource {
        stage: SourceStage,
        table: String,
        #[source]
        source: SourceError,
    },
}

impl SearchError {
    pub(crate) fn at(stage: SourceStage, table: &str) -> impl FnOnce(SourceError) -> Self {
        let table = table.to_string();
        move |source| SearchError::DataSource {
            stage,
            table,
            source,
        }
    }
}

//! Configurable search, filter and pagination engine.
//!
//! This module provides:
//! - Types: TableConfig, FieldDefinition, JoinDefinition, SearchRequest, SearchResult
//! - classify: infers the shape of a search term
//! - build_condition: turns a field plus a term into column predicates
//! - foreign_key: resolves foreign-key fields through their foreign tables
//! - SearchEngine: executes searches on the direct or materialize path
//! - SearchCache: optional read-through cache in front of engines

pub mod cache;
mod classifier;
mod condition;
pub mod engine;
mod enrich;
mod error;
pub mod foreign_key;
pub mod types;

pub use cache::SearchCache;
pub use classifier::{ClassifiedTerm, DateRange, TermKind, classify, classify_at};
pub use condition::{FilterValue, Predicate, build_condition, format_instant};
pub use engine::{EngineSettings, SearchEngine};
pub use enrich::enrich;
pub use error::{ConfigError, SearchError, SourceStage};
pub use types::{
    AggregateFunction, AppliedFilters, DerivedSort, EchoedSort, FieldDefinition, FieldType,
    JoinCondition, JoinDefinition, JoinKind, LookupHop, Pagination, SearchRequest, SearchResult,
    SortDirection, SortPath, TableConfig, is_safe_identifier, is_safe_qualified_name,
};

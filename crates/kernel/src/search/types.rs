//! Search engine types.
//!
//! Provides the declarative description the engine executes against:
//! - TableConfig: searchable fields, joins, default and derived sorts
//! - FieldDefinition: one searchable column and how a term applies to it
//! - SearchRequest / SearchResult: per-call input and output

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::source::Row;

/// Maximum length of a PostgreSQL identifier.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Semantic type of a searchable field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Substring match.
    Text,
    /// Equality against the raw term, whatever its shape.
    Exact,
    /// Equality against a numeric term.
    Number,
    /// Range match against a date term.
    Date,
    /// Closed set of canonical values.
    Status,
    /// true/false, yes/no, 1/0.
    Boolean,
    /// Search target lives in another table.
    ForeignKey,
    /// Declared only; produces no predicate.
    Json,
    /// Declared only; produces no predicate.
    Array,
}

/// One searchable column of a table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDefinition {
    /// Column name, or `alias.column` for a joined column.
    pub name: String,

    /// Semantic type.
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Display label.
    #[serde(default)]
    pub label: String,

    /// Text fields only: match case-sensitively.
    #[serde(default)]
    pub case_sensitive: bool,

    /// Status fields: canonical values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,

    /// Status fields: extra literal values that force a status interpretation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exact_match_keywords: Vec<String>,

    /// Date fields: additional chrono formats a term may be written in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_formats: Vec<String>,

    /// Foreign-key fields: table holding the searchable values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_table: Option<String>,

    /// Foreign-key fields: column of `foreign_table` this field references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key_column: Option<String>,

    /// Foreign-key fields: columns of `foreign_table` searched for the term.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_columns: Vec<String>,
}

impl FieldDefinition {
    fn new(name: &str, label: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            label: label.to_string(),
            case_sensitive: false,
            enum_values: Vec::new(),
            exact_match_keywords: Vec::new(),
            date_formats: Vec::new(),
            foreign_table: None,
            foreign_key_column: None,
            search_columns: Vec::new(),
        }
    }

    pub fn text(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldType::Text)
    }

    pub fn exact(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldType::Exact)
    }

    pub fn number(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldType::Number)
    }

    pub fn date(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldType::Date)
    }

    pub fn boolean(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldType::Boolean)
    }

    /// Status field with its canonical values.
    pub fn status(name: &str, label: &str, values: &[&str]) -> Self {
        let mut field = Self::new(name, label, FieldType::Status);
        field.enum_values = values.iter().map(|v| v.to_string()).collect();
        field
    }

    /// Foreign-key field: `name` holds keys of `table.key_column`, and the
    /// term is matched against `search_columns` of `table`.
    pub fn foreign_key(
        name: &str,
        label: &str,
        table: &str,
        key_column: &str,
        search_columns: &[&str],
    ) -> Self {
        let mut field = Self::new(name, label, FieldType::ForeignKey);
        field.foreign_table = Some(table.to_string());
        field.foreign_key_column = Some(key_column.to_string());
        field.search_columns = search_columns.iter().map(|c| c.to_string()).collect();
        field
    }

    /// Match this text field case-sensitively.
    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    /// Add exact-match keywords to a status field.
    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.exact_match_keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Add accepted chrono date formats to a date field.
    pub fn with_date_formats(mut self, formats: &[&str]) -> Self {
        self.date_formats = formats.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Canonical enum value matching `term` case-insensitively.
    pub fn canonical_enum_value(&self, term: &str) -> Option<&str> {
        self.enum_values
            .iter()
            .find(|v| v.eq_ignore_ascii_case(term))
            .map(String::as_str)
    }

    /// Configured keyword matching `term` case-insensitively.
    pub fn matching_keyword(&self, term: &str) -> Option<&str> {
        self.exact_match_keywords
            .iter()
            .find(|k| k.eq_ignore_ascii_case(term))
            .map(String::as_str)
    }
}

/// Join kinds supported between the primary table and a joined table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    #[default]
    Left,
}

/// Equality join condition: `primary.local_column = alias.foreign_column`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinCondition {
    pub local_column: String,
    pub foreign_column: String,
}

/// Table joined onto every query of a [`TableConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinDefinition {
    /// Joined table.
    pub table: String,

    /// Alias, unique within the table config. Joined columns are exposed as `alias.column`.
    pub alias: String,

    /// Join condition.
    pub join_condition: JoinCondition,

    /// Join kind.
    #[serde(default)]
    pub join_kind: JoinKind,

    /// Columns of the joined table to select.
    #[serde(default)]
    pub select_columns: Vec<String>,
}

impl JoinDefinition {
    /// Left join `table` as `alias` on `primary.local_column = alias.foreign_column`.
    pub fn left(table: &str, alias: &str, local_column: &str, foreign_column: &str) -> Self {
        Self {
            table: table.to_string(),
            alias: alias.to_string(),
            join_condition: JoinCondition {
                local_column: local_column.to_string(),
                foreign_column: foreign_column.to_string(),
            },
            join_kind: JoinKind::Left,
            select_columns: Vec::new(),
        }
    }

    /// Same as [`JoinDefinition::left`] but dropping unmatched rows.
    pub fn inner(table: &str, alias: &str, local_column: &str, foreign_column: &str) -> Self {
        Self {
            join_kind: JoinKind::Inner,
            ..Self::left(table, alias, local_column, foreign_column)
        }
    }

    /// Columns to select from the joined table.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.select_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Whether `column` is selected from this join.
    pub fn selects(&self, column: &str) -> bool {
        self.select_columns.iter().any(|c| c == column)
    }
}

/// Aggregate functions for derived sort keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
}

/// One step of a lookup chain: `row[local_column] = table.key_column`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LookupHop {
    pub local_column: String,
    pub table: String,
    pub key_column: String,
}

/// Sort key that only exists after combining rows across tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivedSort {
    /// Aggregate over rows of `table` whose `foreign_column` equals the row's primary key.
    Aggregate {
        table: String,
        foreign_column: String,
        function: AggregateFunction,
        /// Aggregated column; ignored for `count`.
        #[serde(default)]
        column: Option<String>,
    },
    /// Value of `column` reached by following `hops` from the row.
    Lookup { hops: Vec<LookupHop>, column: String },
}

/// How a sort field is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortPath {
    /// Sort, filter and range pushed down to the data source in one request.
    Direct,
    /// All matching rows fetched, enriched, sorted and sliced in memory.
    Materialize,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse `asc`/`desc` case-insensitively; anything else is ascending.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("asc"),
            SortDirection::Desc => f.write_str("desc"),
        }
    }
}

/// Declarative description of one searchable table.
///
/// Constructed once, validated, then shared read-only between calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableConfig {
    /// Primary table.
    pub table_name: String,

    /// Primary key column; also the tie-break sort key.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Searchable fields, in declaration order.
    #[serde(default)]
    pub search_fields: Vec<FieldDefinition>,

    /// Sort field used when the caller gives none.
    #[serde(default)]
    pub default_sort_field: Option<String>,

    /// Direction used with the default sort field.
    #[serde(default)]
    pub default_sort_direction: SortDirection,

    /// Columns of the primary table to select; empty selects all.
    #[serde(default)]
    pub select_columns: Vec<String>,

    /// Joined tables.
    #[serde(default)]
    pub joins: Vec<JoinDefinition>,

    /// Sort fields that need the materialize path.
    #[serde(default)]
    pub derived_sorts: BTreeMap<String, DerivedSort>,

    /// Column the status filter applies to; defaults to the first status field.
    #[serde(default)]
    pub status_column: Option<String>,

    /// Per-table cap on the page size.
    #[serde(default)]
    pub max_page_size: Option<u32>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl TableConfig {
    /// Create an empty config for `table_name` keyed by `primary_key`.
    pub fn new(table_name: &str, primary_key: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            primary_key: primary_key.to_string(),
            search_fields: Vec::new(),
            default_sort_field: None,
            default_sort_direction: SortDirection::Asc,
            select_columns: Vec::new(),
            joins: Vec::new(),
            derived_sorts: BTreeMap::new(),
            status_column: None,
            max_page_size: None,
        }
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.search_fields.push(field);
        self
    }

    pub fn join(mut self, join: JoinDefinition) -> Self {
        self.joins.push(join);
        self
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.select_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn default_sort(mut self, field: &str, direction: SortDirection) -> Self {
        self.default_sort_field = Some(field.to_string());
        self.default_sort_direction = direction;
        self
    }

    pub fn derived_sort(mut self, field: &str, sort: DerivedSort) -> Self {
        self.derived_sorts.insert(field.to_string(), sort);
        self
    }

    pub fn status_column(mut self, column: &str) -> Self {
        self.status_column = Some(column.to_string());
        self
    }

    pub fn max_page_size(mut self, max: u32) -> Self {
        self.max_page_size = Some(max);
        self
    }

    /// Join declared under `alias`.
    pub fn join_by_alias(&self, alias: &str) -> Option<&JoinDefinition> {
        self.joins.iter().find(|j| j.alias == alias)
    }

    /// Status fields of this table.
    pub fn status_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.search_fields
            .iter()
            .filter(|f| f.field_type == FieldType::Status)
    }

    /// Date fields of this table.
    pub fn date_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.search_fields
            .iter()
            .filter(|f| f.field_type == FieldType::Date)
    }

    /// Column targeted by the status filter.
    pub fn resolved_status_column(&self) -> Option<&str> {
        self.status_column
            .as_deref()
            .or_else(|| self.status_fields().next().map(|f| f.name.as_str()))
    }

    /// Sort field used when the caller gives none.
    pub fn effective_default_sort(&self) -> &str {
        self.default_sort_field
            .as_deref()
            .unwrap_or(&self.primary_key)
    }

    /// Whether `field` is a column the config declares: the primary key, a
    /// search field, a select column or a column selected from a join.
    ///
    /// An empty `select_columns` list fetches every column but does not make
    /// undeclared names sortable.
    pub fn is_direct_sortable(&self, field: &str) -> bool {
        if let Some((alias, column)) = field.split_once('.') {
            return self
                .join_by_alias(alias)
                .is_some_and(|join| join.selects(column));
        }
        if !is_safe_identifier(field) {
            return false;
        }
        field == self.primary_key
            || self.select_columns.iter().any(|c| c == field)
            || self.search_fields.iter().any(|f| f.name == field)
    }

    /// Whether rows fetched from the primary table carry `column`.
    pub fn fetches(&self, column: &str) -> bool {
        self.select_columns.is_empty()
            || column == self.primary_key
            || self.select_columns.iter().any(|c| c == column)
    }

    /// Execution path for `field`, or `None` if the table cannot sort by it.
    pub fn sort_path(&self, field: &str) -> Option<SortPath> {
        if self.derived_sorts.contains_key(field) {
            Some(SortPath::Materialize)
        } else if self.is_direct_sortable(field) {
            Some(SortPath::Direct)
        } else {
            None
        }
    }

    /// Check the config, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.problems().into_iter().next() {
            Some(problem) => Err(problem),
            None => Ok(()),
        }
    }

    /// Every problem with this config. Empty means valid.
    pub fn problems(&self) -> Vec<ConfigError> {
        let table = &self.table_name;
        let mut problems = Vec::new();
        let check_identifier = |name: &str, problems: &mut Vec<ConfigError>| {
            if !is_safe_identifier(name) {
                problems.push(ConfigError::InvalidIdentifier {
                    table: table.clone(),
                    name: name.to_string(),
                });
            }
        };

        check_identifier(self.table_name.as_str(), &mut problems);
        check_identifier(self.primary_key.as_str(), &mut problems);
        for column in &self.select_columns {
            check_identifier(column.as_str(), &mut problems);
        }

        let mut aliases = HashSet::new();
        for join in &self.joins {
            check_identifier(join.table.as_str(), &mut problems);
            check_identifier(join.alias.as_str(), &mut problems);
            check_identifier(join.join_condition.local_column.as_str(), &mut problems);
            check_identifier(join.join_condition.foreign_column.as_str(), &mut problems);
            for column in &join.select_columns {
                check_identifier(column.as_str(), &mut problems);
            }
            if !aliases.insert(join.alias.as_str()) {
                problems.push(ConfigError::DuplicateJoinAlias {
                    table: table.clone(),
                    alias: join.alias.clone(),
                });
            }
        }

        for field in &self.search_fields {
            if !is_safe_qualified_name(&field.name) {
                problems.push(ConfigError::InvalidIdentifier {
                    table: table.clone(),
                    name: field.name.clone(),
                });
            }
            match field.field_type {
                FieldType::Status if field.enum_values.is_empty() => {
                    problems.push(ConfigError::EmptyEnumValues {
                        table: table.clone(),
                        field: field.name.clone(),
                    });
                }
                FieldType::ForeignKey => {
                    let missing = if field.foreign_table.is_none() {
                        Some("foreign_table")
                    } else if field.foreign_key_column.is_none() {
                        Some("foreign_key_column")
                    } else if field.search_columns.is_empty() {
                        Some("search_columns")
                    } else {
                        None
                    };
                    if let Some(missing) = missing {
                        problems.push(ConfigError::IncompleteForeignKey {
                            table: table.clone(),
                            field: field.name.clone(),
                            missing,
                        });
                    }
                    let names = field
                        .foreign_table
                        .iter()
                        .chain(field.foreign_key_column.iter())
                        .chain(field.search_columns.iter());
                    for name in names {
                        check_identifier(name.as_str(), &mut problems);
                    }
                }
                _ => {}
            }
        }

        let unsortable_default = self
            .default_sort_field
            .as_ref()
            .filter(|sort| self.sort_path(sort).is_none());
        if let Some(sort) = unsortable_default {
            problems.push(ConfigError::UnknownDefaultSort {
                table: table.clone(),
                field: sort.clone(),
            });
        }

        for (field, derived) in &self.derived_sorts {
            let reason = match derived {
                DerivedSort::Aggregate {
                    table: target,
                    foreign_column,
                    function,
                    column,
                } => {
                    let mut names = vec![target.as_str(), foreign_column.as_str()];
                    names.extend(column.as_deref());
                    if *function != AggregateFunction::Count && column.is_none() {
                        Some("needs a column for its aggregate".to_string())
                    } else {
                        names
                            .into_iter()
                            .find(|n| !is_safe_identifier(n))
                            .map(|n| format!("references invalid identifier '{n}'"))
                    }
                }
                DerivedSort::Lookup { hops, column } => match hops.first() {
                    None => Some("has no lookup hops".to_string()),
                    Some(first) if !self.fetches(&first.local_column) => Some(format!(
                        "starts from column '{}', which is not selected",
                        first.local_column
                    )),
                    Some(_) => hops
                        .iter()
                        .flat_map(|h| [&h.local_column, &h.table, &h.key_column])
                        .chain(std::iter::once(column))
                        .find(|n| !is_safe_identifier(n))
                        .map(|n| format!("references invalid identifier '{n}'")),
                },
            };
            if let Some(reason) = reason {
                problems.push(ConfigError::InvalidDerivedSort {
                    table: table.clone(),
                    field: field.clone(),
                    reason,
                });
            }
        }

        problems
    }
}

/// Validate a SQL identifier (table/column/alias name).
/// Allows only `[a-zA-Z_][a-zA-Z0-9_]*` with max 63 chars (PostgreSQL limit).
pub fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
}

/// A plain identifier or `alias.column`.
pub fn is_safe_qualified_name(name: &str) -> bool {
    match name.split_once('.') {
        Some((alias, column)) => is_safe_identifier(alias) && is_safe_identifier(column),
        None => is_safe_identifier(name),
    }
}

/// Arguments of one search call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text term; empty means no filtering.
    pub term: String,
    /// 1-indexed page; clamped to at least 1.
    pub page: u32,
    /// Rows per page; clamped to `[1, max]`, 0 means the default size.
    pub page_size: u32,
    /// Exact-match filter on the status column.
    pub status: Option<String>,
    /// Sort field; falls back to the default sort field.
    pub sort_field: Option<String>,
    /// Sort direction; falls back to the default direction.
    pub sort_direction: Option<SortDirection>,
}

impl SearchRequest {
    pub fn new(term: &str) -> Self {
        Self {
            term: term.to_string(),
            page: 1,
            ..Default::default()
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn sort(mut self, field: &str, direction: SortDirection) -> Self {
        self.sort_field = Some(field.to_string());
        self.sort_direction = Some(direction);
        self
    }
}

/// Pagination block of a [`SearchResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Current page number (1-indexed).
    #[serde(rename = "currentPage")]
    pub page: u32,

    /// Rows per page.
    pub page_size: u32,

    /// Total matching rows (before paging).
    pub total_count: u64,

    /// Total number of pages.
    pub total_pages: u32,

    /// Whether there's a next page.
    pub has_next: bool,

    /// Whether there's a previous page.
    pub has_prev: bool,
}

impl Pagination {
    /// Create a pagination block with paging calculations.
    pub fn new(total_count: u64, page: u32, page_size: u32) -> Self {
        let total_pages = if page_size > 0 {
            total_count.div_ceil(u64::from(page_size)) as u32
        } else {
            1
        };

        Self {
            page,
            page_size,
            total_count,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Sort actually applied, echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoedSort {
    pub field: String,
    pub direction: SortDirection,
}

/// Filters actually applied, echoed back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedFilters {
    pub search: Option<String>,
    pub status: Option<String>,
}

/// Result of one search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub rows: Vec<Row>,
    pub pagination: Pagination,
    pub filters: AppliedFilters,
    pub sort: EchoedSort,
}

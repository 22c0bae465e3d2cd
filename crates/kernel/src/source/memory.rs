//! In-memory tabular data source.
//!
//! Evaluates fetch requests over rows held in memory: joins, predicate
//! trees, stable multi-key sorting and ranges. Every call is recorded so
//! tests can assert which retrieval path the engine took.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::compare::{compare_scalars, directed, sort_order, values_equal};
use super::{DataSource, FetchRequest, Page, Row, SourceError};
use crate::search::{JoinKind, Predicate};

/// Kind of retrieval recorded by [`MemorySource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    /// `fetch_page` on a table, with the requested offset and limit.
    Page {
        table: String,
        offset: u64,
        limit: u64,
    },
    /// `fetch_all` on a table.
    All { table: String },
}

impl SourceCall {
    pub fn table(&self) -> &str {
        match self {
            SourceCall::Page { table, .. } | SourceCall::All { table } => table,
        }
    }
}

/// Rows held in memory, keyed by table name.
#[derive(Default)]
pub struct MemorySource {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    calls: Mutex<Vec<SourceCall>>,
    failing: RwLock<HashSet<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `rows` to `table`. Non-object values are skipped.
    pub fn with_table(self, table: &str, rows: Vec<Value>) -> Self {
        self.insert(table, rows);
        self
    }

    /// Append rows to `table`, creating it if needed.
    pub fn insert(&self, table: &str, rows: Vec<Value>) {
        let rows = rows.into_iter().filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        });
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Number of rows in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    /// Make every request touching `table` fail.
    pub fn fail_table(&self, table: &str) {
        self.failing.write().insert(table.to_string());
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().clone()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    fn check_failing(&self, request: &FetchRequest) -> Result<(), SourceError> {
        let failing = self.failing.read();
        let touched = std::iter::once(&request.table).chain(request.joins.iter().map(|j| &j.table));
        for table in touched {
            if failing.contains(table) {
                return Err(SourceError::Backend(format!(
                    "simulated failure reading '{table}'"
                )));
            }
        }
        Ok(())
    }

    /// Joined, filtered and sorted rows (before range and projection).
    fn select(&self, request: &FetchRequest) -> Result<Vec<Row>, SourceError> {
        self.check_failing(request)?;
        let tables = self.tables.read();
        let base = tables
            .get(&request.table)
            .ok_or_else(|| SourceError::UnknownTable(request.table.clone()))?;

        let mut rows = Vec::with_capacity(base.len());
        'rows: for row in base {
            let mut joined = row.clone();
            for join in &request.joins {
                let target = tables
                    .get(&join.table)
                    .ok_or_else(|| SourceError::UnknownTable(join.table.clone()))?;
                let local = row.get(&join.join_condition.local_column);
                let matched = local.filter(|v| !v.is_null()).and_then(|local| {
                    target.iter().find(|candidate| {
                        candidate
                            .get(&join.join_condition.foreign_column)
                            .is_some_and(|v| values_equal(v, local))
                    })
                });
                if matched.is_none() && join.join_kind == JoinKind::Inner {
                    continue 'rows;
                }
                for column in &join.select_columns {
                    let value = matched
                        .and_then(|m| m.get(column))
                        .cloned()
                        .unwrap_or(Value::Null);
                    joined.insert(format!("{}.{column}", join.alias), value);
                }
            }
            let keep = request
                .predicate
                .as_ref()
                .is_none_or(|predicate| matches(predicate, &joined));
            if keep {
                rows.push(joined);
            }
        }

        if !request.sort.is_empty() {
            rows.sort_by(|a, b| {
                request
                    .sort
                    .iter()
                    .map(|spec| {
                        directed(
                            sort_order(a.get(&spec.column), b.get(&spec.column)),
                            spec.direction,
                        )
                    })
                    .find(|ord| ord.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        Ok(rows)
    }

    fn project(request: &FetchRequest, rows: Vec<Row>) -> Vec<Row> {
        if request.columns.is_empty() {
            return rows;
        }
        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .filter(|(key, _)| key.contains('.') || request.columns.contains(key))
                    .collect()
            })
            .collect()
    }
}

/// Evaluate `predicate` against one row.
fn matches(predicate: &Predicate, row: &Row) -> bool {
    match predicate {
        Predicate::Equals { column, value } => row
            .get(column)
            .is_some_and(|cell| values_equal(cell, &value.to_json())),
        Predicate::Contains {
            column,
            value,
            case_sensitive,
        } => row.get(column).and_then(cell_text).is_some_and(|text| {
            if *case_sensitive {
                text.contains(value.as_str())
            } else {
                text.to_lowercase().contains(&value.to_lowercase())
            }
        }),
        Predicate::GreaterOrEqual { column, value } => row
            .get(column)
            .and_then(|cell| compare_scalars(cell, &value.to_json()))
            .is_some_and(|ord| ord.is_ge()),
        Predicate::LessOrEqual { column, value } => row
            .get(column)
            .and_then(|cell| compare_scalars(cell, &value.to_json()))
            .is_some_and(|ord| ord.is_le()),
        Predicate::In { column, values } => row.get(column).is_some_and(|cell| {
            values
                .iter()
                .any(|value| values_equal(cell, &value.to_json()))
        }),
        Predicate::And(parts) => parts.iter().all(|p| matches(p, row)),
        Predicate::Or(parts) => parts.iter().any(|p| matches(p, row)),
    }
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn fetch_page(&self, request: &FetchRequest) -> Result<Page, SourceError> {
        let (offset, limit) = request
            .range
            .map_or((0, u64::MAX), |range| (range.offset, range.limit));
        self.calls.lock().push(SourceCall::Page {
            table: request.table.clone(),
            offset,
            limit,
        });

        let rows = self.select(request)?;
        let total = rows.len() as u64;
        let window: Vec<Row> = rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();

        Ok(Page {
            rows: Self::project(request, window),
            total,
        })
    }

    async fn fetch_all(&self, request: &FetchRequest) -> Result<Vec<Row>, SourceError> {
        self.calls.lock().push(SourceCall::All {
            table: request.table.clone(),
        });
        let rows = self.select(request)?;
        Ok(Self::project(request, rows))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::search::{FilterValue, JoinDefinition, SortDirection};
    use serde_json::json;

    fn source() -> MemorySource {
        MemorySource::new()
            .with_table(
                "users",
                vec![
                    json!({"id": 1, "name": "Alice Active"}),
                    json!({"id": 2, "name": "Bob"}),
                ],
            )
            .with_table(
                "divisions",
                vec![
                    json!({"id": 10, "name": "North", "status": "Active", "manager_id": 2, "headcount": 12}),
                    json!({"id": 11, "name": "South", "status": "Inactive", "manager_id": 1, "headcount": 4}),
                    json!({"id": 12, "name": "East", "status": "Active", "manager_id": null, "headcount": 30}),
                ],
            )
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().map(|r| r["id"].as_i64().unwrap()).collect()
    }

    #[tokio::test]
    async fn page_is_filtered_sorted_and_counted() {
        let source = source();
        let request = FetchRequest::new("divisions")
            .filter(Some(Predicate::equals(
                "status",
                FilterValue::String("Active".to_string()),
            )))
            .order_by("headcount", SortDirection::Desc)
            .range(0, 1);

        let page = source.fetch_page(&request).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(ids(&page.rows), vec![12]);
    }

    #[tokio::test]
    async fn left_join_exposes_qualified_columns() {
        let source = source();
        let request = FetchRequest::new("divisions")
            .joins(vec![
                JoinDefinition::left("users", "manager", "manager_id", "id").select(&["name"]),
            ])
            .order_by("manager.name", SortDirection::Asc);

        let rows = source.fetch_all(&request).await.unwrap();
        assert_eq!(ids(&rows), vec![11, 10, 12]);
        assert_eq!(rows[2]["manager.name"], Value::Null);
    }

    #[tokio::test]
    async fn inner_join_drops_unmatched_rows() {
        let source = source();
        let request = FetchRequest::new("divisions").joins(vec![
            JoinDefinition::inner("users", "manager", "manager_id", "id").select(&["name"]),
        ]);
        let rows = source.fetch_all(&request).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn contains_ignores_case_unless_asked() {
        let source = source();
        let insensitive = FetchRequest::new("users").filter(Some(Predicate::contains("name", "active")));
        assert_eq!(source.fetch_all(&insensitive).await.unwrap().len(), 1);

        let sensitive = FetchRequest::new("users").filter(Some(Predicate::Contains {
            column: "name".to_string(),
            value: "active".to_string(),
            case_sensitive: true,
        }));
        assert!(source.fetch_all(&sensitive).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_or_and_empty_in_match_nothing() {
        let source = source();
        let or = FetchRequest::new("users").filter(Some(Predicate::Or(vec![])));
        assert!(source.fetch_all(&or).await.unwrap().is_empty());
        let in_set = FetchRequest::new("users").filter(Some(Predicate::is_in("id", vec![])));
        assert!(source.fetch_all(&in_set).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn projection_keeps_requested_columns() {
        let source = source();
        let request = FetchRequest::new("users").columns(vec!["id".to_string()]);
        let rows = source.fetch_all(&request).await.unwrap();
        assert!(rows.iter().all(|r| r.len() == 1 && r.contains_key("id")));
    }

    #[tokio::test]
    async fn unknown_table_and_failures_are_errors() {
        let source = source();
        assert!(matches!(
            source.fetch_all(&FetchRequest::new("nope")).await,
            Err(SourceError::UnknownTable(_))
        ));

        source.fail_table("users");
        assert!(matches!(
            source.fetch_all(&FetchRequest::new("users")).await,
            Err(SourceError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn calls_are_recorded() {
        let source = source();
        source
            .fetch_page(&FetchRequest::new("users").range(10, 5))
            .await
            .unwrap();
        source.fetch_all(&FetchRequest::new("divisions")).await.unwrap();
        assert_eq!(
            source.calls(),
            vec![
                SourceCall::Page {
                    table: "users".to_string(),
                    offset: 10,
                    limit: 5
                },
                SourceCall::All {
                    table: "divisions".to_string()
                },
            ]
        );
        source.reset_calls();
        assert!(source.calls().is_empty());
    }
}

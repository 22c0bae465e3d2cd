//! Derived sort keys for the materialize path.
//!
//! A derived key only exists after combining rows across tables, so it is
//! computed in memory for every matching row and written into the row under
//! the sort field's name. Each table involved is read with one batched
//! `IN` request, never one request per row.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use super::condition::{FilterValue, Predicate};
use super::error::{SearchError, SourceStage};
use super::types::{AggregateFunction, DerivedSort, LookupHop};
use crate::source::compare::compare_scalars;
use crate::source::{DataSource, FetchRequest, Row};

/// Compute `derived` for every row and store it under `field`.
pub async fn enrich(
    source: &dyn DataSource,
    primary_key: &str,
    field: &str,
    derived: &DerivedSort,
    rows: &mut [Row],
) -> Result<(), SearchError> {
    let values = match derived {
        DerivedSort::Aggregate {
            table,
            foreign_column,
            function,
            column,
        } => {
            let keys: Vec<Option<Value>> = rows.iter().map(|r| r.get(primary_key).cloned()).collect();
            aggregate(source, &keys, table, foreign_column, *function, column.as_deref()).await?
        }
        DerivedSort::Lookup { hops, column } => lookup(source, rows, hops, column).await?,
    };

    for (row, value) in rows.iter_mut().zip(values) {
        row.insert(field.to_string(), value);
    }
    Ok(())
}

/// Normalised map key for a JSON scalar, so `3` and `3.0` collide.
fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => format!("n:{i}"),
            None => format!("n:{}", n.as_f64().unwrap_or_default()),
        }),
        Value::String(s) => Some(format!("s:{s}")),
        other => Some(other.to_string()),
    }
}

/// Distinct filter values of the non-null `values`, first-seen order.
pub(super) fn distinct_keys<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<FilterValue> {
    let mut seen = std::collections::HashSet::new();
    values
        .filter(|v| key_of(v).is_some_and(|k| seen.insert(k)))
        .filter_map(FilterValue::from_json)
        .collect()
}

async fn aggregate(
    source: &dyn DataSource,
    keys: &[Option<Value>],
    table: &str,
    foreign_column: &str,
    function: AggregateFunction,
    column: Option<&str>,
) -> Result<Vec<Value>, SearchError> {
    let wanted = distinct_keys(keys.iter().flatten());

    let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
    if !wanted.is_empty() {
        let mut columns = vec![foreign_column.to_string()];
        columns.extend(column.map(str::to_string));
        let request = FetchRequest::new(table)
            .columns(columns)
            .filter(Some(Predicate::is_in(foreign_column, wanted)));
        let related = source
            .fetch_all(&request)
            .await
            .map_err(SearchError::at(SourceStage::Enrichment, table))?;

        for row in related {
            let Some(key) = row.get(foreign_column).and_then(key_of) else {
                continue;
            };
            let value = column
                .and_then(|c| row.get(c).cloned())
                .unwrap_or(Value::Null);
            groups.entry(key).or_default().push(value);
        }
    }

    Ok(keys
        .iter()
        .map(|key| {
            let group = key
                .as_ref()
                .and_then(key_of)
                .and_then(|k| groups.get(&k))
                .map(Vec::as_slice)
                .unwrap_or_default();
            apply(function, group)
        })
        .collect())
}

/// Aggregate one group. Like SQL: COUNT of nothing is 0, the others are NULL,
/// and NULL inputs are ignored.
fn apply(function: AggregateFunction, group: &[Value]) -> Value {
    match function {
        AggregateFunction::Count => Value::from(group.len() as u64),
        AggregateFunction::Sum => {
            let numbers: Vec<&serde_json::Number> = group
                .iter()
                .filter_map(|v| match v {
                    Value::Number(n) => Some(n),
                    _ => None,
                })
                .collect();
            if numbers.is_empty() {
                return Value::Null;
            }
            if numbers.iter().all(|n| n.is_i64()) {
                Value::from(numbers.iter().filter_map(|n| n.as_i64()).sum::<i64>())
            } else {
                Value::from(numbers.iter().filter_map(|n| n.as_f64()).sum::<f64>())
            }
        }
        AggregateFunction::Min => extreme(group, Ordering::Less),
        AggregateFunction::Max => extreme(group, Ordering::Greater),
    }
}

fn extreme(group: &[Value], wanted: Ordering) -> Value {
    group
        .iter()
        .filter(|v| !v.is_null())
        .fold(None::<&Value>, |best, v| match best {
            Some(b) if compare_scalars(v, b) != Some(wanted) => Some(b),
            _ => Some(v),
        })
        .cloned()
        .unwrap_or(Value::Null)
}

async fn lookup(
    source: &dyn DataSource,
    rows: &[Row],
    hops: &[LookupHop],
    column: &str,
) -> Result<Vec<Value>, SearchError> {
    let Some(first) = hops.first() else {
        return Ok(vec![Value::Null; rows.len()]);
    };
    let mut current: Vec<Option<Value>> = rows
        .iter()
        .map(|r| r.get(&first.local_column).cloned())
        .collect();

    for (index, hop) in hops.iter().enumerate() {
        let next_column = hops
            .get(index + 1)
            .map_or(column, |next| next.local_column.as_str());

        let wanted = distinct_keys(current.iter().flatten());
        if wanted.is_empty() {
            return Ok(vec![Value::Null; rows.len()]);
        }

        let request = FetchRequest::new(&hop.table)
            .columns(vec![hop.key_column.clone(), next_column.to_string()])
            .filter(Some(Predicate::is_in(&hop.key_column, wanted)));
        let found = source
            .fetch_all(&request)
            .await
            .map_err(SearchError::at(SourceStage::Enrichment, &hop.table))?;

        let mut index_by_key: HashMap<String, Value> = HashMap::new();
        for row in found {
            if let Some(key) = row.get(&hop.key_column).and_then(key_of) {
                let value = row.get(next_column).cloned().unwrap_or(Value::Null);
                index_by_key.entry(key).or_insert(value);
            }
        }

        current = current
            .into_iter()
            .map(|value| {
                value
                    .as_ref()
                    .and_then(key_of)
                    .and_then(|k| index_by_key.get(&k).cloned())
            })
            .collect();
    }

    Ok(current
        .into_iter()
        .map(|v| v.unwrap_or(Value::Null))
        .collect())
}

//! Foreign-key resolution.
//!
//! A foreign-key field is searched through its foreign table: the term is
//! matched against the foreign table's search columns, and the keys of the
//! matching rows become an `IN` condition on the local column.

use futures::future::try_join_all;
use tracing::debug;

use super::classifier::ClassifiedTerm;
use super::condition::{FilterValue, Predicate};
use super::enrich::distinct_keys;
use super::error::{SearchError, SourceStage};
use super::types::{FieldDefinition, FieldType, TableConfig};
use crate::source::{DataSource, FetchRequest};

/// Keys of the foreign rows whose search columns contain `term`.
///
/// Keys are deduplicated in first-seen order. Fields that are not complete
/// foreign-key fields, and empty terms, resolve to no keys.
pub async fn resolve(
    source: &dyn DataSource,
    field: &FieldDefinition,
    term: &str,
) -> Result<Vec<FilterValue>, SearchError> {
    let (Some(table), Some(key_column)) = (&field.foreign_table, &field.foreign_key_column) else {
        return Ok(Vec::new());
    };
    if term.is_empty() || field.search_columns.is_empty() {
        return Ok(Vec::new());
    }

    let matches_term = Predicate::any(
        field
            .search_columns
            .iter()
            .map(|column| Predicate::contains(column, term))
            .collect(),
    );
    let request = FetchRequest::new(table)
        .columns(vec![key_column.clone()])
        .filter(Some(matches_term));

    let rows = source
        .fetch_all(&request)
        .await
        .map_err(SearchError::at(SourceStage::ForeignKeyLookup, table))?;

    let keys = distinct_keys(rows.iter().filter_map(|row| row.get(key_column)));

    debug!(
        field = %field.name,
        foreign_table = %table,
        keys = keys.len(),
        "resolved foreign keys"
    );
    Ok(keys)
}

/// `IN` conditions for every foreign-key field of `config` with at least
/// one matching foreign row. Lookups run concurrently.
pub async fn resolve_all(
    source: &dyn DataSource,
    config: &TableConfig,
    term: &ClassifiedTerm,
) -> Result<Vec<Predicate>, SearchError> {
    if term.is_empty() {
        return Ok(Vec::new());
    }

    let fields: Vec<&FieldDefinition> = config
        .search_fields
        .iter()
        .filter(|f| f.field_type == FieldType::ForeignKey)
        .collect();

    let lookups = fields
        .iter()
        .map(|field| resolve(source, field, &term.raw_value));
    let resolved = try_join_all(lookups).await?;

    Ok(fields
        .into_iter()
        .zip(resolved)
        .filter(|(_, keys)| !keys.is_empty())
        .map(|(field, keys)| Predicate::is_in(&field.name, keys))
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::search::classifier::classify;
    use crate::source::MemorySource;
    use serde_json::json;

    fn manager_field() -> FieldDefinition {
        FieldDefinition::foreign_key("manager_id", "Manager", "users", "id", &["name", "email"])
    }

    fn users() -> MemorySource {
        MemorySource::new().with_table(
            "users",
            vec![
                json!({"id": 1, "name": "Alice Smith", "email": "alice@example.com"}),
                json!({"id": 2, "name": "Bob Jones", "email": "bob@smith.org"}),
                json!({"id": 3, "name": "Carol", "email": "carol@example.com"}),
            ],
        )
    }

    #[tokio::test]
    async fn matches_any_search_column() {
        let keys = resolve(&users(), &manager_field(), "smith").await.unwrap();
        assert_eq!(keys, vec![FilterValue::Integer(1), FilterValue::Integer(2)]);
    }

    #[tokio::test]
    async fn keys_are_deduplicated() {
        let source = users();
        source.insert(
            "users",
            vec![
                json!({"id": 1, "name": "Alice again"}),
                json!({"id": 1.0, "name": "Alice as float"}),
            ],
        );
        let keys = resolve(&source, &manager_field(), "alice").await.unwrap();
        assert_eq!(keys, vec![FilterValue::Integer(1)]);
    }

    #[tokio::test]
    async fn no_match_yields_no_condition() {
        let source = users();
        let config = TableConfig::new("divisions", "id").field(manager_field());
        let conditions = resolve_all(&source, &config, &classify("zed", &config))
            .await
            .unwrap();
        assert!(conditions.is_empty());
    }

    #[tokio::test]
    async fn match_yields_in_condition() {
        let source = users();
        let config = TableConfig::new("divisions", "id").field(manager_field());
        let conditions = resolve_all(&source, &config, &classify("carol", &config))
            .await
            .unwrap();
        assert_eq!(
            conditions,
            vec![Predicate::is_in("manager_id", vec![FilterValue::Integer(3)])]
        );
    }

    #[tokio::test]
    async fn lookup_failure_is_reported_with_stage() {
        let source = users();
        source.fail_table("users");
        let err = resolve(&source, &manager_field(), "alice")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SearchError::DataSource {
                stage: SourceStage::ForeignKeyLookup,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn empty_term_skips_lookups() {
        let source = users();
        let config = TableConfig::new("divisions", "id").field(manager_field());
        let conditions = resolve_all(&source, &config, &classify("", &config))
            .await
            .unwrap();
        assert!(conditions.is_empty());
        assert!(source.calls().is_empty());
    }
}

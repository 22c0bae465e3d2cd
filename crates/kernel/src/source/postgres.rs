//! PostgreSQL data source.
//!
//! Fetch requests are rendered to SQL with SeaQuery and executed through
//! sqlx inside a short transaction carrying a statement timeout. Rows come
//! back as JSON objects via `row_to_json`, so any table shape is supported
//! without per-table structs.

use std::time::Duration;

use async_trait::async_trait;
use sea_query::{
    Alias, Asterisk, Cond, Expr, ExprTrait, Func, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr,
};
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;

use super::{DataSource, FetchRequest, Page, Row, SourceError};
use crate::search::{FilterValue, JoinKind, Predicate, SortDirection, format_instant};

/// Renders a [`FetchRequest`] to PostgreSQL.
///
/// Primary-table columns are qualified with the table name. Joined columns
/// are selected as `"alias.column"` so they come back under the same keys
/// the in-memory source uses.
pub struct SelectBuilder<'a> {
    request: &'a FetchRequest,
}

impl<'a> SelectBuilder<'a> {
    pub fn new(request: &'a FetchRequest) -> Self {
        Self { request }
    }

    /// SELECT with ordering and, if requested, LIMIT/OFFSET.
    pub fn build(&self) -> String {
        let mut query = Query::select();
        self.add_select_columns(&mut query);
        query.from(Alias::new(&self.request.table));
        self.add_joins(&mut query);
        self.add_filter(&mut query);
        self.add_sorts(&mut query);

        if let Some(range) = self.request.range {
            query.limit(range.limit);
            query.offset(range.offset);
        }

        query.to_string(PostgresQueryBuilder)
    }

    /// COUNT(*) over the same joins and filter.
    pub fn build_count(&self) -> String {
        let mut query = Query::select();
        query.expr(Expr::col(Asterisk).count());
        query.from(Alias::new(&self.request.table));
        self.add_joins(&mut query);
        self.add_filter(&mut query);

        query.to_string(PostgresQueryBuilder)
    }

    fn add_select_columns(&self, query: &mut SelectStatement) {
        let table = Alias::new(&self.request.table);
        if self.request.columns.is_empty() {
            query.column((table, Asterisk));
        } else {
            for column in &self.request.columns {
                query.column((table.clone(), Alias::new(column)));
            }
        }

        for join in &self.request.joins {
            for column in &join.select_columns {
                query.expr_as(
                    Expr::col((Alias::new(&join.alias), Alias::new(column))),
                    Alias::new(format!("{}.{column}", join.alias)),
                );
            }
        }
    }

    fn add_joins(&self, query: &mut SelectStatement) {
        for join in &self.request.joins {
            let join_type = match join.join_kind {
                JoinKind::Inner => sea_query::JoinType::InnerJoin,
                JoinKind::Left => sea_query::JoinType::LeftJoin,
            };

            let on_condition = Expr::col((
                Alias::new(&self.request.table),
                Alias::new(&join.join_condition.local_column),
            ))
            .equals((
                Alias::new(&join.alias),
                Alias::new(&join.join_condition.foreign_column),
            ));

            query.join_as(
                join_type,
                Alias::new(&join.table),
                Alias::new(&join.alias),
                on_condition,
            );
        }
    }

    fn add_filter(&self, query: &mut SelectStatement) {
        if let Some(ref predicate) = self.request.predicate {
            query.and_where(self.predicate_expr(predicate));
        }
    }

    fn add_sorts(&self, query: &mut SelectStatement) {
        for sort in &self.request.sort {
            let order = match sort.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            query.order_by_expr(self.column_expr(&sort.column), order);
        }
    }

    /// `alias.column` refers to a join; anything else to the primary table.
    fn column_expr(&self, column: &str) -> SimpleExpr {
        match column.split_once('.') {
            Some((alias, name)) => Expr::col((Alias::new(alias), Alias::new(name))).into(),
            None => Expr::col((Alias::new(&self.request.table), Alias::new(column))).into(),
        }
    }

    fn predicate_expr(&self, predicate: &Predicate) -> SimpleExpr {
        match predicate {
            Predicate::Equals { column, value } => match sql_value(value) {
                Some(value) => self.column_expr(column).eq(value),
                None => Expr::cust("FALSE"),
            },
            Predicate::Contains {
                column,
                value,
                case_sensitive,
            } => {
                let text = self.column_expr(column).cast_as(Alias::new("text"));
                if *case_sensitive {
                    Expr::expr(text).like(format!("%{}%", escape_like_wildcards(value)))
                } else {
                    Expr::expr(Func::lower(text)).like(format!(
                        "%{}%",
                        escape_like_wildcards(&value.to_lowercase())
                    ))
                }
            }
            Predicate::GreaterOrEqual { column, value } => match sql_value(value) {
                Some(value) => self.column_expr(column).gte(value),
                None => Expr::cust("FALSE"),
            },
            Predicate::LessOrEqual { column, value } => match sql_value(value) {
                Some(value) => self.column_expr(column).lte(value),
                None => Expr::cust("FALSE"),
            },
            Predicate::In { column, values } => {
                let values: Vec<sea_query::Value> = values.iter().filter_map(sql_value).collect();
                if values.is_empty() {
                    // Restrict rather than widen: IN () never matches.
                    return Expr::cust("FALSE");
                }
                self.column_expr(column).is_in(values)
            }
            Predicate::And(parts) => {
                if parts.is_empty() {
                    return Expr::cust("TRUE");
                }
                parts
                    .iter()
                    .fold(Cond::all(), |cond, part| cond.add(self.predicate_expr(part)))
                    .into()
            }
            Predicate::Or(parts) => {
                if parts.is_empty() {
                    return Expr::cust("FALSE");
                }
                parts
                    .iter()
                    .fold(Cond::any(), |cond, part| cond.add(self.predicate_expr(part)))
                    .into()
            }
        }
    }
}

fn sql_value(value: &FilterValue) -> Option<sea_query::Value> {
    match value {
        FilterValue::String(s) => Some(s.clone().into()),
        FilterValue::Integer(i) => Some((*i).into()),
        FilterValue::Float(f) => Some((*f).into()),
        FilterValue::Boolean(b) => Some((*b).into()),
        FilterValue::DateTime(dt) => Some(format_instant(dt).into()),
        FilterValue::List(_) => None,
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// [`DataSource`] over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgSource {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgSource {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, SourceError> {
        // SET LOCAL applies to this transaction only and resets on commit/rollback.
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        Ok(tx)
    }
}

fn into_rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl DataSource for PgSource {
    async fn fetch_page(&self, request: &FetchRequest) -> Result<Page, SourceError> {
        let builder = SelectBuilder::new(request);
        let mut tx = self.begin().await?;

        let count_sql = builder.build_count();
        debug!(sql = %count_sql, "count query");
        let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(&mut *tx).await?;

        let main_sql = builder.build();
        debug!(sql = %main_sql, "page query");
        let rows: Vec<Value> =
            sqlx::query_scalar(&format!("SELECT row_to_json(t) FROM ({main_sql}) t"))
                .fetch_all(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(Page {
            rows: into_rows(rows),
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn fetch_all(&self, request: &FetchRequest) -> Result<Vec<Row>, SourceError> {
        let unbounded = FetchRequest {
            range: None,
            ..request.clone()
        };
        let sql = SelectBuilder::new(&unbounded).build();
        debug!(sql = %sql, "full query");

        let mut tx = self.begin().await?;
        let rows: Vec<Value> = sqlx::query_scalar(&format!("SELECT row_to_json(t) FROM ({sql}) t"))
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(into_rows(rows))
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::search::JoinDefinition;
    use chrono::{TimeZone, Utc};

    fn sql(request: &FetchRequest) -> String {
        SelectBuilder::new(request).build()
    }

    #[test]
    fn simple_page_query() {
        let request = FetchRequest::new("divisions")
            .columns(vec!["id".to_string(), "name".to_string()])
            .order_by("name", SortDirection::Desc)
            .order_by("id", SortDirection::Asc)
            .range(20, 10);

        let sql = sql(&request);
        assert!(sql.contains(r#"SELECT "divisions"."id", "divisions"."name""#));
        assert!(sql.contains(r#"FROM "divisions""#));
        assert!(sql.contains(r#"ORDER BY "divisions"."name" DESC, "divisions"."id" ASC"#));
        assert!(sql.contains("LIMIT 10"));
        assert!(sql.contains("OFFSET 20"));
    }

    #[test]
    fn all_columns_without_projection() {
        let sql = sql(&FetchRequest::new("users"));
        assert!(sql.contains(r#""users".*"#));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn joins_are_aliased_and_qualified() {
        let request = FetchRequest::new("divisions")
            .joins(vec![
                JoinDefinition::left("users", "manager", "manager_id", "id").select(&["name"]),
            ])
            .order_by("manager.name", SortDirection::Asc);

        let sql = sql(&request);
        assert!(sql.contains(r#"LEFT JOIN "users" AS "manager""#));
        assert!(sql.contains(r#""divisions"."manager_id" = "manager"."id""#));
        assert!(sql.contains(r#""manager"."name" AS "manager.name""#));
        assert!(sql.contains(r#"ORDER BY "manager"."name" ASC"#));
    }

    #[test]
    fn count_query_has_no_window() {
        let request = FetchRequest::new("divisions")
            .filter(Some(Predicate::equals(
                "status",
                FilterValue::String("Active".to_string()),
            )))
            .order_by("name", SortDirection::Asc)
            .range(0, 10);

        let sql = SelectBuilder::new(&request).build_count();
        assert!(sql.contains("COUNT(*)"));
        assert!(sql.contains(r#""divisions"."status" = 'Active'"#));
        assert!(!sql.contains("LIMIT"));
        assert!(!sql.contains("ORDER BY"));
    }

    #[test]
    fn contains_escapes_wildcards() {
        let request = FetchRequest::new("users").filter(Some(Predicate::contains("name", "50%_Off")));
        let sql = sql(&request);
        assert!(sql.contains("LOWER"));
        assert!(sql.contains(r"50\\%\\_off") || sql.contains(r"50\%\_off"));
    }

    #[test]
    fn case_sensitive_contains_skips_lower() {
        let request = FetchRequest::new("users").filter(Some(Predicate::Contains {
            column: "code".to_string(),
            value: "AbC".to_string(),
            case_sensitive: true,
        }));
        let sql = sql(&request);
        assert!(!sql.contains("LOWER"));
        assert!(sql.contains("%AbC%"));
    }

    #[test]
    fn or_of_conditions() {
        let request = FetchRequest::new("divisions").filter(Some(Predicate::Or(vec![
            Predicate::contains("name", "north"),
            Predicate::equals("headcount", FilterValue::Integer(12)),
        ])));
        let sql = sql(&request);
        assert!(sql.contains(" OR "));
        assert!(sql.contains(r#""divisions"."headcount" = 12"#));
    }

    #[test]
    fn never_matching_predicates_render_false() {
        let empty_in = FetchRequest::new("divisions").filter(Some(Predicate::is_in("manager_id", vec![])));
        assert!(sql(&empty_in).contains("WHERE FALSE"));

        let empty_or = FetchRequest::new("divisions").filter(Some(Predicate::Or(vec![])));
        assert!(sql(&empty_or).contains("WHERE FALSE"));
    }

    #[test]
    fn in_list_of_keys() {
        let request = FetchRequest::new("divisions").filter(Some(Predicate::is_in(
            "manager_id",
            vec![FilterValue::Integer(1), FilterValue::Integer(7)],
        )));
        assert!(sql(&request).contains(r#""divisions"."manager_id" IN (1, 7)"#));
    }

    #[test]
    fn date_bounds_are_rendered_as_instants() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let request = FetchRequest::new("divisions").filter(Some(Predicate::GreaterOrEqual {
            column: "created_at".to_string(),
            value: FilterValue::DateTime(start),
        }));
        assert!(sql(&request).contains(r#""divisions"."created_at" >= '2024-03-15T00:00:00.000Z'"#));
    }
}

//! Search API routes.
//!
//! `GET /api/search/{table}?page&limit&search&sortField&sortDirection&status`
//! runs one search and wraps the result in the response envelope
//! `{data, pagination, filters, sorting}`.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::search::{
    AppliedFilters, FieldType, Pagination, SearchEngine, SearchRequest, SearchResult,
    SortDirection,
};
use crate::source::Row;
use crate::state::AppState;

/// Create the search router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/search", get(list_tables))
        .route("/api/search/{table}", get(search_table))
        .route("/api/search/{table}/invalidate", post(invalidate_table))
}

// -------------------------------------------------------------------------
// Response types
// -------------------------------------------------------------------------

#[derive(Serialize)]
struct TableSummary {
    table: String,
    fields: Vec<FieldSummary>,
    derived_sorts: Vec<String>,
}

#[derive(Serialize)]
struct FieldSummary {
    name: String,
    label: String,
    #[serde(rename = "type")]
    field_type: FieldType,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sorting {
    pub sort_field: String,
    pub sort_direction: SortDirection,
}

/// Response envelope of one search.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub data: Vec<Row>,
    pub pagination: Pagination,
    pub filters: AppliedFilters,
    pub sorting: Sorting,
}

impl From<&SearchResult> for SearchResponse {
    fn from(result: &SearchResult) -> Self {
        Self {
            data: result.rows.clone(),
            pagination: result.pagination.clone(),
            filters: result.filters.clone(),
            sorting: Sorting {
                sort_field: result.sort.field.clone(),
                sort_direction: result.sort.direction,
            },
        }
    }
}

// -------------------------------------------------------------------------
// Request types
// -------------------------------------------------------------------------

/// Raw query parameters; numbers are parsed by hand so bad values become 400s.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    page: Option<String>,
    limit: Option<String>,
    search: Option<String>,
    sort_field: Option<String>,
    sort_direction: Option<String>,
    status: Option<String>,
}

impl SearchParams {
    fn into_request(self) -> AppResult<SearchRequest> {
        let page = parse_number("page", self.page.as_deref())?.unwrap_or(1);
        let page_size = parse_number("limit", self.limit.as_deref())?.unwrap_or(0);
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        Ok(SearchRequest {
            term: self.search.unwrap_or_default(),
            page,
            page_size,
            status: non_empty(self.status),
            sort_field: non_empty(self.sort_field),
            sort_direction: non_empty(self.sort_direction).map(|d| SortDirection::parse(&d)),
        })
    }
}

fn parse_number(name: &str, value: Option<&str>) -> AppResult<Option<u32>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("{name} must be a non-negative integer"))),
    }
}

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

fn engine<'a>(state: &'a AppState, table: &str) -> AppResult<&'a SearchEngine> {
    state
        .registry()
        .get(table)
        .ok_or_else(|| AppError::UnknownTable(table.to_string()))
}

async fn list_tables(State(state): State<AppState>) -> Json<Vec<TableSummary>> {
    let tables = state
        .registry()
        .names()
        .filter_map(|name| state.registry().get(name))
        .map(|engine| {
            let config = engine.config();
            TableSummary {
                table: config.table_name.clone(),
                fields: config
                    .search_fields
                    .iter()
                    .map(|f| FieldSummary {
                        name: f.name.clone(),
                        label: f.label.clone(),
                        field_type: f.field_type,
                    })
                    .collect(),
                derived_sorts: config.derived_sorts.keys().cloned().collect(),
            }
        })
        .collect();
    Json(tables)
}

async fn search_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<SearchResponse>> {
    let engine = engine(&state, &table)?;
    let request = params.into_request()?;

    let result = match state.cache() {
        Some(cache) => cache.get_or_search(engine, &request).await?,
        None => Arc::new(engine.search(&request).await?),
    };

    Ok(Json(SearchResponse::from(result.as_ref())))
}

/// Drop cached results for a table after a write.
async fn invalidate_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> AppResult<StatusCode> {
    engine(&state, &table)?;
    if let Some(cache) = state.cache() {
        cache.invalidate_table(&table);
    }
    Ok(StatusCode::NO_CONTENT)
}

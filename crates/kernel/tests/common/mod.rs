#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Builds the REAL kernel registry, engines and router over an in-memory
//! data source seeded with the fixture tables from `sift-test-utils`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use tower::ServiceExt;

use sift_kernel::registry::{TableRegistry, parse_tables};
use sift_kernel::search::{EngineSettings, SearchCache, SearchEngine};
use sift_kernel::source::{DataSource, MemorySource};
use sift_kernel::state::AppState;

/// In-memory source holding every fixture table.
pub fn seeded_source() -> Arc<MemorySource> {
    let source = MemorySource::new();
    for (table, rows) in sift_test_utils::all_tables() {
        source.insert(table, rows);
    }
    Arc::new(source)
}

/// Registry over `source` built from the fixture tables file.
pub fn registry(source: Arc<MemorySource>) -> TableRegistry {
    let tables = parse_tables(sift_test_utils::TABLES_YAML).expect("fixture tables parse");
    let source: Arc<dyn DataSource> = source;
    TableRegistry::new(tables, source, EngineSettings::default()).expect("fixture tables are valid")
}

/// Engine for one fixture table.
pub fn engine(source: Arc<MemorySource>, table: &str) -> SearchEngine {
    registry(source)
        .get(table)
        .cloned()
        .unwrap_or_else(|| panic!("no fixture table {table}"))
}

/// Test application wrapper using the REAL kernel routes and state.
pub struct TestApp {
    router: Router,
    pub source: Arc<MemorySource>,
    pub state: AppState,
}

impl TestApp {
    /// App without a result cache.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// App with a read-through result cache.
    pub fn cached() -> Self {
        Self::build(Some(SearchCache::new(Duration::from_secs(300), 100)))
    }

    fn build(cache: Option<SearchCache>) -> Self {
        let source = seeded_source();
        let registry = registry(source.clone());
        let state = AppState::from_parts(registry, source.clone(), cache);
        let router = sift_kernel::routes::app(state.clone());
        Self {
            router,
            source,
            state,
        }
    }

    /// Send a request to the test application.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// GET `uri`, returning the status and the JSON body.
    pub async fn get_json(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = self
            .request(Request::get(uri).body(Body::empty()).unwrap())
            .await;
        let status = response.status();
        (status, body_json(response).await)
    }

    /// POST with an empty body, returning the status.
    pub async fn post(&self, uri: &str) -> StatusCode {
        self.request(Request::post(uri).body(Body::empty()).unwrap())
            .await
            .status()
    }
}

/// Read a response body as JSON (`null` when empty).
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

/// Ids of `rows`, in order.
pub fn ids(rows: &[serde_json::Map<String, serde_json::Value>]) -> Vec<i64> {
    rows.iter()
        .map(|row| row["id"].as_i64().expect("row has an integer id"))
        .collect()
}

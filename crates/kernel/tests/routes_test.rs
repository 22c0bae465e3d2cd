#![allow(clippy::unwrap_used, clippy::expect_used)]
//! HTTP surface tests using the real router over fixture data.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn health_reports_data_source() {
    let app = TestApp::new();
    let (status, body) = app.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tables"], 3);
}

#[tokio::test]
async fn search_envelope_has_all_sections() {
    let app = TestApp::new();
    let (status, body) = app
        .get_json("/api/search/divisions?search=active&page=1&limit=5")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    assert_eq!(body["pagination"]["currentPage"], 1);
    assert_eq!(body["pagination"]["pageSize"], 5);
    assert_eq!(body["pagination"]["totalCount"], 8);
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["pagination"]["hasNext"], true);
    assert_eq!(body["pagination"]["hasPrev"], false);
    assert_eq!(body["filters"], json!({"search": "active", "status": null}));
    assert_eq!(
        body["sorting"],
        json!({"sortField": "created_at", "sortDirection": "desc"})
    );
}

#[tokio::test]
async fn sort_and_status_parameters_are_forwarded() {
    let app = TestApp::new();
    let (status, body) = app
        .get_json("/api/search/divisions?sortField=name&sortDirection=ASC&status=active")
        .await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["Central", "East Region", "North Region", "Operations", "Research"]
    );
    assert_eq!(body["filters"]["status"], "Active");
    assert_eq!(body["sorting"]["sortDirection"], "asc");
}

#[tokio::test]
async fn derived_sort_over_http() {
    let app = TestApp::new();
    let (status, body) = app
        .get_json("/api/search/divisions?sortField=employee_count&sortDirection=desc&limit=3")
        .await;

    assert_eq!(status, StatusCode::OK);
    let counts: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["employee_count"].as_i64().unwrap())
        .collect();
    assert_eq!(counts, vec![3, 3, 3]);
    assert_eq!(body["pagination"]["totalCount"], 12);
}

#[tokio::test]
async fn undeclared_sort_field_falls_back_over_http() {
    let app = TestApp::new();
    let (status, body) = app.get_json("/api/search/users?sortField=bogus").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sorting"]["sortField"], "name");
    assert_eq!(body["data"][0]["name"], "Dana Active");
}

#[tokio::test]
async fn unknown_table_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app.get_json("/api/search/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown table 'nope'");
}

#[tokio::test]
async fn malformed_paging_is_a_bad_request() {
    let app = TestApp::new();
    let (status, _) = app.get_json("/api/search/divisions?page=first").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn data_source_failure_is_a_server_error_with_details() {
    let app = TestApp::new();
    app.source.fail_table("divisions");

    let (status, body) = app.get_json("/api/search/divisions").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["error"],
        "data source failed during direct fetch on 'divisions'"
    );
    assert_eq!(
        body["details"],
        json!(["data source error: simulated failure reading 'divisions'"])
    );
}

#[tokio::test]
async fn table_listing_describes_fields() {
    let app = TestApp::new();
    let (status, body) = app.get_json("/api/search").await;
    assert_eq!(status, StatusCode::OK);

    let tables = body.as_array().unwrap();
    assert_eq!(tables.len(), 3);
    let divisions = tables
        .iter()
        .find(|t| t["table"] == "divisions")
        .unwrap();
    assert_eq!(
        divisions["derived_sorts"],
        json!(["employee_count", "manager_city", "payroll"])
    );
    assert_eq!(divisions["fields"][2]["type"], "status");
}

#[tokio::test]
async fn cached_results_survive_until_invalidated() {
    let app = TestApp::cached();
    let uri = "/api/search/widgets?limit=5";

    let (_, before) = app.get_json(uri).await;
    assert_eq!(before["pagination"]["totalCount"], 60);

    app.source
        .insert("widgets", vec![json!({"id": 61, "label": "widget-0061"})]);

    let (_, stale) = app.get_json(uri).await;
    assert_eq!(stale["pagination"]["totalCount"], 60);

    assert_eq!(
        app.post("/api/search/widgets/invalidate").await,
        StatusCode::NO_CONTENT
    );

    let (_, fresh) = app.get_json(uri).await;
    assert_eq!(fresh["pagination"]["totalCount"], 61);
}

#[tokio::test]
async fn invalidating_unknown_table_is_not_found() {
    let app = TestApp::cached();
    assert_eq!(
        app.post("/api/search/nope/invalidate").await,
        StatusCode::NOT_FOUND
    );
}

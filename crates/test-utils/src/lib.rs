//! Sift test utilities.
//!
//! Fixture tables and table configs for integration testing. Rows are plain
//! JSON objects so they can seed any data source.
//!
//! The fixture models an organisation: `divisions` are managed by `users`,
//! staffed by `employees`, and users sit in `offices`.

use serde_json::{Value as JsonValue, json};

/// Table configs for the fixture tables, in the tables-file format.
pub const TABLES_YAML: &str = r#"
tables:
  - table_name: divisions
    primary_key: id
    select_columns: [id, name, code, status, manager_id, headcount, created_at]
    search_fields:
      - { name: name, type: text, label: Name }
      - { name: code, type: text, label: Code, case_sensitive: true }
      - { name: status, type: status, label: Status, enum_values: [Active, Inactive] }
      - { name: headcount, type: number, label: Headcount }
      - { name: created_at, type: date, label: Created }
      - name: manager_id
        type: foreign_key
        label: Manager
        foreign_table: users
        foreign_key_column: id
        search_columns: [name]
    joins:
      - table: users
        alias: manager
        join_condition: { local_column: manager_id, foreign_column: id }
        join_kind: left
        select_columns: [name, email]
    default_sort_field: created_at
    default_sort_direction: desc
    derived_sorts:
      employee_count:
        kind: aggregate
        table: employees
        foreign_column: division_id
        function: count
      payroll:
        kind: aggregate
        table: employees
        foreign_column: division_id
        function: sum
        column: salary
      manager_city:
        kind: lookup
        hops:
          - { local_column: manager_id, table: users, key_column: id }
          - { local_column: office_id, table: offices, key_column: id }
        column: city
  - table_name: users
    search_fields:
      - { name: name, type: text, label: Name }
      - { name: email, type: exact, label: Email }
      - { name: active, type: boolean, label: Active }
    default_sort_field: name
  - table_name: widgets
    search_fields:
      - { name: label, type: text, label: Label }
    max_page_size: 25
"#;

/// Build one division row.
pub fn division(
    id: i64,
    name: &str,
    status: &str,
    manager_id: Option<i64>,
    created_at: &str,
) -> TestDivision {
    TestDivision {
        id,
        name: name.to_string(),
        code: format!("DIV-{id:03}"),
        status: status.to_string(),
        manager_id,
        headcount: id * 3,
        created_at: created_at.to_string(),
    }
}

/// A division row builder.
#[derive(Debug, Clone)]
pub struct TestDivision {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub status: String,
    pub manager_id: Option<i64>,
    pub headcount: i64,
    pub created_at: String,
}

impl TestDivision {
    /// Set the division code.
    pub fn with_code(mut self, code: &str) -> Self {
        self.code = code.to_string();
        self
    }

    /// Set the headcount.
    pub fn with_headcount(mut self, headcount: i64) -> Self {
        self.headcount = headcount;
        self
    }

    /// Convert to a JSON row.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "id": self.id,
            "name": self.name,
            "code": self.code,
            "status": self.status,
            "manager_id": self.manager_id,
            "headcount": self.headcount,
            "created_at": self.created_at,
        })
    }
}

/// Twelve divisions, created one per month of 2024.
///
/// Searching "active" matches divisions 1, 4, 7, 9 and 12 by status, 3 and 6
/// by name ("Interactive", "Proactive") and 2 and 7 by manager name.
pub fn divisions() -> Vec<JsonValue> {
    [
        division(1, "North Region", "Active", Some(2), "2024-01-15T09:00:00Z"),
        division(2, "South Region", "Inactive", Some(1), "2024-02-15T09:00:00Z"),
        division(3, "Interactive Media", "Inactive", Some(3), "2024-03-15T09:00:00Z"),
        division(4, "East Region", "Active", Some(3), "2024-04-15T09:00:00Z"),
        division(5, "West Region", "Inactive", Some(2), "2024-05-15T09:00:00Z"),
        division(6, "Proactive Care", "Inactive", None, "2024-06-15T09:00:00Z"),
        division(7, "Central", "Active", Some(1), "2024-07-15T09:00:00Z"),
        division(8, "Logistics", "Inactive", Some(2), "2024-08-15T09:00:00Z"),
        division(9, "Research", "Active", Some(3), "2024-09-15T09:00:00Z"),
        division(10, "Finance", "Inactive", Some(3), "2024-10-15T09:00:00Z"),
        division(11, "Legal", "Inactive", None, "2024-11-15T09:00:00Z"),
        division(12, "Operations", "Active", Some(2), "2024-12-15T09:00:00Z"),
    ]
    .iter()
    .map(TestDivision::to_json)
    .collect()
}

/// Ids of the divisions [`divisions`] matches for "active".
pub const ACTIVE_SEARCH_IDS: [i64; 8] = [1, 2, 3, 4, 6, 7, 9, 12];

/// Managers of the divisions.
pub fn users() -> Vec<JsonValue> {
    vec![
        json!({"id": 1, "name": "Dana Active", "email": "dana@example.com", "active": true, "office_id": 100}),
        json!({"id": 2, "name": "Sam Reyes", "email": "sam@example.com", "active": true, "office_id": 101}),
        json!({"id": 3, "name": "Lee Park", "email": "lee@example.com", "active": false, "office_id": null}),
    ]
}

/// Offices users sit in.
pub fn offices() -> Vec<JsonValue> {
    vec![
        json!({"id": 100, "city": "Bergen"}),
        json!({"id": 101, "city": "Oslo"}),
    ]
}

/// Employees per division: division `d` has `d % 4` employees.
pub fn employees() -> Vec<JsonValue> {
    let mut rows = Vec::new();
    let mut id = 1;
    for division_id in 1..=12_i64 {
        for n in 0..(division_id % 4) {
            rows.push(json!({
                "id": id,
                "division_id": division_id,
                "salary": 1000 + n * 250,
            }));
            id += 1;
        }
    }
    rows
}

/// `count` generic rows labelled `widget-0001` onwards.
pub fn widgets(count: usize) -> Vec<JsonValue> {
    (1..=count)
        .map(|i| json!({"id": i, "label": format!("widget-{i:04}")}))
        .collect()
}

/// Every fixture table with its rows.
pub fn all_tables() -> Vec<(&'static str, Vec<JsonValue>)> {
    vec![
        ("divisions", divisions()),
        ("users", users()),
        ("offices", offices()),
        ("employees", employees()),
        ("widgets", widgets(60)),
    ]
}

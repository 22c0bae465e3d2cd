//! Comparison of JSON cell values.
//!
//! Shared by the in-memory source and the engine's in-memory sort so both
//! order rows the same way PostgreSQL does by default: NULL sorts after
//! every value ascending, and before every value descending.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::search::SortDirection;

/// Parse a timestamp or date string into an instant.
pub(crate) fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Order two non-null scalars of compatible types.
///
/// Strings that parse as instants compare by instant and sort before every
/// other string, which keeps the order total over mixed columns.
pub(crate) fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_instant(x), parse_instant(y)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            (Some(_), None) => Some(Ordering::Less),
            (None, Some(_)) => Some(Ordering::Greater),
            (None, None) => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Equality with numeric and timestamp normalisation.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    compare_scalars(a, b).map_or(a == b, |ord| ord == Ordering::Equal)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}

/// Total ascending order over optional cells; missing and null are greatest.
pub(crate) fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    compare_scalars(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

/// [`sort_order`] in `direction`.
pub(crate) fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_numerically() {
        assert_eq!(
            compare_scalars(&json!(9), &json!(10.5)),
            Some(Ordering::Less)
        );
        assert!(values_equal(&json!(3), &json!(3.0)));
    }

    #[test]
    fn timestamps_compare_as_instants() {
        assert_eq!(
            compare_scalars(&json!("2024-03-15T10:00:00+02:00"), &json!("2024-03-15T09:00:00Z")),
            Some(Ordering::Less)
        );
        assert!(values_equal(
            &json!("2024-03-15"),
            &json!("2024-03-15T00:00:00.000Z")
        ));
    }

    #[test]
    fn instants_sort_before_plain_strings() {
        let plus_five = json!("2024-03-15T10:00:00+05:00");
        let utc = json!("2024-03-15T06:00:00Z");
        let plain = json!("2024-03-15T08 x");

        assert_eq!(compare_scalars(&plus_five, &utc), Some(Ordering::Less));
        assert_eq!(compare_scalars(&utc, &plain), Some(Ordering::Less));
        assert_eq!(compare_scalars(&plus_five, &plain), Some(Ordering::Less));

        let mut column = vec![plain.clone(), utc.clone(), plus_five.clone()];
        column.sort_by(|a, b| sort_order(Some(a), Some(b)));
        assert_eq!(column, vec![plus_five, utc, plain]);
    }

    #[test]
    fn nulls_sort_last_ascending_first_descending() {
        let null = json!(null);
        let one = json!(1);
        assert_eq!(sort_order(Some(&null), Some(&one)), Ordering::Greater);
        assert_eq!(sort_order(None, Some(&one)), Ordering::Greater);
        assert_eq!(
            directed(sort_order(Some(&null), Some(&one)), SortDirection::Desc),
            Ordering::Less
        );
        assert_eq!(sort_order(None, Some(&null)), Ordering::Equal);
    }

    #[test]
    fn mixed_types_have_a_stable_rank() {
        assert_eq!(
            sort_order(Some(&json!(true)), Some(&json!("a"))),
            Ordering::Less
        );
    }
}

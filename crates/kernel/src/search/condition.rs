//! Predicate tree and per-field condition building.
//!
//! Data sources receive a [`Predicate`] tree of primitive column conditions
//! combined with AND/OR. [`build_condition`] turns one field definition plus
//! one classified term into the primitives that field contributes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::classifier::{ClassifiedTerm, TermKind};
use super::types::{FieldDefinition, FieldType};

/// Literal compared against a column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Parse a numeral, preferring an integer.
    pub fn number(raw: &str) -> Option<Self> {
        if let Ok(i) = raw.parse::<i64>() {
            return Some(FilterValue::Integer(i));
        }
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(FilterValue::Float)
    }

    /// Convert a JSON scalar (e.g. a key read from a row).
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(FilterValue::String(s.clone())),
            serde_json::Value::Bool(b) => Some(FilterValue::Boolean(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(FilterValue::Integer)
                .or_else(|| n.as_f64().map(FilterValue::Float)),
            serde_json::Value::Array(items) => Some(FilterValue::List(
                items.iter().filter_map(FilterValue::from_json).collect(),
            )),
            _ => None,
        }
    }

    /// JSON representation, as a row would hold it.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FilterValue::String(s) => serde_json::Value::String(s.clone()),
            FilterValue::Integer(i) => serde_json::Value::from(*i),
            FilterValue::Float(f) => serde_json::Value::from(*f),
            FilterValue::Boolean(b) => serde_json::Value::Bool(*b),
            FilterValue::DateTime(dt) => serde_json::Value::String(format_instant(dt)),
            FilterValue::List(items) => {
                serde_json::Value::Array(items.iter().map(FilterValue::to_json).collect())
            }
        }
    }

    /// Convert to string representation for SQL.
    pub fn as_string(&self) -> Option<String> {
        match self {
            FilterValue::String(s) => Some(s.clone()),
            FilterValue::Integer(i) => Some(i.to_string()),
            FilterValue::Float(f) => Some(f.to_string()),
            FilterValue::Boolean(b) => Some(b.to_string()),
            FilterValue::DateTime(dt) => Some(format_instant(dt)),
            FilterValue::List(_) => None,
        }
    }
}

/// RFC 3339 with milliseconds, e.g. `2024-03-15T23:59:59.999Z`.
pub fn format_instant(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Boolean condition over columns.
///
/// Columns are primary-table column names or `alias.column` for joined columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Equals {
        column: String,
        value: FilterValue,
    },
    /// Substring match.
    Contains {
        column: String,
        value: String,
        case_sensitive: bool,
    },
    GreaterOrEqual {
        column: String,
        value: FilterValue,
    },
    LessOrEqual {
        column: String,
        value: FilterValue,
    },
    /// Column value is one of `values`; an empty set matches nothing.
    In {
        column: String,
        values: Vec<FilterValue>,
    },
    /// All must hold; empty is true.
    And(Vec<Predicate>),
    /// Any must hold; empty is false.
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn equals(column: &str, value: FilterValue) -> Self {
        Predicate::Equals {
            column: column.to_string(),
            value,
        }
    }

    /// Case-insensitive substring match.
    pub fn contains(column: &str, value: &str) -> Self {
        Predicate::Contains {
            column: column.to_string(),
            value: value.to_string(),
            case_sensitive: false,
        }
    }

    pub fn is_in(column: &str, values: Vec<FilterValue>) -> Self {
        Predicate::In {
            column: column.to_string(),
            values,
        }
    }

    /// AND two predicates, flattening nested conjunctions.
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), other) => {
                left.push(other);
                Predicate::And(left)
            }
            (this, other) => Predicate::And(vec![this, other]),
        }
    }

    /// Conjunction of `parts`, unwrapped when there is exactly one.
    pub fn all(mut parts: Vec<Predicate>) -> Self {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::And(parts)
        }
    }

    /// Disjunction of `parts`, unwrapped when there is exactly one.
    pub fn any(mut parts: Vec<Predicate>) -> Self {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::Or(parts)
        }
    }

    /// Whether this predicate can never match (an empty OR or IN).
    pub fn is_never(&self) -> bool {
        match self {
            Predicate::Or(parts) => parts.iter().all(Predicate::is_never),
            Predicate::In { values, .. } => values.is_empty(),
            Predicate::And(parts) => parts.iter().any(Predicate::is_never),
            _ => false,
        }
    }
}

const TRUE_WORDS: [&str; 3] = ["true", "yes", "1"];
const FALSE_WORDS: [&str; 3] = ["false", "no", "0"];

/// Primitives `field` contributes for `term`; multiple entries are ANDed.
///
/// Foreign-key fields contribute nothing here; they are resolved against
/// their foreign table by the engine.
pub fn build_condition(field: &FieldDefinition, term: &ClassifiedTerm) -> Vec<Predicate> {
    if term.is_empty() {
        return Vec::new();
    }
    let raw = term.raw_value.as_str();
    let column = field.name.as_str();

    match field.field_type {
        FieldType::Text => match term.kind {
            TermKind::Text | TermKind::Status => vec![Predicate::Contains {
                column: column.to_string(),
                value: raw.to_string(),
                case_sensitive: field.case_sensitive,
            }],
            _ => Vec::new(),
        },
        FieldType::Exact => vec![Predicate::equals(column, FilterValue::String(raw.to_string()))],
        FieldType::Number => match term.kind {
            TermKind::Number => FilterValue::number(raw)
                .map(|value| vec![Predicate::equals(column, value)])
                .unwrap_or_default(),
            _ => Vec::new(),
        },
        FieldType::Status => {
            if !matches!(term.kind, TermKind::Status | TermKind::Text) {
                return Vec::new();
            }
            let value = field
                .canonical_enum_value(raw)
                .or_else(|| field.matching_keyword(raw));
            value
                .map(|v| vec![Predicate::equals(column, FilterValue::String(v.to_string()))])
                .unwrap_or_default()
        }
        FieldType::Date => match (term.kind, term.date_range) {
            (TermKind::DateRange, Some(range)) => vec![
                Predicate::GreaterOrEqual {
                    column: column.to_string(),
                    value: FilterValue::DateTime(range.start),
                },
                Predicate::LessOrEqual {
                    column: column.to_string(),
                    value: FilterValue::DateTime(range.end),
                },
            ],
            _ => Vec::new(),
        },
        FieldType::Boolean => {
            let lower = raw.to_ascii_lowercase();
            let value = if TRUE_WORDS.contains(&lower.as_str()) {
                Some(true)
            } else if FALSE_WORDS.contains(&lower.as_str()) {
                Some(false)
            } else {
                None
            };
            value
                .map(|b| vec![Predicate::equals(column, FilterValue::Boolean(b))])
                .unwrap_or_default()
        }
        FieldType::ForeignKey | FieldType::Json | FieldType::Array => Vec::new(),
    }
}

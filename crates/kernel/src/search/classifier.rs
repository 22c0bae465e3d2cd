//! Search term classification.
//!
//! A term is given one dominant shape before any predicate is built. Shapes
//! are tried in a fixed priority order and the first match wins:
//!
//! 1. number (`42`, `-3.5`)
//! 2. date (`MM/DD/YYYY`, `YYYY-MM-DD`, a field's own formats, a month name)
//! 3. status value (an enum value or keyword of any status field)
//! 4. free text

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;

use super::types::TableConfig;

/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").expect("valid regex literal"));

#[allow(clippy::expect_used)]
static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})$").expect("valid regex literal")
});

#[allow(clippy::expect_used)]
static YEAR_MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[/-](\d{1,2})[/-](\d{1,2})$").expect("valid regex literal")
});

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Shortest month-name prefix accepted as a month.
const MIN_MONTH_PREFIX: usize = 3;

/// Shape of a classified term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    Number,
    DateRange,
    Status,
    Text,
}

/// Inclusive instant range covered by a date term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// `[00:00:00.000, 23:59:59.999]` of `date`.
    pub fn day(date: NaiveDate) -> Option<Self> {
        Self::between(date, date)
    }

    /// First to last instant of `month` in `year`.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
        Self::between(first, last)
    }

    fn between(first: NaiveDate, last: NaiveDate) -> Option<Self> {
        Some(Self {
            start: first.and_hms_milli_opt(0, 0, 0, 0)?.and_utc(),
            end: last.and_hms_milli_opt(23, 59, 59, 999)?.and_utc(),
        })
    }
}

/// A search term with its inferred shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedTerm {
    pub kind: TermKind,
    /// Trimmed term as typed.
    pub raw_value: String,
    /// Resolved range, for `TermKind::DateRange` only.
    pub date_range: Option<DateRange>,
}

impl ClassifiedTerm {
    fn new(kind: TermKind, raw_value: &str) -> Self {
        Self {
            kind,
            raw_value: raw_value.to_string(),
            date_range: None,
        }
    }

    /// An empty term applies no filtering.
    pub fn is_empty(&self) -> bool {
        self.raw_value.is_empty()
    }
}

/// Classify `term` against the status and date fields of `config`.
pub fn classify(term: &str, config: &TableConfig) -> ClassifiedTerm {
    classify_at(term, config, Utc::now().date_naive())
}

/// Same as [`classify`], resolving month names against the year of `today`.
pub fn classify_at(term: &str, config: &TableConfig, today: NaiveDate) -> ClassifiedTerm {
    let raw = term.trim();
    if raw.is_empty() {
        return ClassifiedTerm::new(TermKind::Text, raw);
    }

    if NUMBER.is_match(raw) {
        return ClassifiedTerm::new(TermKind::Number, raw);
    }

    if let Some(range) = parse_date_range(raw, config, today) {
        return ClassifiedTerm {
            date_range: Some(range),
            ..ClassifiedTerm::new(TermKind::DateRange, raw)
        };
    }

    let is_status = config.status_fields().any(|field| {
        field.canonical_enum_value(raw).is_some() || field.matching_keyword(raw).is_some()
    });
    if is_status {
        return ClassifiedTerm::new(TermKind::Status, raw);
    }

    ClassifiedTerm::new(TermKind::Text, raw)
}

fn parse_date_range(raw: &str, config: &TableConfig, today: NaiveDate) -> Option<DateRange> {
    if let Some(date) = parse_numeric_date(raw) {
        return DateRange::day(date);
    }

    let custom = config
        .date_fields()
        .flat_map(|field| field.date_formats.iter())
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok());
    if let Some(date) = custom {
        return DateRange::day(date);
    }

    month_number(raw).and_then(|month| DateRange::month(today.year(), month))
}

fn parse_numeric_date(raw: &str) -> Option<NaiveDate> {
    if let Some(caps) = MONTH_DAY_YEAR.captures(raw) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year_digits = &caps[3];
        let mut year: i32 = year_digits.parse().ok()?;
        if year_digits.len() == 2 {
            year += 2000;
        }
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = YEAR_MONTH_DAY.captures(raw) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// 1-based month for a month name or a prefix of at least three letters.
fn month_number(raw: &str) -> Option<u32> {
    if raw.len() < MIN_MONTH_PREFIX || !raw.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let lower = raw.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|name| name.starts_with(&lower))
        .map(|index| index as u32 + 1)
}

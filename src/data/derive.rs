//! Pure functions computing derived fields from source cells.
//!
//! Every function here is total: malformed input yields `None`, never an error.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

use super::model::{Derived, NumericField, RecordId, Schema, SemanticField};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Interpret an id cell. Integral floats such as `"7.0"` collapse to integers.
pub fn parse_id(raw: Option<&str>) -> Option<RecordId> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(RecordId::Integer(i));
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
            return Some(RecordId::Integer(f as i64));
        }
    }
    Some(RecordId::Text(s.to_string()))
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

/// Coerce a funding cell to a non-negative USD amount.
pub fn coerce_amount(raw: Option<&str>) -> Option<f64> {
    let s = raw?.trim();
    let s = s.strip_prefix('$').unwrap_or(s);
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    let v = cleaned.trim().parse::<f64>().ok()?;
    (v.is_finite() && v >= 0.0).then_some(v)
}

// ---------------------------------------------------------------------------
// Duration
// ---------------------------------------------------------------------------

fn year_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]+)\s*year").expect("valid year regex"))
}

fn month_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]+)\s*month").expect("valid month regex"))
}

fn leading_count(re: &Regex, text: &str) -> Option<u32> {
    let caps = re.captures(text)?;
    // Absurdly long digit runs saturate instead of failing.
    Some(caps[1].parse::<u32>().unwrap_or(u32::MAX))
}

/// Total months in a free-text duration like `"2 years 6 months"`.
///
/// Returns `None` when neither a year nor a month count is present.
pub fn duration_months(raw: Option<&str>) -> Option<u32> {
    let text = raw?.to_lowercase();
    let years = leading_count(year_pattern(), &text);
    let months = leading_count(month_pattern(), &text);
    if years.is_none() && months.is_none() {
        return None;
    }
    Some(
        years
            .unwrap_or(0)
            .saturating_mul(12)
            .saturating_add(months.unwrap_or(0)),
    )
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parse a deadline cell. Dates without a time become midnight.
pub fn parse_deadline(raw: Option<&str>) -> Option<NaiveDateTime> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ---------------------------------------------------------------------------
// Whole-row derivation
// ---------------------------------------------------------------------------

/// Compute every derived field of one row from its source cells.
pub fn derive_fields(cells: &BTreeMap<String, String>, schema: &Schema) -> Derived {
    let cell = |field: SemanticField| -> Option<&str> {
        schema
            .column(field)
            .and_then(|c| cells.get(c))
            .map(String::as_str)
    };
    let amount = |field: NumericField| coerce_amount(cell(field.source()));

    Derived {
        funding_min: amount(NumericField::FundingMin),
        funding_max: amount(NumericField::FundingMax),
        funding_avg: amount(NumericField::FundingAvg),
        duration_months: duration_months(cell(SemanticField::Duration)),
        deadlines: schema
            .deadline_columns()
            .iter()
            .map(|c| parse_deadline(cells.get(c).map(String::as_str)))
            .collect(),
    }
}

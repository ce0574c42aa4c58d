use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Datelike;
use serde::Serialize;

use super::filter::{Dimension, FilteredView};
use super::model::{Dataset, NumericField, Opportunity, SemanticField};

// ---------------------------------------------------------------------------
// Selection choices
// ---------------------------------------------------------------------------

/// Distinct values (with row counts) per categorical dimension.
pub type Choices = BTreeMap<Dimension, Vec<(String, usize)>>;

/// Choices for every dimension the dataset carries, sorted by value.
///
/// Always computed over the whole dataset so the options stay put while
/// filters change.
pub fn choices(dataset: &Dataset) -> Choices {
    let schema = dataset.schema();
    Dimension::ALL
        .into_iter()
        .filter_map(|dim| {
            let column = schema.column(dim.field())?;
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for value in dataset.records().iter().filter_map(|r| r.get(column)) {
                *counts.entry(value).or_default() += 1;
            }
            let values = counts.into_iter().map(|(v, n)| (v.to_string(), n)).collect();
            Some((dim, values))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Result summary
// ---------------------------------------------------------------------------

/// Headline metrics for a filtered view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    pub count: usize,
    pub median_field: NumericField,
    pub median: Option<f64>,
    pub countries: usize,
    pub opportunity_types: usize,
}

pub fn summarize(view: &FilteredView<'_>, median_field: NumericField) -> ResultSummary {
    let schema = view.dataset().schema();
    let distinct = |field: SemanticField| -> usize {
        view.records()
            .filter_map(|r| r.field(schema, field))
            .collect::<BTreeSet<_>>()
            .len()
    };

    ResultSummary {
        count: view.len(),
        median_field,
        median: median(view.records().filter_map(|r| r.numeric(median_field)).collect()),
        countries: distinct(SemanticField::Country),
        opportunity_types: distinct(SemanticField::OpportunityType),
    }
}

/// Median of the values; mean of the middle pair for even counts.
pub fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

// ---------------------------------------------------------------------------
// Breakdowns
// ---------------------------------------------------------------------------

/// Non-null values of a column by descending frequency, ties by value.
pub fn value_counts<'a>(
    records: impl IntoIterator<Item = &'a Opportunity>,
    column: &str,
    limit: Option<usize>,
) -> Vec<(String, usize)> {
    let mut counts: HashMap<&'a str, usize> = HashMap::new();
    for value in records.into_iter().filter_map(|r| r.get(column)) {
        *counts.entry(value).or_default() += 1;
    }
    let mut out: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(v, n)| (v.to_string(), n))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if let Some(limit) = limit {
        out.truncate(limit);
    }
    out
}

/// Parsed primary deadlines bucketed by (year, month).
pub fn deadline_timeline(view: &FilteredView<'_>) -> BTreeMap<(i32, u32), usize> {
    let mut out = BTreeMap::new();
    let Some(index) = view.dataset().schema().primary_deadline() else {
        return out;
    };
    for deadline in view.records().filter_map(|r| r.deadline(index)) {
        *out.entry((deadline.year(), deadline.month())).or_default() += 1;
    }
    out
}

// ---------------------------------------------------------------------------
// Display rows
// ---------------------------------------------------------------------------

/// A formatted copy of one result row for tabular display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    pub id: String,
    pub name: String,
    pub institution: String,
    pub country: String,
    pub opportunity_type: String,
    pub funding: String,
    pub duration: String,
    pub deadline: String,
    pub career_stage: String,
    pub field_of_study: String,
    pub application_url: String,
}

/// Format a USD amount as `$12,345`, or `N/A` when unknown.
pub fn format_usd(value: Option<f64>) -> String {
    let Some(v) = value else {
        return "N/A".to_string();
    };
    let digits = format!("{:.0}", v.round());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("${grouped}")
}

/// Annotated rows for the view. Builds new values; the dataset is untouched.
pub fn display_rows(view: &FilteredView<'_>) -> Vec<DisplayRow> {
    let schema = view.dataset().schema();
    let funding_field = schema.funding_field().unwrap_or_default();
    view.records()
        .map(|r| {
            let text = |field| r.field(schema, field).unwrap_or_default().to_string();
            DisplayRow {
                id: r.id.as_ref().map(|id| id.to_string()).unwrap_or_default(),
                name: text(SemanticField::Name),
                institution: text(SemanticField::Institution),
                country: text(SemanticField::Country),
                opportunity_type: text(SemanticField::OpportunityType),
                funding: format_usd(r.numeric(funding_field)),
                duration: text(SemanticField::Duration),
                deadline: text(SemanticField::Deadline),
                career_stage: text(SemanticField::CareerStage),
                field_of_study: text(SemanticField::FieldOfStudy),
                application_url: text(SemanticField::ApplicationUrl),
            }
        })
        .collect()
}

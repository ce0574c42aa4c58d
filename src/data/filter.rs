use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::model::{Dataset, Opportunity, Schema, SemanticField};

// ---------------------------------------------------------------------------
// Filter dimensions
// ---------------------------------------------------------------------------

/// Categorical columns a filter can select on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Country,
    Region,
    FieldOfStudy,
    CareerStage,
    OpportunityType,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Country,
        Dimension::Region,
        Dimension::FieldOfStudy,
        Dimension::CareerStage,
        Dimension::OpportunityType,
    ];

    pub fn field(self) -> SemanticField {
        match self {
            Dimension::Country => SemanticField::Country,
            Dimension::Region => SemanticField::Region,
            Dimension::FieldOfStudy => SemanticField::FieldOfStudy,
            Dimension::CareerStage => SemanticField::CareerStage,
            Dimension::OpportunityType => SemanticField::OpportunityType,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimension::Country => "Country",
            Dimension::Region => "Region",
            Dimension::FieldOfStudy => "Field of Study",
            Dimension::CareerStage => "Career Stage",
            Dimension::OpportunityType => "Opportunity Type",
        }
    }
}

/// Inclusive numeric interval. A range with `min > max` matches no known value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Range { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    /// Unknown values always pass a range.
    fn admits(&self, value: Option<f64>) -> bool {
        value.map_or(true, |v| self.contains(v))
    }
}

/// Deadline bucket selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineWindow {
    #[default]
    All,
    /// Not yet passed and falling in the target year.
    Upcoming,
    Past,
    /// No parsable deadline.
    Unknown,
}

impl FromStr for DeadlineWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(DeadlineWindow::All),
            "upcoming" => Ok(DeadlineWindow::Upcoming),
            "past" => Ok(DeadlineWindow::Past),
            "unknown" | "none" => Ok(DeadlineWindow::Unknown),
            other => Err(format!(
                "unknown deadline window '{other}' (expected all, upcoming, past or unknown)"
            )),
        }
    }
}

impl fmt::Display for DeadlineWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeadlineWindow::All => "all",
            DeadlineWindow::Upcoming => "upcoming",
            DeadlineWindow::Past => "past",
            DeadlineWindow::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Query context
// ---------------------------------------------------------------------------

/// Clock inputs for deadline evaluation, passed in rather than read ambiently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryContext {
    pub now: NaiveDateTime,
    pub target_year: i32,
}

impl QueryContext {
    /// Context whose target year is the year of `now`.
    pub fn at(now: NaiveDateTime) -> Self {
        QueryContext {
            now,
            target_year: now.year(),
        }
    }

    pub fn with_target_year(self, target_year: i32) -> Self {
        QueryContext { target_year, ..self }
    }
}

// ---------------------------------------------------------------------------
// Filter spec and its constraints
// ---------------------------------------------------------------------------

/// Declarative set of optional constraints, AND-ed together.
///
/// A dimension absent from `categories` is unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub categories: BTreeMap<Dimension, String>,
    pub funding: Option<Range>,
    pub duration: Option<Range>,
    pub deadline: DeadlineWindow,
}

/// A single active restriction.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Category(Dimension, String),
    /// Funding amount in USD.
    Funding(Range),
    /// Duration in months.
    Duration(Range),
    Deadline(DeadlineWindow),
}

impl FilterSpec {
    pub fn new() -> Self {
        FilterSpec::default()
    }

    pub fn with_category(mut self, dimension: Dimension, value: impl Into<String>) -> Self {
        self.categories.insert(dimension, value.into());
        self
    }

    pub fn with_funding(mut self, range: Range) -> Self {
        self.funding = Some(range);
        self
    }

    pub fn with_duration(mut self, range: Range) -> Self {
        self.duration = Some(range);
        self
    }

    pub fn with_deadline(mut self, window: DeadlineWindow) -> Self {
        self.deadline = window;
        self
    }

    /// The non-default constraints of this spec.
    pub fn constraints(&self) -> Vec<Constraint> {
        let mut out: Vec<Constraint> = self
            .categories
            .iter()
            .map(|(d, v)| Constraint::Category(*d, v.clone()))
            .collect();
        out.extend(self.funding.map(Constraint::Funding));
        out.extend(self.duration.map(Constraint::Duration));
        if self.deadline != DeadlineWindow::All {
            out.push(Constraint::Deadline(self.deadline));
        }
        out
    }

    /// Build a spec from constraints. A later constraint on the same dimension
    /// replaces an earlier one.
    pub fn from_constraints(constraints: impl IntoIterator<Item = Constraint>) -> Self {
        constraints
            .into_iter()
            .fold(FilterSpec::default(), |spec, c| match c {
                Constraint::Category(d, v) => spec.with_category(d, v),
                Constraint::Funding(r) => spec.with_funding(r),
                Constraint::Duration(r) => spec.with_duration(r),
                Constraint::Deadline(w) => spec.with_deadline(w),
            })
    }

    /// Number of non-default constraints, for an "N filters active" readout.
    pub fn active_filters(&self) -> usize {
        self.constraints().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active_filters() == 0
    }
}

impl Constraint {
    pub fn matches(&self, record: &Opportunity, schema: &Schema, ctx: &QueryContext) -> bool {
        match self {
            Constraint::Category(dimension, value) => {
                record.field(schema, dimension.field()) == Some(value.as_str())
            }
            Constraint::Funding(range) => match schema.funding_field() {
                Some(field) => range.admits(record.numeric(field)),
                None => true,
            },
            Constraint::Duration(range) => {
                range.admits(record.derived().duration_months.map(f64::from))
            }
            Constraint::Deadline(window) => {
                let deadline = schema.primary_deadline().and_then(|i| record.deadline(i));
                match window {
                    DeadlineWindow::All => true,
                    DeadlineWindow::Upcoming => deadline
                        .is_some_and(|d| d >= ctx.now && d.year() == ctx.target_year),
                    DeadlineWindow::Past => deadline.is_some_and(|d| d < ctx.now),
                    DeadlineWindow::Unknown => deadline.is_none(),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Filtered view
// ---------------------------------------------------------------------------

/// Rows of a dataset passing a set of constraints. Holds indices only.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    dataset: &'a Dataset,
    indices: Vec<usize>,
    applied: Vec<Constraint>,
}

impl<'a> FilteredView<'a> {
    /// Every row, no constraint.
    pub fn all(dataset: &'a Dataset) -> Self {
        FilteredView {
            dataset,
            indices: (0..dataset.len()).collect(),
            applied: Vec::new(),
        }
    }

    /// Narrow this view by another spec.
    pub fn refine(&self, spec: &FilterSpec, ctx: &QueryContext) -> FilteredView<'a> {
        let constraints = spec.constraints();
        let schema = self.dataset.schema();
        let records = self.dataset.records();
        let indices = self
            .indices
            .iter()
            .copied()
            .filter(|&i| constraints.iter().all(|c| c.matches(&records[i], schema, ctx)))
            .collect();

        let mut applied = self.applied.clone();
        for c in constraints {
            if !applied.contains(&c) {
                applied.push(c);
            }
        }
        FilteredView {
            dataset: self.dataset,
            indices,
            applied,
        }
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    /// Row positions in the canonical dataset, ascending.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn records(&self) -> impl Iterator<Item = &'a Opportunity> + '_ {
        let records = self.dataset.records();
        self.indices.iter().map(move |&i| &records[i])
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Distinct non-default constraints applied to reach this view.
    pub fn active_filters(&self) -> usize {
        self.applied.len()
    }
}

/// Evaluate a filter spec against the full dataset.
pub fn query<'a>(dataset: &'a Dataset, spec: &FilterSpec, ctx: &QueryContext) -> FilteredView<'a> {
    FilteredView::all(dataset).refine(spec, ctx)
}

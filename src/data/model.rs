use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RecordId – the identity key of one opportunity
// ---------------------------------------------------------------------------

/// Identity key. Extracts carry either integer ids or free-form string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RecordId {
    Integer(i64),
    Text(String),
}

// -- Manual Ord: integers numerically, then all text ids lexicographically --

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (RecordId::Integer(a), RecordId::Integer(b)) => a.cmp(b),
            (RecordId::Text(a), RecordId::Text(b)) => a.cmp(b),
            (RecordId::Integer(_), RecordId::Text(_)) => Ordering::Less,
            (RecordId::Text(_), RecordId::Integer(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Integer(i) => write!(f, "{i}"),
            RecordId::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Canonical ordering of optional ids: present ids ascending, missing ids last.
pub fn cmp_ids(a: Option<&RecordId>, b: Option<&RecordId>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ---------------------------------------------------------------------------
// SemanticField – declared optional capabilities of a schema
// ---------------------------------------------------------------------------

/// The fields the pipeline understands. Each one may or may not be present in
/// a given dataset; callers check [`Schema::has`] instead of probing columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticField {
    Id,
    Name,
    Institution,
    Country,
    Region,
    OpportunityType,
    CareerStage,
    FieldOfStudy,
    FundingMin,
    FundingMax,
    FundingAvg,
    Duration,
    Deadline,
    ApplicationUrl,
    Description,
    Eligibility,
}

impl SemanticField {
    pub const ALL: [SemanticField; 16] = [
        SemanticField::Id,
        SemanticField::Name,
        SemanticField::Institution,
        SemanticField::Country,
        SemanticField::Region,
        SemanticField::OpportunityType,
        SemanticField::CareerStage,
        SemanticField::FieldOfStudy,
        SemanticField::FundingMin,
        SemanticField::FundingMax,
        SemanticField::FundingAvg,
        SemanticField::Duration,
        SemanticField::Deadline,
        SemanticField::ApplicationUrl,
        SemanticField::Description,
        SemanticField::Eligibility,
    ];

    /// Accepted column names, most preferred first.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            SemanticField::Id => &["opportunity_id", "id"],
            SemanticField::Name => &["program_name", "opportunity_name", "name"],
            SemanticField::Institution => &["institution", "institution_name"],
            SemanticField::Country => &["country"],
            SemanticField::Region => &["region"],
            SemanticField::OpportunityType => &["opportunity_type", "program_type"],
            SemanticField::CareerStage => &["career_stage", "academic_level"],
            SemanticField::FieldOfStudy => &["field_of_study"],
            SemanticField::FundingMin => &["funding_amount_min"],
            SemanticField::FundingMax => &["funding_amount_max"],
            SemanticField::FundingAvg => &["funding_amount_avg"],
            SemanticField::Duration => &["duration"],
            SemanticField::Deadline => &["deadline_primary", "application_deadline", "deadline"],
            SemanticField::ApplicationUrl => &["application_url", "official_website"],
            SemanticField::Description => &["description"],
            SemanticField::Eligibility => &["eligibility_criteria", "nationality_eligibility"],
        }
    }
}

// ---------------------------------------------------------------------------
// NumericField – derived numeric columns usable for ranges and medians
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericField {
    FundingMin,
    FundingMax,
    #[default]
    FundingAvg,
    DurationMonths,
}

impl NumericField {
    /// The source field this numeric value is derived from.
    pub fn source(self) -> SemanticField {
        match self {
            NumericField::FundingMin => SemanticField::FundingMin,
            NumericField::FundingMax => SemanticField::FundingMax,
            NumericField::FundingAvg => SemanticField::FundingAvg,
            NumericField::DurationMonths => SemanticField::Duration,
        }
    }
}

// ---------------------------------------------------------------------------
// Schema – union of batch columns plus resolved capabilities
// ---------------------------------------------------------------------------

pub const DURATION_MONTHS_COLUMN: &str = "duration_months";

/// Column layout of the canonical dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<String>,
    deadline_columns: Vec<String>,
    fields: BTreeMap<SemanticField, String>,
}

impl Schema {
    /// Resolve capabilities for a union of source columns.
    ///
    /// `id_column` overrides the alias lookup for [`SemanticField::Id`].
    pub fn resolve(columns: Vec<String>, id_column: Option<&str>) -> Self {
        let deadline_columns: Vec<String> = columns
            .iter()
            .filter(|c| {
                let lower = c.to_ascii_lowercase();
                lower.contains("deadline") && !lower.ends_with("_parsed")
            })
            .cloned()
            .collect();

        let mut fields = BTreeMap::new();
        for field in SemanticField::ALL {
            let found = match (field, id_column) {
                (SemanticField::Id, Some(id)) => columns.iter().find(|c| c.as_str() == id),
                _ => field
                    .aliases()
                    .iter()
                    .find_map(|alias| columns.iter().find(|c| c.as_str() == *alias)),
            };
            if let Some(col) = found {
                fields.insert(field, col.clone());
            }
        }
        if !fields.contains_key(&SemanticField::Deadline) {
            if let Some(first) = deadline_columns.first() {
                fields.insert(SemanticField::Deadline, first.clone());
            }
        }

        Schema {
            columns,
            deadline_columns,
            fields,
        }
    }

    /// Source columns in first-seen order across batches.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has(&self, field: SemanticField) -> bool {
        self.fields.contains_key(&field)
    }

    /// Column backing a semantic field, if the dataset carries it.
    pub fn column(&self, field: SemanticField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// Every column whose name mentions a deadline, in schema order.
    pub fn deadline_columns(&self) -> &[String] {
        &self.deadline_columns
    }

    /// Position of the primary deadline within [`Schema::deadline_columns`].
    pub fn primary_deadline(&self) -> Option<usize> {
        let col = self.column(SemanticField::Deadline)?;
        self.deadline_columns.iter().position(|c| c == col)
    }

    /// Names of the columns computed at merge time.
    pub fn derived_columns(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.deadline_columns.len() + 1);
        if self.has(SemanticField::Duration) {
            out.push(DURATION_MONTHS_COLUMN.to_string());
        }
        out.extend(self.deadline_columns.iter().map(|c| format!("{c}_parsed")));
        out
    }

    /// Funding column used by range filters: average, else min, else max.
    pub fn funding_field(&self) -> Option<NumericField> {
        [
            NumericField::FundingAvg,
            NumericField::FundingMin,
            NumericField::FundingMax,
        ]
        .into_iter()
        .find(|f| self.has(f.source()))
    }
}

// ---------------------------------------------------------------------------
// Opportunity – one row of the canonical dataset
// ---------------------------------------------------------------------------

/// Where a row came from: batch index and record index within that batch,
/// counting rows the loader skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowOrigin {
    pub batch: usize,
    pub row: usize,
}

/// Values computed from source cells. Never read from input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Derived {
    pub funding_min: Option<f64>,
    pub funding_max: Option<f64>,
    pub funding_avg: Option<f64>,
    pub duration_months: Option<u32>,
    /// Parsed deadlines, parallel to [`Schema::deadline_columns`].
    pub deadlines: Vec<Option<NaiveDateTime>>,
}

/// A single funding opportunity.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub id: Option<RecordId>,
    pub origin: RowOrigin,
    /// Non-empty source cells: column → raw text. Absent means null.
    cells: BTreeMap<String, String>,
    derived: Derived,
}

impl Opportunity {
    pub(crate) fn new(
        id: Option<RecordId>,
        origin: RowOrigin,
        cells: BTreeMap<String, String>,
        derived: Derived,
    ) -> Self {
        Opportunity {
            id,
            origin,
            cells,
            derived,
        }
    }

    /// Raw source cell.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    /// Raw cell for a semantic field, resolved through the schema.
    pub fn field(&self, schema: &Schema, field: SemanticField) -> Option<&str> {
        schema.column(field).and_then(|c| self.get(c))
    }

    pub(crate) fn cells(&self) -> &BTreeMap<String, String> {
        &self.cells
    }

    pub fn derived(&self) -> &Derived {
        &self.derived
    }

    pub fn numeric(&self, field: NumericField) -> Option<f64> {
        match field {
            NumericField::FundingMin => self.derived.funding_min,
            NumericField::FundingMax => self.derived.funding_max,
            NumericField::FundingAvg => self.derived.funding_avg,
            NumericField::DurationMonths => self.derived.duration_months.map(f64::from),
        }
    }

    pub fn deadline(&self, index: usize) -> Option<NaiveDateTime> {
        self.derived.deadlines.get(index).copied().flatten()
    }
}

// ---------------------------------------------------------------------------
// Dataset – the canonical, immutable merge output
// ---------------------------------------------------------------------------

/// The merged dataset. Built once by the merge engine and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Dataset {
    schema: Schema,
    records: Vec<Opportunity>,
}

impl Dataset {
    pub(crate) fn new(schema: Schema, records: Vec<Opportunity>) -> Self {
        Dataset { schema, records }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Records in canonical order.
    pub fn records(&self) -> &[Opportunity] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

use std::collections::BTreeSet;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::derive::{derive_fields, parse_id};
use super::loader::{load_batch, BatchSource, LoadOutcome, RawBatch, SourceRow};
use super::model::{cmp_ids, Dataset, Opportunity, RowOrigin, Schema, SemanticField};
use super::report::{
    BatchColumns, BatchOutcome, BatchStatus, ColumnReconciliation, Completeness, CriticalField,
    DuplicateId, ValidationReport,
};
use crate::error::{ExplorerError, Result};

/// Fields every record is expected to carry.
pub const DEFAULT_CRITICAL_FIELDS: &[&str] = &[
    "opportunity_id",
    "opportunity_name",
    "institution_name",
    "program_type",
    "country",
    "nationality_eligibility",
    "application_deadline",
    "official_website",
    "last_verified_date",
];

/// What to do with rows sharing an identity key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep every row; duplicates are only reported.
    #[default]
    KeepAll,
    /// Keep the first row per id in batch submission order.
    FirstOccurrence,
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub duplicate_policy: DuplicatePolicy,
    pub critical_fields: Vec<String>,
    /// Identity column; resolved from the usual aliases when `None`.
    pub id_column: Option<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        MergeOptions {
            duplicate_policy: DuplicatePolicy::default(),
            critical_fields: DEFAULT_CRITICAL_FIELDS.iter().map(|s| s.to_string()).collect(),
            id_column: None,
        }
    }
}

struct LoadedBatch {
    index: usize,
    label: String,
    raw: RawBatch,
}

/// Merge batches into one canonical dataset.
///
/// Missing or unparsable batches are recorded in the report and skipped. Only
/// an input with no loadable batch at all is an error.
pub fn merge(
    sources: &[BatchSource],
    options: &MergeOptions,
) -> Result<(Dataset, ValidationReport)> {
    let mut batches = Vec::with_capacity(sources.len());
    let mut loaded = Vec::new();

    for (index, source) in sources.iter().enumerate() {
        let label = source.label();
        let outcome = match load_batch(source) {
            LoadOutcome::Loaded(raw) => {
                let outcome = BatchOutcome::Loaded {
                    rows: raw.rows.len(),
                    columns: raw.headers.len(),
                    strategy: raw.strategy,
                    skipped_rows: raw.skipped_rows,
                };
                loaded.push(LoadedBatch {
                    index,
                    label: label.clone(),
                    raw,
                });
                outcome
            }
            LoadOutcome::Missing => BatchOutcome::Missing,
            LoadOutcome::Failed { reason } => BatchOutcome::Failed { reason },
        };
        batches.push(BatchStatus { label, outcome });
    }

    if loaded.is_empty() {
        return Err(ExplorerError::NoData {
            attempted: sources.len(),
        });
    }

    let columns = union_columns(&loaded);
    let column_warning = reconcile(&loaded, &columns);
    if let Some(w) = &column_warning {
        warn!(
            "batches disagree on columns: {} batch(es), {} columns in union",
            w.batches.len(),
            w.union_columns
        );
    }
    let schema = Schema::resolve(columns, options.id_column.as_deref());
    let id_column = schema.column(SemanticField::Id).map(str::to_string);
    if id_column.is_none() {
        warn!("no identity column found; every row sorts as id-less");
    }

    let mut records = Vec::new();
    for batch in loaded {
        for SourceRow { record, cells } in batch.raw.rows {
            let id = parse_id(id_column.as_deref().and_then(|c| cells.get(c)).map(String::as_str));
            let derived = derive_fields(&cells, &schema);
            let origin = RowOrigin {
                batch: batch.index,
                row: record,
            };
            records.push(Opportunity::new(id, origin, cells, derived));
        }
    }

    // Vec::sort_by is stable: equal ids keep concatenation order.
    records.sort_by(|a, b| cmp_ids(a.id.as_ref(), b.id.as_ref()));

    let duplicate_ids = find_duplicates(&records);
    if !duplicate_ids.is_empty() {
        warn!("{} duplicate id(s) after merge", duplicate_ids.len());
    }

    let before = records.len();
    if options.duplicate_policy == DuplicatePolicy::FirstOccurrence {
        records.dedup_by(|later, earlier| later.id.is_some() && later.id == earlier.id);
    }
    let dropped_duplicates = before - records.len();

    let critical_fields = completeness(&records, &schema, &options.critical_fields);
    let id_range = records.iter().find_map(|r| r.id.clone()).map(|lo| {
        let hi = records
            .iter()
            .rev()
            .find_map(|r| r.id.clone())
            .unwrap_or_else(|| lo.clone());
        (lo, hi)
    });

    let report = ValidationReport {
        batches,
        column_warning,
        duplicate_ids,
        critical_fields,
        total_rows: records.len(),
        dropped_duplicates,
        id_range,
    };
    info!(
        "merged {} of {} batch(es) into {} rows, {} columns",
        report.loaded_batches(),
        sources.len(),
        report.total_rows,
        schema.columns().len()
    );

    Ok((Dataset::new(schema, records), report))
}

/// Union of headers in first-seen order.
fn union_columns(loaded: &[LoadedBatch]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut columns = Vec::new();
    for batch in loaded {
        for h in &batch.raw.headers {
            if seen.insert(h.as_str()) {
                columns.push(h.clone());
            }
        }
    }
    columns
}

fn reconcile(loaded: &[LoadedBatch], columns: &[String]) -> Option<ColumnReconciliation> {
    let sets: Vec<BTreeSet<&str>> = loaded
        .iter()
        .map(|b| b.raw.headers.iter().map(String::as_str).collect())
        .collect();
    if sets.windows(2).all(|w| w[0] == w[1]) {
        return None;
    }

    let batches = loaded
        .iter()
        .zip(&sets)
        .map(|(b, set)| BatchColumns {
            label: b.label.clone(),
            column_count: set.len(),
            missing: columns
                .iter()
                .filter(|c| !set.contains(c.as_str()))
                .cloned()
                .collect(),
        })
        .collect();
    Some(ColumnReconciliation {
        union_columns: columns.len(),
        batches,
    })
}

/// Runs of equal ids in an id-sorted table.
fn find_duplicates(records: &[Opportunity]) -> Vec<DuplicateId> {
    let mut out: Vec<DuplicateId> = Vec::new();
    let mut start = 0;
    while start < records.len() {
        let mut end = start + 1;
        while end < records.len() && records[end].id == records[start].id {
            end += 1;
        }
        if let Some(id) = &records[start].id {
            if end - start > 1 {
                out.push(DuplicateId {
                    id: id.clone(),
                    positions: (start..end).collect(),
                    origins: records[start..end].iter().map(|r| r.origin).collect(),
                });
            }
        }
        start = end;
    }
    out
}

fn completeness(records: &[Opportunity], schema: &Schema, fields: &[String]) -> Vec<CriticalField> {
    fields
        .iter()
        .map(|column| {
            let completeness = if !schema.columns().contains(column) {
                Completeness::ColumnAbsent
            } else {
                match records.iter().filter(|r| r.get(column).is_none()).count() {
                    0 => Completeness::Complete,
                    count => Completeness::Missing { count },
                }
            };
            CriticalField {
                column: column.clone(),
                completeness,
            }
        })
        .collect()
}

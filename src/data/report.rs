use std::fmt;

use serde::Serialize;

use super::loader::ParseStrategy;
use super::model::{Dataset, RecordId, RowOrigin, SemanticField};
use super::stats::value_counts;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// What happened to one batch during merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Loaded {
        rows: usize,
        columns: usize,
        strategy: ParseStrategy,
        skipped_rows: usize,
    },
    Missing,
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchStatus {
    pub label: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

impl BatchStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Loaded { .. })
    }
}

/// Column set of one batch relative to the union schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchColumns {
    pub label: String,
    pub column_count: usize,
    pub missing: Vec<String>,
}

/// Raised when loaded batches disagree on their column sets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnReconciliation {
    pub union_columns: usize,
    pub batches: Vec<BatchColumns>,
}

/// One repeated identity key and every row carrying it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateId {
    pub id: RecordId,
    /// Row positions in the sorted table, before any duplicate policy applies.
    pub positions: Vec<usize>,
    pub origins: Vec<RowOrigin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Completeness {
    Complete,
    Missing { count: usize },
    ColumnAbsent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalField {
    pub column: String,
    #[serde(flatten)]
    pub completeness: Completeness,
}

/// Everything the merge engine learned about its input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub batches: Vec<BatchStatus>,
    pub column_warning: Option<ColumnReconciliation>,
    pub duplicate_ids: Vec<DuplicateId>,
    pub critical_fields: Vec<CriticalField>,
    pub total_rows: usize,
    /// Rows removed by the duplicate policy (zero under keep-all).
    pub dropped_duplicates: usize,
    pub id_range: Option<(RecordId, RecordId)>,
}

impl ValidationReport {
    pub fn loaded_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.is_loaded()).count()
    }

    pub fn has_duplicates(&self) -> bool {
        !self.duplicate_ids.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Human-readable rendering
// ---------------------------------------------------------------------------

const RULE: &str = "============================================================";

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batches:")?;
        for (i, b) in self.batches.iter().enumerate() {
            let n = i + 1;
            match &b.outcome {
                BatchOutcome::Loaded {
                    rows,
                    strategy: ParseStrategy::Strict,
                    ..
                } => writeln!(f, "  ✓ Batch {n}: {} - {rows} rows loaded", b.label)?,
                BatchOutcome::Loaded {
                    rows, skipped_rows, ..
                } => writeln!(
                    f,
                    "  ✓ Batch {n}: {} - {rows} rows loaded (lenient parse, {skipped_rows} rows skipped)",
                    b.label
                )?,
                BatchOutcome::Missing => writeln!(f, "  ✗ Batch {n}: {} not found", b.label)?,
                BatchOutcome::Failed { reason } => {
                    writeln!(f, "  ✗ Batch {n}: failed to read {}: {reason}", b.label)?
                }
            }
        }

        if let Some(warning) = &self.column_warning {
            writeln!(
                f,
                "\nWarning: not all batches have the same columns ({} in union)",
                warning.union_columns
            )?;
            for b in &warning.batches {
                write!(f, "  {}: {} columns", b.label, b.column_count)?;
                if !b.missing.is_empty() {
                    write!(f, " (missing: {})", b.missing.join(", "))?;
                }
                writeln!(f)?;
            }
        }

        writeln!(f, "\n✓ Merged dataset: {} total rows", self.total_rows)?;
        if let Some((lo, hi)) = &self.id_range {
            writeln!(f, "✓ Opportunity IDs range: {lo} to {hi}")?;
        }

        if self.duplicate_ids.is_empty() {
            writeln!(f, "✓ No duplicate opportunity ids found")?;
        } else {
            writeln!(
                f,
                "✗ Warning: {} duplicate opportunity id(s) found!",
                self.duplicate_ids.len()
            )?;
            for d in &self.duplicate_ids {
                let positions: Vec<String> = d.positions.iter().map(|p| p.to_string()).collect();
                writeln!(f, "  id {} at rows {}", d.id, positions.join(", "))?;
            }
            if self.dropped_duplicates > 0 {
                writeln!(
                    f,
                    "  {} later occurrence(s) dropped, first occurrence kept",
                    self.dropped_duplicates
                )?;
            }
        }

        writeln!(f, "\nCritical fields:")?;
        for c in &self.critical_fields {
            match c.completeness {
                Completeness::Complete => writeln!(f, "  ✓ {}: complete", c.column)?,
                Completeness::Missing { count } => {
                    writeln!(f, "  ✗ {}: {count} missing values", c.column)?
                }
                Completeness::ColumnAbsent => writeln!(f, "  ✗ {}: column not found!", c.column)?,
            }
        }
        Ok(())
    }
}

fn push_counts(out: &mut String, title: &str, counts: &[(String, usize)]) {
    if counts.is_empty() {
        return;
    }
    out.push_str(&format!("\n{title}:\n"));
    let width = counts.iter().map(|(v, _)| v.chars().count()).max().unwrap_or(0);
    for (value, count) in counts {
        out.push_str(&format!("  {value:<width$}  {count}\n"));
    }
}

/// Validation report followed by per-category counts of the merged dataset.
pub fn render_summary(dataset: &Dataset, report: &ValidationReport) -> String {
    let mut out = report.to_string();
    out.push_str(&format!("\n{RULE}\nDATASET SUMMARY\n{RULE}\n"));
    out.push_str(&format!("Total opportunities: {}\n", dataset.len()));

    let schema = dataset.schema();
    let sections = [
        ("By Opportunity Type", SemanticField::OpportunityType, None),
        ("By Region", SemanticField::Region, None),
        ("By Career Stage", SemanticField::CareerStage, None),
        ("Top 10 Fields of Study", SemanticField::FieldOfStudy, Some(10)),
    ];
    for (title, field, limit) in sections {
        if let Some(column) = schema.column(field) {
            push_counts(&mut out, title, &value_counts(dataset.records(), column, limit));
        }
    }
    if schema.columns().iter().any(|c| c == "award_currency") {
        push_counts(
            &mut out,
            "By Currency",
            &value_counts(dataset.records(), "award_currency", None),
        );
    }
    out
}

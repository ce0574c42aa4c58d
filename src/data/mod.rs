/// Data layer: merge pipeline and query engine.
///
/// Architecture:
/// ```text
///  batch_1.csv … batch_n.csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  strict parse, lenient fallback → LoadedBatch
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  merge    │  union schema, sort by id, duplicates, completeness
///   └──────────┘      │
///        │            └──► ValidationReport
///        ▼
///   ┌──────────┐
///   │ Dataset   │  immutable, canonical order, derived fields
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  FilterSpec → FilteredView (indices) ──► stats / export
///   └──────────┘
/// ```

pub mod derive;
pub mod export;
pub mod filter;
pub mod loader;
pub mod merge;
pub mod model;
pub mod report;
pub mod stats;

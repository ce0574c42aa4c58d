//! Merge partitioned funding-opportunity extracts into one validated dataset
//! and query it with composable filters.

pub mod config;
pub mod data;
pub mod error;

pub use data::filter::{
    query, DeadlineWindow, Dimension, FilterSpec, FilteredView, QueryContext, Range,
};
pub use data::loader::BatchSource;
pub use data::merge::{merge, DuplicatePolicy, MergeOptions};
pub use data::model::{Dataset, Opportunity, RecordId, SemanticField};
pub use data::report::ValidationReport;
pub use error::ExplorerError;

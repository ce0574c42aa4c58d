use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::data::loader::BatchSource;
use crate::data::merge::{DuplicatePolicy, MergeOptions, DEFAULT_CRITICAL_FIELDS};
use crate::data::model::NumericField;
use crate::error::{ExplorerError, Result};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Contents of `explorer.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplorerConfig {
    pub merge: MergeConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    /// Directory relative batch paths and the output are resolved against.
    pub data_dir: PathBuf,
    /// Batch files in submission order.
    pub batches: Vec<PathBuf>,
    pub output: PathBuf,
    pub duplicate_policy: DuplicatePolicy,
    pub critical_fields: Vec<String>,
    pub id_column: Option<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            data_dir: PathBuf::from("."),
            batches: (1..=5)
                .map(|i| PathBuf::from(format!("research_opportunities_batch{i}.csv")))
                .collect(),
            output: PathBuf::from("research_opportunities_complete.csv"),
            duplicate_policy: DuplicatePolicy::default(),
            critical_fields: DEFAULT_CRITICAL_FIELDS.iter().map(|s| s.to_string()).collect(),
            id_column: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Year the "upcoming" deadline window targets. Defaults to the current year.
    pub target_year: Option<i32>,
    /// Numeric field whose median the summary reports.
    pub median_field: NumericField,
}

impl ExplorerConfig {
    /// Parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ExplorerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ExplorerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

impl MergeConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn sources(&self) -> Vec<BatchSource> {
        self.batches
            .iter()
            .map(|b| BatchSource::File(self.resolve(b)))
            .collect()
    }

    pub fn output_path(&self) -> PathBuf {
        self.resolve(&self.output)
    }

    pub fn options(&self) -> MergeOptions {
        MergeOptions {
            duplicate_policy: self.duplicate_policy,
            critical_fields: self.critical_fields.clone(),
            id_column: self.id_column.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = ExplorerConfig::parse("").unwrap();
        assert_eq!(cfg.merge.batches.len(), 5);
        assert_eq!(cfg.merge.duplicate_policy, DuplicatePolicy::KeepAll);
        assert_eq!(cfg.query.median_field, NumericField::FundingAvg);
        assert_eq!(cfg.query.target_year, None);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = ExplorerConfig::parse(
            r#"
            [merge]
            data_dir = "/data"
            batches = ["a.csv", "/abs/b.csv"]
            duplicate_policy = "first_occurrence"
            critical_fields = ["opportunity_id"]

            [query]
            target_year = 2027
            median_field = "duration_months"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.merge.duplicate_policy, DuplicatePolicy::FirstOccurrence);
        assert_eq!(cfg.query.target_year, Some(2027));
        assert_eq!(cfg.query.median_field, NumericField::DurationMonths);
        assert_eq!(
            cfg.merge.output_path(),
            PathBuf::from("/data/research_opportunities_complete.csv")
        );
        let labels: Vec<String> = cfg.merge.sources().iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["a.csv", "b.csv"]);
        assert_eq!(cfg.merge.options().critical_fields, vec!["opportunity_id"]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ExplorerConfig::parse("[merge]\nbatchez = []\n").is_err());
    }
}

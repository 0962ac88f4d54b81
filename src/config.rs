use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::model::{ColumnLayout, RawTable};
use crate::error::PipelineError;

pub const DEFAULT_RATIO_THRESHOLD: f64 = 3.0;
pub const DEFAULT_CUMULATIVE_PERCENT: f64 = 95.0;

/// Resolved pipeline configuration. Read-only to the stages.
///
/// ```json
/// {
///   "name_column": "name",
///   "group_column": "treatment",
///   "sample_columns": ["s1", "s2"],
///   "blank_columns": ["blank1"],
///   "ratio_threshold": 3.0,
///   "cumulative_percent": 95.0
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name_column: String,
    pub group_column: String,
    /// Optional inline formula column; takes precedence over the lookup.
    pub formula_column: Option<String>,
    pub sample_columns: Vec<String>,
    pub blank_columns: Vec<String>,
    /// Sample column → group label. Empty means compounds are grouped by
    /// their `group_column` label.
    pub sample_groups: BTreeMap<String, String>,
    pub ratio_threshold: f64,
    pub cumulative_percent: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name_column: "name".to_string(),
            group_column: "group".to_string(),
            formula_column: None,
            sample_columns: Vec::new(),
            blank_columns: Vec::new(),
            sample_groups: BTreeMap::new(),
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
            cumulative_percent: DEFAULT_CUMULATIVE_PERCENT,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON configuration file. Missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// The intensity-column layout handed to the dataset.
    pub fn layout(&self) -> ColumnLayout {
        ColumnLayout {
            sample_columns: self.sample_columns.clone(),
            blank_columns: self.blank_columns.clone(),
            sample_groups: self.sample_groups.clone(),
        }
    }

    /// Blank-filter ratio; must be finite and non-negative.
    pub fn checked_ratio_threshold(&self) -> Result<f64, PipelineError> {
        let value = self.ratio_threshold;
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(PipelineError::ThresholdOutOfRange {
                name: "ratio_threshold",
                value,
                range: "[0, inf)",
            })
        }
    }

    /// Cumulative-filter coverage percentage; must lie in `[0, 100]`.
    pub fn checked_cumulative_percent(&self) -> Result<f64, PipelineError> {
        let value = self.cumulative_percent;
        if (0.0..=100.0).contains(&value) {
            Ok(value)
        } else {
            Err(PipelineError::ThresholdOutOfRange {
                name: "cumulative_percent",
                value,
                range: "[0, 100]",
            })
        }
    }

    /// Fill empty sample/blank column lists from the table: numeric columns
    /// whose name contains "blank" become blanks, every other numeric
    /// non-identifying column a sample. Explicit lists are left untouched.
    pub fn infer_columns(mut self, table: &RawTable) -> Self {
        if !self.sample_columns.is_empty() {
            return self;
        }
        let explicit_blanks = !self.blank_columns.is_empty();
        for column in &table.columns {
            if column == &self.name_column
                || column == &self.group_column
                || self.formula_column.as_ref() == Some(column)
                || self.blank_columns.contains(column)
                || !table.is_numeric_column(column)
            {
                continue;
            }
            if !explicit_blanks && column.to_ascii_lowercase().contains("blank") {
                self.blank_columns.push(column.clone());
            } else {
                self.sample_columns.push(column.clone());
            }
        }
        log::debug!(
            "inferred {} sample and {} blank columns",
            self.sample_columns.len(),
            self.blank_columns.len()
        );
        self
    }
}

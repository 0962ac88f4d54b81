use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// CellValue – a single cell of a raw table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell as produced by the file adapters.
/// Using `BTreeMap` / `BTreeSet` downstream so `CellValue` must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord so we can put CellValue in BTreeSet --

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => discriminant(self).cmp(&discriminant(other)),
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::String(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Null => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl CellValue {
    /// Numeric interpretation; strings are accepted when they parse as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Textual interpretation for identifying columns (names, group labels).
    /// `Null` and blank strings have none.
    pub fn as_label(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::String(s) if s.trim().is_empty() => None,
            CellValue::String(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Integer(_) | CellValue::Float(_))
    }
}

// ---------------------------------------------------------------------------
// RawTable – the parsed, untyped input
// ---------------------------------------------------------------------------

/// One row of a raw table: column_name → value.
pub type RawRow = BTreeMap<String, CellValue>;

/// A parsed table as handed to the Loader. Column order is the source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<RawRow>) -> Self {
        RawTable { columns, rows }
    }

    /// Build a table whose columns are the union of all row keys (sorted).
    pub fn from_rows(rows: Vec<RawRow>) -> Self {
        let columns: BTreeSet<String> = rows.iter().flat_map(|r| r.keys().cloned()).collect();
        RawTable {
            columns: columns.into_iter().collect(),
            rows,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// A column is numeric when it has at least one value and every non-null
    /// value is an integer or float.
    pub fn is_numeric_column(&self, column: &str) -> bool {
        let mut seen = false;
        for value in self.rows.iter().filter_map(|r| r.get(column)) {
            match value {
                CellValue::Null => {}
                v if v.is_numeric() => seen = true,
                _ => return false,
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Column roles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnRole {
    Sample,
    Blank,
}

/// Which intensity columns are samples and which are blanks, and how sample
/// columns map onto groups.
///
/// With an empty `sample_groups` a compound belongs to the group named by its
/// own label ("label mode"). Otherwise each sample column contributes to the
/// group it is mapped to ("column mode").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnLayout {
    pub sample_columns: Vec<String>,
    pub blank_columns: Vec<String>,
    pub sample_groups: BTreeMap<String, String>,
}

impl ColumnLayout {
    pub fn role_of(&self, column: &str) -> Option<ColumnRole> {
        if self.sample_columns.iter().any(|c| c == column) {
            Some(ColumnRole::Sample)
        } else if self.blank_columns.iter().any(|c| c == column) {
            Some(ColumnRole::Blank)
        } else {
            None
        }
    }

    pub fn groups_by_column(&self) -> bool {
        !self.sample_groups.is_empty()
    }

    /// Sample and blank columns, samples first.
    pub fn intensity_columns(&self) -> impl Iterator<Item = &String> {
        self.sample_columns.iter().chain(self.blank_columns.iter())
    }
}

// ---------------------------------------------------------------------------
// CompoundRecord – one measured compound
// ---------------------------------------------------------------------------

/// A single compound (one row of the source table). Validated on
/// construction and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundRecord {
    name: String,
    group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    formula: Option<String>,
    /// Intensity column → intensity, in column order.
    intensities: Vec<(String, f64)>,
}

impl CompoundRecord {
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        formula: Option<String>,
        intensities: Vec<(String, f64)>,
    ) -> Result<Self, PipelineError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PipelineError::EmptyCompoundName);
        }
        if let Some((column, value)) = intensities
            .iter()
            .find(|(_, v)| !v.is_finite() || *v < 0.0)
        {
            return Err(PipelineError::InvalidIntensity {
                compound: name,
                column: column.clone(),
                value: *value,
            });
        }
        Ok(CompoundRecord {
            name,
            group: group.into(),
            formula,
            intensities,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref()
    }

    pub fn intensities(&self) -> &[(String, f64)] {
        &self.intensities
    }

    /// Intensity in `column`; absent columns read as 0.
    pub fn intensity(&self, column: &str) -> f64 {
        self.intensities
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| *v)
            .unwrap_or(0.0)
    }

    /// Sum of the intensities in `columns`.
    pub fn sum_over<'a>(&self, columns: impl IntoIterator<Item = &'a String>) -> f64 {
        columns.into_iter().map(|c| self.intensity(c)).sum()
    }

    /// Mean of the intensities in `columns`; 0 when `columns` is empty.
    pub fn mean_over(&self, columns: &[String]) -> f64 {
        if columns.is_empty() {
            return 0.0;
        }
        self.sum_over(columns) / columns.len() as f64
    }
}

// ---------------------------------------------------------------------------
// RawDataset – the working compound set
// ---------------------------------------------------------------------------

/// Ordered compounds plus the column layout and the set of known groups.
///
/// `groups` is fixed when the dataset is first built and carried unchanged
/// through filtering, so a group that loses all its compounds still reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDataset {
    layout: ColumnLayout,
    compounds: Vec<CompoundRecord>,
    groups: BTreeSet<String>,
}

impl RawDataset {
    /// Build the group index from the layout (column mode) or the compound
    /// labels (label mode).
    pub fn new(layout: ColumnLayout, compounds: Vec<CompoundRecord>) -> Self {
        let groups: BTreeSet<String> = if layout.groups_by_column() {
            layout.sample_groups.values().cloned().collect()
        } else {
            compounds.iter().map(|c| c.group.clone()).collect()
        };
        RawDataset {
            layout,
            compounds,
            groups,
        }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn compounds(&self) -> &[CompoundRecord] {
        &self.compounds
    }

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.compounds.iter().map(|c| c.name())
    }

    /// Number of compounds.
    pub fn len(&self) -> usize {
        self.compounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compounds.is_empty()
    }

    pub fn sample_mean(&self, record: &CompoundRecord) -> f64 {
        record.mean_over(&self.layout.sample_columns)
    }

    pub fn blank_mean(&self, record: &CompoundRecord) -> f64 {
        record.mean_over(&self.layout.blank_columns)
    }

    /// Total signal of a compound: the sum over every sample column.
    pub fn total_intensity(&self, record: &CompoundRecord) -> f64 {
        record.sum_over(&self.layout.sample_columns)
    }

    /// Abundance of `record` in each known group.
    ///
    /// Label mode gives the full sample total to the compound's own group;
    /// column mode sums the sample columns mapped to each group. Every known
    /// group gets an entry, possibly 0.
    pub fn group_abundances(&self, record: &CompoundRecord) -> BTreeMap<&str, f64> {
        let mut out: BTreeMap<&str, f64> =
            self.groups.iter().map(|g| (g.as_str(), 0.0)).collect();
        if self.layout.groups_by_column() {
            for (column, group) in &self.layout.sample_groups {
                if let Some(slot) = out.get_mut(group.as_str()) {
                    *slot += record.intensity(column);
                }
            }
        } else if let Some(slot) = out.get_mut(record.group()) {
            *slot += self.total_intensity(record);
        }
        out
    }

    /// A new dataset holding the compounds whose `keep` flag is set, in their
    /// original order. Layout and groups are carried over.
    pub fn select(&self, keep: &[bool]) -> RawDataset {
        let compounds = self
            .compounds
            .iter()
            .zip(keep)
            .filter(|(_, k)| **k)
            .map(|(c, _)| c.clone())
            .collect();
        RawDataset {
            layout: self.layout.clone(),
            compounds,
            groups: self.groups.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// FormulaLookup
// ---------------------------------------------------------------------------

/// Compound name → chemical formula. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormulaLookup(BTreeMap<String, String>);

impl FormulaLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, formula: impl Into<String>) {
        self.0.insert(name.into(), formula.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormulaLookup {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        FormulaLookup(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ColumnLayout {
        ColumnLayout {
            sample_columns: vec!["s1".into(), "s2".into()],
            blank_columns: vec!["b1".into()],
            sample_groups: BTreeMap::new(),
        }
    }

    fn record(name: &str, group: &str, s1: f64, s2: f64, b1: f64) -> CompoundRecord {
        CompoundRecord::new(
            name,
            group,
            None,
            vec![("s1".into(), s1), ("s2".into(), s2), ("b1".into(), b1)],
        )
        .unwrap()
    }

    #[test]
    fn record_rejects_negative_and_nan() {
        let err = CompoundRecord::new("c", "A", None, vec![("s1".into(), -1.0)]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidIntensity { .. }));
        let err = CompoundRecord::new("c", "A", None, vec![("s1".into(), f64::NAN)]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidIntensity { .. }));
        let err = CompoundRecord::new("  ", "A", None, vec![]).unwrap_err();
        assert_eq!(err, PipelineError::EmptyCompoundName);
    }

    #[test]
    fn means_and_totals_follow_layout() {
        let ds = RawDataset::new(layout(), vec![record("c1", "A", 40.0, 60.0, 3.0)]);
        let c = &ds.compounds()[0];
        assert_eq!(ds.sample_mean(c), 50.0);
        assert_eq!(ds.blank_mean(c), 3.0);
        assert_eq!(ds.total_intensity(c), 100.0);
        assert_eq!(ds.layout().role_of("b1"), Some(ColumnRole::Blank));
        assert_eq!(ds.layout().role_of("name"), None);
    }

    #[test]
    fn label_mode_groups_and_abundances() {
        let ds = RawDataset::new(
            layout(),
            vec![record("c1", "A", 1.0, 2.0, 0.0), record("c2", "B", 5.0, 0.0, 0.0)],
        );
        assert_eq!(ds.groups().iter().collect::<Vec<_>>(), vec!["A", "B"]);
        let ab = ds.group_abundances(&ds.compounds()[0]);
        assert_eq!(ab.get("A"), Some(&3.0));
        assert_eq!(ab.get("B"), Some(&0.0));
    }

    #[test]
    fn column_mode_sums_mapped_columns() {
        let mut layout = layout();
        layout.sample_groups.insert("s1".into(), "X".into());
        layout.sample_groups.insert("s2".into(), "Y".into());
        let ds = RawDataset::new(layout, vec![record("c1", "A", 1.0, 2.0, 9.0)]);
        assert_eq!(ds.groups().iter().collect::<Vec<_>>(), vec!["X", "Y"]);
        let ab = ds.group_abundances(&ds.compounds()[0]);
        assert_eq!(ab.get("X"), Some(&1.0));
        assert_eq!(ab.get("Y"), Some(&2.0));
        assert!(!ab.contains_key("A"));
    }

    #[test]
    fn select_keeps_order_and_groups() {
        let ds = RawDataset::new(
            layout(),
            vec![
                record("c1", "A", 1.0, 1.0, 0.0),
                record("c2", "B", 1.0, 1.0, 0.0),
                record("c3", "A", 1.0, 1.0, 0.0),
            ],
        );
        let kept = ds.select(&[true, false, true]);
        assert_eq!(kept.names().collect::<Vec<_>>(), vec!["c1", "c3"]);
        assert!(kept.groups().contains("B"));
    }

    #[test]
    fn numeric_column_detection() {
        let mut r1 = RawRow::new();
        r1.insert("x".into(), CellValue::Integer(1));
        r1.insert("y".into(), CellValue::String("a".into()));
        let mut r2 = RawRow::new();
        r2.insert("x".into(), CellValue::Null);
        r2.insert("y".into(), CellValue::Null);
        let table = RawTable::from_rows(vec![r1, r2]);
        assert!(table.is_numeric_column("x"));
        assert!(!table.is_numeric_column("y"));
        assert!(!table.is_numeric_column("missing"));
    }

    #[test]
    fn cell_labels() {
        assert_eq!(CellValue::Integer(7).as_label().as_deref(), Some("7"));
        assert_eq!(CellValue::String("  ".into()).as_label(), None);
        assert_eq!(CellValue::Null.as_label(), None);
        assert_eq!(CellValue::String("2.5".into()).as_f64(), Some(2.5));
    }
}

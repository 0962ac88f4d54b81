use std::collections::HashSet;

use log::{info, warn};

use super::model::{CellValue, CompoundRecord, FormulaLookup, RawDataset, RawRow, RawTable};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::stage::Stage;
use crate::state::PipelineState;

// ---------------------------------------------------------------------------
// Formula sources
// ---------------------------------------------------------------------------

/// Where the Loader gets compound formulas from.
///
/// Returning [`PipelineError::FormulaLookupUnavailable`] is not fatal: the
/// Loader continues with an empty lookup.
pub trait FormulaSource {
    fn load_formulas(&self) -> Result<FormulaLookup, PipelineError>;
}

impl FormulaSource for FormulaLookup {
    fn load_formulas(&self) -> Result<FormulaLookup, PipelineError> {
        Ok(self.clone())
    }
}

/// No formula source at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFormulas;

impl FormulaSource for NoFormulas {
    fn load_formulas(&self) -> Result<FormulaLookup, PipelineError> {
        Ok(FormulaLookup::new())
    }
}

// ---------------------------------------------------------------------------
// Load stage
// ---------------------------------------------------------------------------

/// Populate `state.dataset` and `state.formula_lookup` from `table`.
///
/// The passed state is mutated in place, so a caller can hand in a fresh
/// state or one prepared elsewhere.
pub fn load(
    state: &mut PipelineState,
    table: &RawTable,
    formulas: &dyn FormulaSource,
) -> Result<(), PipelineError> {
    state.run_stage(Stage::Load, |state| {
        let lookup = match formulas.load_formulas() {
            Ok(lookup) => lookup,
            Err(err @ PipelineError::FormulaLookupUnavailable { .. }) => {
                warn!("{err}; continuing without formulas");
                FormulaLookup::new()
            }
            Err(err) => return Err(err),
        };
        let dataset = build_dataset(&state.config, table, &lookup)?;
        info!(
            "loaded {} compounds in {} groups ({} formulas known)",
            dataset.len(),
            dataset.groups().len(),
            lookup.len()
        );
        let count = dataset.len();
        state.dataset = dataset;
        state.formula_lookup = lookup;
        Ok(count)
    })
}

/// Validate the table against the configured columns and build typed records.
pub fn build_dataset(
    config: &PipelineConfig,
    table: &RawTable,
    lookup: &FormulaLookup,
) -> Result<RawDataset, PipelineError> {
    if config.sample_columns.is_empty() {
        return Err(PipelineError::NoSampleColumns);
    }
    let required = [&config.name_column, &config.group_column]
        .into_iter()
        .chain(config.formula_column.iter())
        .chain(config.sample_columns.iter())
        .chain(config.blank_columns.iter());
    for column in required {
        if !table.has_column(column) {
            return Err(PipelineError::MissingColumn {
                column: column.clone(),
            });
        }
    }
    for column in config.sample_groups.keys() {
        if !config.sample_columns.contains(column) {
            return Err(PipelineError::MissingColumn {
                column: column.clone(),
            });
        }
    }

    let layout = config.layout();
    let mut seen: HashSet<String> = HashSet::with_capacity(table.len());
    let mut compounds = Vec::with_capacity(table.len());

    for (row_no, row) in table.rows.iter().enumerate() {
        let name = label(row, &config.name_column).ok_or_else(|| PipelineError::InvalidRecord {
            row: row_no,
            reason: format!("missing compound name in '{}'", config.name_column),
        })?;
        if !seen.insert(name.clone()) {
            return Err(PipelineError::DuplicateCompound { name });
        }
        let group = label(row, &config.group_column).ok_or_else(|| PipelineError::InvalidRecord {
            row: row_no,
            reason: format!("missing group label in '{}'", config.group_column),
        })?;

        let intensities = layout
            .intensity_columns()
            .map(|column| Ok((column.clone(), intensity(row, column, row_no)?)))
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let formula = config
            .formula_column
            .as_ref()
            .and_then(|column| label(row, column))
            .or_else(|| lookup.get(&name).map(str::to_string));

        let record = CompoundRecord::new(name, group, formula, intensities).map_err(|err| {
            PipelineError::InvalidRecord {
                row: row_no,
                reason: err.to_string(),
            }
        })?;
        compounds.push(record);
    }

    Ok(RawDataset::new(layout, compounds))
}

fn label(row: &RawRow, column: &str) -> Option<String> {
    row.get(column).and_then(|v| v.as_label())
}

/// Null and missing cells read as 0.
fn intensity(row: &RawRow, column: &str, row_no: usize) -> Result<f64, PipelineError> {
    match row.get(column) {
        None | Some(CellValue::Null) => Ok(0.0),
        Some(value) => value.as_f64().ok_or_else(|| PipelineError::InvalidRecord {
            row: row_no,
            reason: format!("'{column}' value '{value}' is not a number"),
        }),
    }
}

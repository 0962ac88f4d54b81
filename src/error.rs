use thiserror::Error;

use crate::stage::Stage;
use crate::state::PipelineState;

/// Errors raised by pipeline stages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// A required identifying or intensity column is absent from the raw table.
    #[error("required column '{column}' is missing from the raw dataset")]
    MissingColumn { column: String },

    #[error("no sample intensity columns are configured")]
    NoSampleColumns,

    /// A stage was invoked before one of its prerequisites completed.
    #[error("stage '{stage}' cannot run before '{missing}' has completed")]
    StageOrderViolation { stage: Stage, missing: Stage },

    #[error("{name} = {value} is outside the valid range {range}")]
    ThresholdOutOfRange {
        name: &'static str,
        value: f64,
        range: &'static str,
    },

    /// Recoverable: the Loader logs it and continues with an empty lookup.
    #[error("formula lookup unavailable: {reason}")]
    FormulaLookupUnavailable { reason: String },

    #[error("row {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },

    #[error("compound name must not be empty")]
    EmptyCompoundName,

    #[error("compound '{compound}' has invalid intensity {value} in column '{column}'")]
    InvalidIntensity {
        compound: String,
        column: String,
        value: f64,
    },

    #[error("compound '{name}' appears more than once")]
    DuplicateCompound { name: String },

    #[error("overlap over {count} groups exceeds the supported maximum of {max}")]
    TooManyGroups { count: usize, max: usize },
}

/// A halted pipeline run: the failing stage, its error, and the partially
/// completed state (with the failure already recorded in `stage_results`).
#[derive(Debug, Error)]
#[error("pipeline halted at stage '{stage}': {source}")]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
    pub state: Box<PipelineState>,
}

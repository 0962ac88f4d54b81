use std::fmt;

use serde::Serialize;

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Stage – the fixed total order of the pipeline
// ---------------------------------------------------------------------------

/// One step of the analytical pipeline.
///
/// The derived `Ord` is the execution order: `Load < Blank < Cumulative <
/// Diversity < Overlap`. A stage may only run once every stage before it has
/// completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Blank,
    Cumulative,
    Diversity,
    Overlap,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Load,
        Stage::Blank,
        Stage::Cumulative,
        Stage::Diversity,
        Stage::Overlap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Blank => "blank",
            Stage::Cumulative => "cumulative",
            Stage::Diversity => "diversity",
            Stage::Overlap => "overlap",
        }
    }

    /// Stages that must have completed before this one may run.
    pub fn prerequisites(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().take_while(move |s| *s < self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StageResult – provenance of one stage execution
// ---------------------------------------------------------------------------

/// Outcome of one attempted stage. Never modified after it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    stage: Stage,
    success: bool,
    input_count: usize,
    output_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl StageResult {
    pub fn success(stage: Stage, input_count: usize, output_count: usize) -> Self {
        StageResult {
            stage,
            success: true,
            input_count,
            output_count,
            error: None,
        }
    }

    /// A failed stage produces no output, so `output_count` is 0.
    pub fn failure(stage: Stage, input_count: usize, error: &PipelineError) -> Self {
        StageResult {
            stage,
            success: false,
            input_count,
            output_count: 0,
            error: Some(error.to_string()),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn output_count(&self) -> usize {
        self.output_count
    }

    /// Error detail; present iff the stage failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl fmt::Display for StageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(
                f,
                "{}: ok ({} -> {})",
                self.stage, self.input_count, self.output_count
            ),
            Some(err) => write!(f, "{}: failed ({} in): {err}", self.stage, self.input_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_matches_execution_sequence() {
        let mut sorted = Stage::ALL;
        sorted.sort();
        assert_eq!(sorted, Stage::ALL);
        assert!(Stage::Load < Stage::Overlap);
    }

    #[test]
    fn prerequisites_are_every_earlier_stage() {
        assert_eq!(Stage::Load.prerequisites().count(), 0);
        assert_eq!(
            Stage::Diversity.prerequisites().collect::<Vec<_>>(),
            vec![Stage::Load, Stage::Blank, Stage::Cumulative]
        );
    }

    #[test]
    fn failure_carries_error_and_zero_output() {
        let err = PipelineError::NoSampleColumns;
        let result = StageResult::failure(Stage::Load, 0, &err);
        assert!(!result.is_success());
        assert_eq!(result.output_count(), 0);
        assert_eq!(result.error(), Some(err.to_string().as_str()));

        let ok = StageResult::success(Stage::Blank, 4, 3);
        assert!(ok.error().is_none());
        assert_eq!(ok.to_string(), "blank: ok (4 -> 3)");
    }

    #[test]
    fn serializes_stage_names_lowercase() {
        let json = serde_json::to_string(&StageResult::success(Stage::Cumulative, 3, 2)).unwrap();
        assert_eq!(
            json,
            r#"{"stage":"cumulative","success":true,"input_count":3,"output_count":2}"#
        );
    }
}

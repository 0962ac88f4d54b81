use log::{debug, warn};
use serde::Serialize;

use crate::analysis::diversity::DiversityReport;
use crate::analysis::overlap::OverlapReport;
use crate::config::PipelineConfig;
use crate::data::model::{CompoundRecord, FormulaLookup, RawDataset};
use crate::error::PipelineError;
use crate::stage::{Stage, StageResult};

// ---------------------------------------------------------------------------
// Pipeline state
// ---------------------------------------------------------------------------

/// The carrier threaded through every stage of one pipeline run.
///
/// Owned by exactly one run; stages receive it as `&mut` and either replace
/// `dataset` wholesale or attach an analysis result.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Resolved configuration (read-only to stages).
    pub config: PipelineConfig,

    /// Current working compound set.
    pub dataset: RawDataset,

    pub formula_lookup: FormulaLookup,

    /// Stages that completed successfully, in execution order, no repeats.
    completed_stages: Vec<Stage>,

    /// One entry per attempted stage, failures included.
    stage_results: Vec<StageResult>,

    pub diversity: Option<DiversityReport>,

    pub overlap: Option<OverlapReport>,
}

impl PipelineState {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn completed_stages(&self) -> &[Stage] {
        &self.completed_stages
    }

    pub fn stage_results(&self) -> &[StageResult] {
        &self.stage_results
    }

    pub fn has_completed(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Fail with the first earlier stage that has not completed.
    pub fn check_prerequisites(&self, stage: Stage) -> Result<(), PipelineError> {
        match stage.prerequisites().find(|p| !self.has_completed(*p)) {
            Some(missing) => Err(PipelineError::StageOrderViolation { stage, missing }),
            None => Ok(()),
        }
    }

    /// Run one stage body under the ordering rules and record its provenance.
    ///
    /// `body` returns the number of compounds it leaves in the dataset. The
    /// result is appended whether the stage succeeds or not; the stage joins
    /// `completed_stages` only on success.
    pub(crate) fn run_stage<F>(&mut self, stage: Stage, body: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut PipelineState) -> Result<usize, PipelineError>,
    {
        let input_count = match stage {
            Stage::Load => 0,
            _ => self.dataset.len(),
        };
        match self.check_prerequisites(stage).and_then(|()| body(self)) {
            Ok(output_count) => {
                debug!("stage '{stage}' finished: {input_count} -> {output_count}");
                self.stage_results
                    .push(StageResult::success(stage, input_count, output_count));
                if !self.has_completed(stage) {
                    self.completed_stages.push(stage);
                }
                Ok(())
            }
            Err(err) => {
                warn!("stage '{stage}' failed: {err}");
                self.stage_results
                    .push(StageResult::failure(stage, input_count, &err));
                Err(err)
            }
        }
    }

    /// Serializable view handed to rendering / the CLI.
    pub fn summary(&self) -> PipelineSummary<'_> {
        PipelineSummary {
            stage_results: &self.stage_results,
            compounds: self.dataset.compounds(),
            diversity: self.diversity.as_ref(),
            overlap: self.overlap.as_ref(),
        }
    }
}

/// What a finished run exposes to its consumers.
#[derive(Debug, Serialize)]
pub struct PipelineSummary<'a> {
    pub stage_results: &'a [StageResult],
    pub compounds: &'a [CompoundRecord],
    pub diversity: Option<&'a DiversityReport>,
    pub overlap: Option<&'a OverlapReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prerequisite_check_names_first_missing_stage() {
        let state = PipelineState::default();
        assert_eq!(state.check_prerequisites(Stage::Load), Ok(()));
        assert_eq!(
            state.check_prerequisites(Stage::Diversity),
            Err(PipelineError::StageOrderViolation {
                stage: Stage::Diversity,
                missing: Stage::Load,
            })
        );
    }

    #[test]
    fn run_stage_records_success_once_in_completed() {
        let mut state = PipelineState::default();
        state.run_stage(Stage::Load, |_| Ok(0)).unwrap();
        state.run_stage(Stage::Load, |_| Ok(0)).unwrap();
        assert_eq!(state.completed_stages(), &[Stage::Load]);
        assert_eq!(state.stage_results().len(), 2);
    }

    #[test]
    fn run_stage_records_failure_without_completing() {
        let mut state = PipelineState::default();
        let err = state.run_stage(Stage::Blank, |_| Ok(0)).unwrap_err();
        assert!(matches!(err, PipelineError::StageOrderViolation { .. }));
        assert!(state.completed_stages().is_empty());
        let last = &state.stage_results()[0];
        assert!(!last.is_success());
        assert_eq!(last.stage(), Stage::Blank);
        assert!(last.error().is_some());
    }

    #[test]
    fn failing_body_is_recorded() {
        let mut state = PipelineState::default();
        let result = state.run_stage(Stage::Load, |_| Err(PipelineError::NoSampleColumns));
        assert_eq!(result, Err(PipelineError::NoSampleColumns));
        assert_eq!(state.stage_results().len(), 1);
        assert!(!state.has_completed(Stage::Load));
    }
}

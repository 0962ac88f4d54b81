use log::{error, info};

use crate::analysis::{diversity, overlap};
use crate::config::PipelineConfig;
use crate::data::filter::{blank_filter, cumulative_filter};
use crate::data::load::{load, FormulaSource};
use crate::data::model::RawTable;
use crate::error::{PipelineError, PipelineFailure};
use crate::stage::Stage;
use crate::state::PipelineState;

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives the stages over one input table in their fixed order.
pub struct Pipeline<'a> {
    table: &'a RawTable,
    formulas: &'a dyn FormulaSource,
}

impl<'a> Pipeline<'a> {
    pub fn new(table: &'a RawTable, formulas: &'a dyn FormulaSource) -> Self {
        Self { table, formulas }
    }

    /// Run every stage on a fresh state.
    pub fn run(&self, config: PipelineConfig) -> Result<PipelineState, PipelineFailure> {
        self.resume(PipelineState::new(config))
    }

    /// Run the stages `state` has not completed yet, stopping at the first
    /// failure. The failure carries the partial state for diagnostics.
    pub fn resume(&self, mut state: PipelineState) -> Result<PipelineState, PipelineFailure> {
        for stage in Stage::ALL {
            if state.has_completed(stage) {
                info!("stage '{stage}' already completed, skipping");
                continue;
            }
            info!("running stage '{stage}'");
            if let Err(source) = self.run_stage(stage, &mut state) {
                error!("pipeline halted at stage '{stage}': {source}");
                for result in state.stage_results() {
                    error!("  {result}");
                }
                return Err(PipelineFailure {
                    stage,
                    source,
                    state: Box::new(state),
                });
            }
        }
        info!(
            "pipeline finished: {} compounds retained",
            state.dataset.len()
        );
        Ok(state)
    }

    fn run_stage(&self, stage: Stage, state: &mut PipelineState) -> Result<(), PipelineError> {
        match stage {
            Stage::Load => load(state, self.table, self.formulas),
            Stage::Blank => blank_filter(state),
            Stage::Cumulative => cumulative_filter(state),
            Stage::Diversity => diversity::calculate(state),
            Stage::Overlap => overlap::calculate(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::load::NoFormulas;
    use crate::data::model::{CellValue, RawRow};

    fn table() -> RawTable {
        let rows = [("c1", 10.0), ("c2", 5.0)]
            .into_iter()
            .map(|(name, s)| {
                let mut row = RawRow::new();
                row.insert("name".into(), CellValue::String(name.into()));
                row.insert("group".into(), CellValue::String("A".into()));
                row.insert("s1".into(), CellValue::Float(s));
                row
            })
            .collect();
        RawTable::from_rows(rows)
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            sample_columns: vec!["s1".into()],
            ..Default::default()
        }
    }

    #[test]
    fn runs_all_stages_in_order() {
        let t = table();
        let state = Pipeline::new(&t, &NoFormulas).run(config()).unwrap();
        assert_eq!(state.completed_stages(), &Stage::ALL);
        assert_eq!(state.stage_results().len(), 5);
        assert!(state.diversity.is_some());
        assert!(state.overlap.is_some());
    }

    #[test]
    fn halts_on_first_failure_with_partial_state() {
        let t = table();
        let cfg = PipelineConfig {
            cumulative_percent: 150.0,
            ..config()
        };
        let failure = Pipeline::new(&t, &NoFormulas).run(cfg).unwrap_err();
        assert_eq!(failure.stage, Stage::Cumulative);
        assert!(matches!(failure.source, PipelineError::ThresholdOutOfRange { .. }));
        assert_eq!(
            failure.state.completed_stages(),
            &[Stage::Load, Stage::Blank]
        );
        let results = failure.state.stage_results();
        assert_eq!(results.len(), 3);
        assert!(!results[2].is_success());
        assert!(failure.state.diversity.is_none());
    }

    #[test]
    fn resume_skips_completed_stages() {
        let t = table();
        let mut state = PipelineState::new(config());
        load(&mut state, &t, &NoFormulas).unwrap();
        blank_filter(&mut state).unwrap();

        let state = Pipeline::new(&t, &NoFormulas).resume(state).unwrap();
        let stages: Vec<Stage> = state.stage_results().iter().map(|r| r.stage()).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
    }
}

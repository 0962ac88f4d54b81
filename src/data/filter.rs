use log::{debug, info};

use super::model::RawDataset;
use crate::error::PipelineError;
use crate::stage::Stage;
use crate::state::PipelineState;

// ---------------------------------------------------------------------------
// Blank (contamination) filter
// ---------------------------------------------------------------------------

/// Keep flags for the blank test.
///
/// A compound passes when:
/// * its blank mean is 0 → nothing measured in the blanks, cannot be contamination
/// * `sample_mean / blank_mean >= ratio_threshold`
pub fn blank_keep_flags(dataset: &RawDataset, ratio_threshold: f64) -> Vec<bool> {
    dataset
        .compounds()
        .iter()
        .map(|c| {
            let blank_mean = dataset.blank_mean(c);
            if blank_mean == 0.0 {
                return true;
            }
            let ratio = dataset.sample_mean(c) / blank_mean;
            let keep = ratio >= ratio_threshold;
            if !keep {
                debug!("blank filter drops '{}' (ratio {ratio:.3})", c.name());
            }
            keep
        })
        .collect()
}

/// Remove compounds whose signal is indistinguishable from the blanks.
pub fn filter_blanks(dataset: &RawDataset, ratio_threshold: f64) -> RawDataset {
    dataset.select(&blank_keep_flags(dataset, ratio_threshold))
}

/// Blank stage: requires `load`.
pub fn blank_filter(state: &mut PipelineState) -> Result<(), PipelineError> {
    state.run_stage(Stage::Blank, |state| {
        let threshold = state.config.checked_ratio_threshold()?;
        let filtered = filter_blanks(&state.dataset, threshold);
        info!(
            "blank filter (ratio >= {threshold}): kept {} of {} compounds",
            filtered.len(),
            state.dataset.len()
        );
        state.dataset = filtered;
        Ok(state.dataset.len())
    })
}

// ---------------------------------------------------------------------------
// Cumulative-contribution filter
// ---------------------------------------------------------------------------

/// Keep flags for the smallest top-ranked prefix covering `percent` of the
/// total signal.
///
/// Compounds are ranked by total sample intensity, descending; ties keep
/// dataset order. A compound is included while the running sum before it is
/// still below the target, so the compound that crosses the target is kept.
/// `percent >= 100` keeps everything, `percent == 0` keeps nothing.
pub fn cumulative_keep_flags(dataset: &RawDataset, percent: f64) -> Vec<bool> {
    let n = dataset.len();
    if percent >= 100.0 {
        return vec![true; n];
    }

    let totals: Vec<f64> = dataset
        .compounds()
        .iter()
        .map(|c| dataset.total_intensity(c))
        .collect();

    // Stable sort: equal totals stay in dataset order.
    let mut ranked: Vec<usize> = (0..n).collect();
    ranked.sort_by(|&a, &b| totals[b].total_cmp(&totals[a]));

    // Summed in rank order so a full walk reproduces the grand total exactly.
    let grand_total: f64 = ranked.iter().map(|&i| totals[i]).sum();
    let target = grand_total * percent / 100.0;

    let mut keep = vec![false; n];
    let mut running = 0.0;
    for &i in &ranked {
        if running >= target {
            break;
        }
        keep[i] = true;
        running += totals[i];
    }
    debug!("cumulative filter: target {target:.4} of {grand_total:.4}, reached {running:.4}");
    keep
}

/// Retain the compounds covering `percent` of the total signal, in their
/// original order.
pub fn filter_cumulative(dataset: &RawDataset, percent: f64) -> RawDataset {
    dataset.select(&cumulative_keep_flags(dataset, percent))
}

/// Cumulative stage: requires `blank`.
pub fn cumulative_filter(state: &mut PipelineState) -> Result<(), PipelineError> {
    state.run_stage(Stage::Cumulative, |state| {
        let percent = state.config.checked_cumulative_percent()?;
        let filtered = filter_cumulative(&state.dataset, percent);
        info!(
            "cumulative filter ({percent}%): kept {} of {} compounds",
            filtered.len(),
            state.dataset.len()
        );
        state.dataset = filtered;
        Ok(state.dataset.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::data::model::{ColumnLayout, CompoundRecord};

    fn layout() -> ColumnLayout {
        ColumnLayout {
            sample_columns: vec!["s1".into(), "s2".into()],
            blank_columns: vec!["b1".into(), "b2".into()],
            ..Default::default()
        }
    }

    fn record(name: &str, samples: [f64; 2], blanks: [f64; 2]) -> CompoundRecord {
        CompoundRecord::new(
            name,
            "A",
            None,
            vec![
                ("s1".into(), samples[0]),
                ("s2".into(), samples[1]),
                ("b1".into(), blanks[0]),
                ("b2".into(), blanks[1]),
            ],
        )
        .unwrap()
    }

    fn totals_dataset(totals: &[f64]) -> RawDataset {
        let compounds = totals
            .iter()
            .enumerate()
            .map(|(i, t)| record(&format!("c{i}"), [*t, 0.0], [0.0, 0.0]))
            .collect();
        RawDataset::new(layout(), compounds)
    }

    fn kept_names(ds: &RawDataset) -> Vec<&str> {
        ds.names().collect()
    }

    #[test]
    fn zero_blank_is_always_kept() {
        let ds = RawDataset::new(layout(), vec![record("c1", [0.0, 0.0], [0.0, 0.0])]);
        let out = filter_blanks(&ds, 1_000.0);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn ratio_below_threshold_is_dropped() {
        let ds = RawDataset::new(
            layout(),
            vec![
                record("keep", [30.0, 30.0], [10.0, 10.0]),
                record("drop", [12.0, 12.0], [10.0, 10.0]),
                record("edge", [20.0, 20.0], [10.0, 10.0]),
            ],
        );
        let out = filter_blanks(&ds, 2.0);
        assert_eq!(kept_names(&out), vec!["keep", "edge"]);
    }

    #[test]
    fn cumulative_includes_crossing_compound() {
        let ds = totals_dataset(&[40.0, 100.0, 60.0]);
        let out = filter_cumulative(&ds, 75.0);
        assert_eq!(kept_names(&out), vec!["c1", "c2"]);
    }

    #[test]
    fn cumulative_exact_hit_stops() {
        // 100 + 60 = 160 = 80% exactly; 40 is not needed.
        let ds = totals_dataset(&[100.0, 60.0, 40.0]);
        let out = filter_cumulative(&ds, 80.0);
        assert_eq!(kept_names(&out), vec!["c0", "c1"]);
    }

    #[test]
    fn cumulative_edges() {
        let ds = totals_dataset(&[5.0, 0.0, 3.0]);
        assert_eq!(filter_cumulative(&ds, 100.0).len(), 3);
        assert!(filter_cumulative(&ds, 0.0).is_empty());
    }

    #[test]
    fn cumulative_ties_follow_dataset_order() {
        let ds = totals_dataset(&[10.0, 10.0, 10.0, 10.0]);
        let out = filter_cumulative(&ds, 50.0);
        assert_eq!(kept_names(&out), vec!["c0", "c1"]);
    }

    #[test]
    fn stages_check_order_and_thresholds() {
        let mut state = PipelineState::new(PipelineConfig::default());
        let err = cumulative_filter(&mut state).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageOrderViolation {
                stage: Stage::Cumulative,
                missing: Stage::Load
            }
        ));

        let mut state = PipelineState::new(PipelineConfig {
            ratio_threshold: f64::INFINITY,
            ..Default::default()
        });
        state.run_stage(Stage::Load, |_| Ok(0)).unwrap();
        let err = blank_filter(&mut state).unwrap_err();
        assert!(matches!(err, PipelineError::ThresholdOutOfRange { .. }));
        assert_eq!(state.completed_stages(), &[Stage::Load]);
    }
}

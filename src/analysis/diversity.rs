//! Per-group alpha diversity of the retained compound set.
//!
//! Richness counts compounds with nonzero abundance in a group; Shannon
//! entropy uses the natural log over relative abundances. Zero abundances
//! contribute nothing, so `ln(0)` is never evaluated.

use std::collections::BTreeMap;

use log::info;
use serde::Serialize;

use crate::data::model::RawDataset;
use crate::error::PipelineError;
use crate::stage::Stage;
use crate::state::PipelineState;

/// Group label → diversity of that group.
pub type DiversityReport = BTreeMap<String, GroupDiversity>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupDiversity {
    pub richness: usize,
    pub shannon: f64,
    pub simpson: f64,
    /// Pielou evenness `H / ln(richness)`; 0 when richness <= 1.
    pub evenness: f64,
    pub total_abundance: f64,
}

/// Number of nonzero entries.
pub fn richness(abundances: &[f64]) -> usize {
    abundances.iter().filter(|&&a| a > 0.0).count()
}

/// Shannon entropy: H = -Σ p_i * ln(p_i)
pub fn shannon(abundances: &[f64]) -> f64 {
    let total: f64 = abundances.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }

    let mut h = 0.0;
    for &a in abundances {
        if a > 0.0 {
            let p = a / total;
            h -= p * p.ln();
        }
    }
    h
}

/// Simpson's diversity index: 1 - Σ p_i²
pub fn simpson(abundances: &[f64]) -> f64 {
    let total: f64 = abundances.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }

    let sum_p2: f64 = abundances
        .iter()
        .filter(|&&a| a > 0.0)
        .map(|&a| (a / total).powi(2))
        .sum();
    1.0 - sum_p2
}

pub fn group_diversity(abundances: &[f64]) -> GroupDiversity {
    let richness = richness(abundances);
    let shannon = shannon(abundances);
    let evenness = if richness > 1 {
        shannon / (richness as f64).ln()
    } else {
        0.0
    };
    GroupDiversity {
        richness,
        shannon,
        simpson: simpson(abundances),
        evenness,
        total_abundance: abundances.iter().sum(),
    }
}

/// Diversity of every known group, including groups left empty by filtering.
pub fn diversity_by_group(dataset: &RawDataset) -> DiversityReport {
    let mut columns: BTreeMap<&str, Vec<f64>> = dataset
        .groups()
        .iter()
        .map(|g| (g.as_str(), Vec::with_capacity(dataset.len())))
        .collect();
    for compound in dataset.compounds() {
        for (group, abundance) in dataset.group_abundances(compound) {
            if let Some(column) = columns.get_mut(group) {
                column.push(abundance);
            }
        }
    }
    columns
        .into_iter()
        .map(|(group, abundances)| (group.to_string(), group_diversity(&abundances)))
        .collect()
}

/// Diversity stage: requires `cumulative`.
pub fn calculate(state: &mut PipelineState) -> Result<(), PipelineError> {
    state.run_stage(Stage::Diversity, |state| {
        let report = diversity_by_group(&state.dataset);
        for (group, d) in &report {
            info!(
                "group '{group}': richness {}, shannon {:.4}",
                d.richness, d.shannon
            );
        }
        state.diversity = Some(report);
        Ok(state.dataset.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{ColumnLayout, CompoundRecord};

    #[test]
    fn shannon_two_compounds() {
        let h = shannon(&[0.6, 0.4]);
        assert!((h - 0.673_011_667).abs() < 1e-6);
        // Scale-free: raw intensities give the same value.
        assert!((shannon(&[60.0, 40.0]) - h).abs() < 1e-12);
    }

    #[test]
    fn shannon_uniform_is_ln_k() {
        let h = shannon(&[25.0, 25.0, 25.0, 25.0]);
        assert!((h - 4.0f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn single_compound_and_zeros() {
        assert_eq!(shannon(&[100.0, 0.0, 0.0]), 0.0);
        assert_eq!(richness(&[100.0, 0.0, 0.0]), 1);
        assert_eq!(group_diversity(&[0.0, 0.0]).richness, 0);
        assert_eq!(group_diversity(&[0.0, 0.0]).shannon, 0.0);
        assert_eq!(group_diversity(&[]).shannon, 0.0);
    }

    #[test]
    fn simpson_and_evenness() {
        let d = group_diversity(&[25.0, 25.0, 25.0, 25.0]);
        assert!((d.simpson - 0.75).abs() < 1e-10);
        assert!((d.evenness - 1.0).abs() < 1e-10);
        assert_eq!(d.total_abundance, 100.0);
    }

    #[test]
    fn by_group_keeps_empty_groups() {
        let layout = ColumnLayout {
            sample_columns: vec!["s1".into()],
            ..Default::default()
        };
        let compounds = vec![
            CompoundRecord::new("c1", "A", None, vec![("s1".into(), 60.0)]).unwrap(),
            CompoundRecord::new("c2", "A", None, vec![("s1".into(), 40.0)]).unwrap(),
            CompoundRecord::new("c3", "B", None, vec![("s1".into(), 0.0)]).unwrap(),
        ];
        let report = diversity_by_group(&RawDataset::new(layout, compounds));
        assert_eq!(report["A"].richness, 2);
        assert!((report["A"].shannon - 0.673_011_667).abs() < 1e-6);
        assert_eq!(report["B"].richness, 0);
        assert_eq!(report["B"].shannon, 0.0);
    }
}

//! Venn-style partition of the compound set by exact group membership.

use log::info;
use serde::Serialize;

use crate::data::model::RawDataset;
use crate::error::PipelineError;
use crate::stage::Stage;
use crate::state::PipelineState;

/// Largest group count partitioned; 2^16 - 1 cells.
pub const MAX_OVERLAP_GROUPS: usize = 16;

/// Compounds present in exactly `groups` and absent from every other group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlapCell {
    pub groups: Vec<String>,
    pub compounds: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverlapReport {
    /// Sorted group labels; bit `i` of a cell mask refers to `groups[i]`.
    pub groups: Vec<String>,
    /// One cell per non-empty subset of `groups`, ordered by mask.
    pub cells: Vec<OverlapCell>,
    /// Column mode only: compounds with no nonzero abundance in any group.
    pub unassigned: Vec<String>,
}

impl OverlapReport {
    /// The cell for exactly this set of groups, in any order.
    pub fn cell(&self, groups: &[&str]) -> Option<&OverlapCell> {
        let mask = groups.iter().try_fold(0usize, |mask, g| {
            self.groups
                .iter()
                .position(|known| known == g)
                .map(|i| mask | (1 << i))
        })?;
        if mask == 0 {
            return None;
        }
        self.cells.get(mask - 1)
    }
}

/// Partition `dataset` into disjoint cells, one per non-empty group subset.
pub fn partition(dataset: &RawDataset) -> Result<OverlapReport, PipelineError> {
    let groups: Vec<String> = dataset.groups().iter().cloned().collect();
    if groups.len() > MAX_OVERLAP_GROUPS {
        return Err(PipelineError::TooManyGroups {
            count: groups.len(),
            max: MAX_OVERLAP_GROUPS,
        });
    }

    let n_cells = (1usize << groups.len()) - 1;
    let mut cells: Vec<OverlapCell> = (1..=n_cells)
        .map(|mask| OverlapCell {
            groups: groups
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, g)| g.clone())
                .collect(),
            compounds: Vec::new(),
        })
        .collect();
    let mut unassigned = Vec::new();

    let by_column = dataset.layout().groups_by_column();
    for compound in dataset.compounds() {
        let mask = if by_column {
            // BTreeMap iteration matches the sorted `groups` order.
            dataset
                .group_abundances(compound)
                .values()
                .enumerate()
                .filter(|(_, a)| **a > 0.0)
                .fold(0usize, |mask, (i, _)| mask | (1 << i))
        } else {
            // A labelled compound belongs to its own group whatever its signal.
            groups
                .iter()
                .position(|g| g == compound.group())
                .map_or(0, |i| 1 << i)
        };
        if mask == 0 {
            unassigned.push(compound.name().to_string());
        } else {
            cells[mask - 1].compounds.push(compound.name().to_string());
        }
    }

    Ok(OverlapReport {
        groups,
        cells,
        unassigned,
    })
}

/// Overlap stage: requires `diversity`.
pub fn calculate(state: &mut PipelineState) -> Result<(), PipelineError> {
    state.run_stage(Stage::Overlap, |state| {
        let report = partition(&state.dataset)?;
        let occupied = report.cells.iter().filter(|c| !c.compounds.is_empty()).count();
        info!(
            "overlap: {} cells over {} groups, {occupied} occupied, {} unassigned",
            report.cells.len(),
            report.groups.len(),
            report.unassigned.len()
        );
        state.overlap = Some(report);
        Ok(state.dataset.len())
    })
}

//! Result checks and quality metrics.
//!
//! - `verify_*`: every item packed exactly once and no bin over capacity
//! - [`utilization`]: fraction of opened capacity actually used
//! - [`square_sum_spread`]: how unevenly quadratic cost lands inside groups

use std::cmp::Ordering;

use crate::error::{PackError, PackResult};
use crate::hetero::{CapacityBins, StageBins};
use crate::length::Length;

/// Tracks which item indices have been seen.
struct Coverage {
    seen: Vec<bool>,
}

impl Coverage {
    fn new(items: usize) -> Self {
        Self {
            seen: vec![false; items],
        }
    }

    fn mark(&mut self, index: usize) -> PackResult<()> {
        match self.seen.get_mut(index) {
            None => Err(PackError::invariant(format!(
                "item index {index} out of range for {} items",
                self.seen.len()
            ))),
            Some(true) => Err(PackError::invariant(format!("item {index} packed twice"))),
            Some(slot) => {
                *slot = true;
                Ok(())
            }
        }
    }

    fn finish(self) -> PackResult<()> {
        match self.seen.iter().position(|&s| !s) {
            Some(index) => Err(PackError::invariant(format!("item {index} was not packed"))),
            None => Ok(()),
        }
    }
}

fn check_bin<L: Length>(
    lengths: &[L],
    bin: &[usize],
    capacity: L,
    coverage: &mut Coverage,
    label: &dyn Fn() -> String,
) -> PackResult<()> {
    let mut used = L::ZERO;
    for &index in bin {
        coverage.mark(index)?;
        used += lengths[index];
    }
    if used.cmp_len(&capacity) == Ordering::Greater {
        return Err(PackError::invariant(format!(
            "{} holds {used}, over capacity {capacity}",
            label()
        )));
    }
    Ok(())
}

/// Check a flat list of bins.
pub fn verify_bins<L: Length>(lengths: &[L], bins: &[Vec<usize>], capacity: L) -> PackResult<()> {
    let mut coverage = Coverage::new(lengths.len());
    for (b, bin) in bins.iter().enumerate() {
        check_bin(lengths, bin, capacity, &mut coverage, &|| format!("bin {b}"))?;
    }
    coverage.finish()
}

/// Check grouped output: every group has exactly `bins_per_group` bins.
pub fn verify_groups<L: Length>(
    lengths: &[L],
    groups: &[Vec<Vec<usize>>],
    capacity: L,
    bins_per_group: usize,
) -> PackResult<()> {
    let mut coverage = Coverage::new(lengths.len());
    for (g, group) in groups.iter().enumerate() {
        if group.len() != bins_per_group {
            return Err(PackError::invariant(format!(
                "group {g} has {} bins, expected {bins_per_group}",
                group.len()
            )));
        }
        for (b, bin) in group.iter().enumerate() {
            check_bin(lengths, bin, capacity, &mut coverage, &|| {
                format!("group {g} bin {b}")
            })?;
        }
    }
    coverage.finish()
}

fn check_classes<L: Length>(
    lengths: &[L],
    classes: &[(usize, &[Vec<usize>])],
    capacities: &[L],
    coverage: &mut Coverage,
    stage: Option<usize>,
) -> PackResult<()> {
    let prefix = stage.map_or_else(String::new, |s| format!("stage {s} "));
    if classes.len() != capacities.len() {
        return Err(PackError::invariant(format!(
            "{prefix}reports {} capacity classes, expected {}",
            classes.len(),
            capacities.len()
        )));
    }
    let groups = classes.first().map_or(0, |(_, bins)| bins.len());
    for (position, &(capacity_index, bins)) in classes.iter().enumerate() {
        if capacity_index != position {
            return Err(PackError::invariant(format!(
                "{prefix}class {position} is labelled {capacity_index}"
            )));
        }
        if bins.len() != groups {
            return Err(PackError::invariant(format!(
                "{prefix}class {capacity_index} has {} bins, expected {groups}",
                bins.len()
            )));
        }
        for (k, bin) in bins.iter().enumerate() {
            check_bin(lengths, bin, capacities[capacity_index], coverage, &|| {
                format!("{prefix}class {capacity_index} bin {k}")
            })?;
        }
    }
    Ok(())
}

/// Check heterogeneous output against its capacity list.
///
/// Every class must report the same number of bins, one per group.
pub fn verify_heterogeneous<L: Length>(
    lengths: &[L],
    result: &[CapacityBins],
    capacities: &[L],
) -> PackResult<()> {
    let mut coverage = Coverage::new(lengths.len());
    if !result.is_empty() {
        let classes: Vec<(usize, &[Vec<usize>])> = result
            .iter()
            .map(|c| (c.capacity_index, c.bins.as_slice()))
            .collect();
        check_classes(lengths, &classes, capacities, &mut coverage, None)?;
    }
    coverage.finish()
}

/// Check staged output against its stage capacity lists.
///
/// Entries must be ordered by stage and then capacity index. Stages that
/// received nothing may be absent only at the end.
pub fn verify_staged<L: Length>(
    lengths: &[L],
    result: &[StageBins],
    stages: &[Vec<L>],
) -> PackResult<()> {
    let mut coverage = Coverage::new(lengths.len());
    let mut rest = result;
    let mut stage_index = 0;
    while !rest.is_empty() {
        let Some(capacities) = stages.get(stage_index) else {
            return Err(PackError::invariant(format!(
                "result references stage {stage_index} of {}",
                stages.len()
            )));
        };
        let take = rest.iter().take_while(|e| e.stage_index == stage_index).count();
        let (current, tail) = rest.split_at(take);
        let classes: Vec<(usize, &[Vec<usize>])> = current
            .iter()
            .map(|e| (e.capacity_index, e.bins.as_slice()))
            .collect();
        check_classes(lengths, &classes, capacities, &mut coverage, Some(stage_index))?;
        rest = tail;
        stage_index += 1;
    }
    coverage.finish()
}

/// Used length over opened capacity. Zero when no bins are open.
pub fn utilization<L: Length>(lengths: &[L], bins: &[Vec<usize>], capacity: L) -> f64 {
    if bins.is_empty() {
        return 0.0;
    }
    let used: f64 = bins
        .iter()
        .flatten()
        .map(|&i| lengths[i].as_f64())
        .sum();
    used / (bins.len() as f64 * capacity.as_f64())
}

/// Mean over groups of the gap between the heaviest and lightest bin, where
/// a bin weighs the sum of its squared item lengths. Empty bins are ignored.
pub fn square_sum_spread<L: Length>(lengths: &[L], groups: &[Vec<Vec<usize>>]) -> f64 {
    if groups.is_empty() {
        return 0.0;
    }
    let total: f64 = groups
        .iter()
        .map(|group| {
            let weights: Vec<f64> = group
                .iter()
                .filter(|bin| !bin.is_empty())
                .map(|bin| bin.iter().map(|&i| lengths[i].as_f64().powi(2)).sum())
                .collect();
            let max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = weights.iter().copied().fold(f64::INFINITY, f64::min);
            if weights.is_empty() { 0.0 } else { max - min }
        })
        .sum();
    total / groups.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_bins() {
        let lengths = [3u32, 5, 2];
        assert!(verify_bins(&lengths, &[vec![1, 2], vec![0]], 7).is_ok());
    }

    #[test]
    fn rejects_duplicate_missing_and_out_of_range() {
        let lengths = [3u32, 5, 2];
        let dup = verify_bins(&lengths, &[vec![0, 0], vec![1, 2]], 10).unwrap_err();
        assert!(dup.to_string().contains("twice"));
        let missing = verify_bins(&lengths, &[vec![0, 1]], 10).unwrap_err();
        assert!(missing.to_string().contains("item 2"));
        assert!(verify_bins(&lengths, &[vec![0, 1, 2, 3]], 20).is_err());
    }

    #[test]
    fn rejects_overfull_bin() {
        let err = verify_bins(&[4u32, 4], &[vec![0, 1]], 7).unwrap_err();
        assert!(matches!(err, PackError::Invariant(_)));
    }

    #[test]
    fn groups_must_have_fixed_size() {
        let lengths = [1u32, 1, 1];
        assert!(verify_groups(&lengths, &[vec![vec![0], vec![1, 2]]], 4, 2).is_ok());
        assert!(verify_groups(&lengths, &[vec![vec![0, 1, 2]]], 4, 2).is_err());
    }

    #[test]
    fn heterogeneous_classes_must_align() {
        let lengths = [6u32, 2];
        let ok = vec![
            CapacityBins { capacity_index: 0, bins: vec![vec![1]] },
            CapacityBins { capacity_index: 1, bins: vec![vec![0]] },
        ];
        assert!(verify_heterogeneous(&lengths, &ok, &[4, 8]).is_ok());

        let uneven = vec![
            CapacityBins { capacity_index: 0, bins: vec![vec![1], vec![]] },
            CapacityBins { capacity_index: 1, bins: vec![vec![0]] },
        ];
        assert!(verify_heterogeneous(&lengths, &uneven, &[4, 8]).is_err());

        let overfull = vec![
            CapacityBins { capacity_index: 0, bins: vec![vec![0]] },
            CapacityBins { capacity_index: 1, bins: vec![vec![1]] },
        ];
        assert!(verify_heterogeneous(&lengths, &overfull, &[4, 8]).is_err());
    }

    #[test]
    fn staged_checks_each_stage() {
        let lengths = [5u32, 5, 3];
        let stages = vec![vec![5, 5], vec![4]];
        let result = vec![
            StageBins { stage_index: 0, capacity_index: 0, bins: vec![vec![0]] },
            StageBins { stage_index: 0, capacity_index: 1, bins: vec![vec![1]] },
            StageBins { stage_index: 1, capacity_index: 0, bins: vec![vec![2]] },
        ];
        assert!(verify_staged(&lengths, &result, &stages).is_ok());
        assert!(verify_staged(&lengths, &result[..2], &stages).is_err());
    }

    #[test]
    fn utilization_of_half_full_bins() {
        let lengths = [5u32, 5];
        assert_eq!(utilization(&lengths, &[vec![0], vec![1]], 10), 0.5);
        assert_eq!(utilization::<u32>(&[], &[], 10), 0.0);
    }

    #[test]
    fn spread_ignores_empty_bins() {
        let lengths = [3u32, 1, 2];
        // Group 0: 9+1 vs 4 -> 6. Group 1: single non-empty bin -> 0.
        let groups = vec![vec![vec![0, 1], vec![2]], vec![vec![], vec![2]]];
        assert_eq!(square_sum_spread(&lengths, &groups), 3.0);
    }
}

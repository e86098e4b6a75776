//! Heterogeneous-capacity packers.
//!
//! A capacity list describes one heterogeneous group: one bin per listed
//! capacity (for example one micro-batch per data-parallel rank, where
//! ranks differ in memory). [`ohgbfd`] opens as many such groups as the
//! items need. [`oshgbfd`] walks an ordered list of stages, each offering
//! exactly one group, and lets whatever does not fit flow to the next stage.
//!
//! Bin selection is best fit across every open bin of every capacity class.
//! Optional per-class weights scale the leftover space so that heavier
//! classes are preferred: the score is `(remaining - length) / weight` and
//! the lowest score wins, ties going to the lower capacity index and then
//! to the earlier bin.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bin::{Bin, into_member_lists};
use crate::error::{PackError, PackResult};
use crate::items::{decreasing_order, validate_capacity};
use crate::length::{Length, max_len};
use crate::tracker::CapacityTracker;

/// Bins drawn from one capacity class. `bins[k]` belongs to group `k`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityBins {
    pub capacity_index: usize,
    pub bins: Vec<Vec<usize>>,
}

/// Bins drawn from one capacity class of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBins {
    pub stage_index: usize,
    pub capacity_index: usize,
    pub bins: Vec<Vec<usize>>,
}

/// Packing state for one capacity list.
struct HeteroPacker<'a, L> {
    capacities: &'a [L],
    weights: Vec<f64>,
    largest: L,
    max_groups: Option<usize>,
    groups: usize,
    /// Per capacity class: the class's bins in group order.
    bins: Vec<Vec<Bin<L>>>,
    trackers: Vec<CapacityTracker<L>>,
}

impl<'a, L: Length> HeteroPacker<'a, L> {
    fn new(capacities: &'a [L], weights: &[f64], max_groups: Option<usize>) -> Self {
        let weights = if weights.is_empty() {
            vec![1.0; capacities.len()]
        } else {
            weights.to_vec()
        };
        Self {
            capacities,
            weights,
            largest: largest_capacity(capacities),
            max_groups,
            groups: 0,
            bins: vec![Vec::new(); capacities.len()],
            trackers: vec![CapacityTracker::new(); capacities.len()],
        }
    }

    /// Best (class, slot) for an item among the open bins.
    fn select(&self, length: L) -> Option<(usize, usize)> {
        let mut best: Option<(f64, usize, usize)> = None;
        for (class, tracker) in self.trackers.iter().enumerate() {
            let Some(slot) = tracker.best_fit(length) else {
                continue;
            };
            let leftover = (tracker.remaining(slot) - length).as_f64();
            let score = leftover / self.weights[class];
            let better = match best {
                None => true,
                Some((best_score, _, _)) => score.total_cmp(&best_score) == Ordering::Less,
            };
            if better {
                best = Some((score, class, slot));
            }
        }
        best.map(|(_, class, slot)| (class, slot))
    }

    fn can_open(&self) -> bool {
        self.max_groups.is_none_or(|max| self.groups < max)
    }

    fn open_group(&mut self) {
        for (class, &capacity) in self.capacities.iter().enumerate() {
            self.bins[class].push(Bin::new(capacity));
            self.trackers[class].open(capacity);
        }
        self.groups += 1;
    }

    /// Place an item, opening a group if allowed. `Ok(false)` if it cannot
    /// be placed in this packer at all.
    fn place(&mut self, index: usize, length: L) -> PackResult<bool> {
        let mut target = self.select(length);
        if target.is_none()
            && self.can_open()
            && length.cmp_len(&self.largest) != Ordering::Greater
        {
            self.open_group();
            target = self.select(length);
        }
        let Some((class, slot)) = target else {
            return Ok(false);
        };
        let bin = &mut self.bins[class][slot];
        bin.push(index, length)?;
        self.trackers[class].update(slot, bin.remaining());
        Ok(true)
    }

    fn into_class_bins(self) -> Vec<Vec<Vec<usize>>> {
        self.bins.into_iter().map(into_member_lists).collect()
    }
}

fn largest_capacity<L: Length>(capacities: &[L]) -> L {
    capacities.iter().copied().fold(L::ZERO, max_len)
}

fn validate_capacity_list<L: Length>(capacities: &[L], what: &str) -> PackResult<()> {
    if capacities.is_empty() {
        return Err(PackError::config(format!("{what} must list at least one capacity")));
    }
    capacities.iter().try_for_each(|&c| validate_capacity(c))
}

fn validate_weights(weights: &[f64], classes: usize, what: &str) -> PackResult<()> {
    if weights.is_empty() {
        return Ok(());
    }
    if weights.len() != classes {
        return Err(PackError::config(format!(
            "{what} has {} weights for {classes} capacities",
            weights.len()
        )));
    }
    if let Some(w) = weights.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
        return Err(PackError::config(format!(
            "weights must be positive and finite, got {w}"
        )));
    }
    Ok(())
}

/// Check items for shape and against `item_max_length` and the largest
/// capacity on offer.
fn validate_hetero_items<L: Length>(
    lengths: &[L],
    largest: L,
    item_max_length: Option<L>,
) -> PackResult<()> {
    crate::items::validate_items(lengths, largest, item_max_length).map(|_| ())
}

/// Optimized Heterogeneous Grouped Best Fit Decreasing.
///
/// Returns one entry per capacity index, in list order. Every entry holds
/// one bin per opened group, so empty bins are kept to preserve alignment.
pub fn ohgbfd<L: Length>(
    lengths: &[L],
    capacities: &[L],
    item_max_length: Option<L>,
    weights: &[f64],
) -> PackResult<Vec<CapacityBins>> {
    validate_capacity_list(capacities, "capacities")?;
    validate_weights(weights, capacities.len(), "capacities")?;
    if lengths.is_empty() {
        return Ok(Vec::new());
    }
    validate_hetero_items(lengths, largest_capacity(capacities), item_max_length)?;

    let mut packer = HeteroPacker::new(capacities, weights, None);
    for index in decreasing_order(lengths) {
        if !packer.place(index, lengths[index])? {
            return Err(PackError::invariant(format!(
                "item {index} not placed although groups are unbounded"
            )));
        }
    }

    let groups = packer.groups;
    let result: Vec<CapacityBins> = packer
        .into_class_bins()
        .into_iter()
        .enumerate()
        .map(|(capacity_index, bins)| CapacityBins { capacity_index, bins })
        .collect();

    debug!(items = lengths.len(), classes = capacities.len(), groups, "ohgbfd packed");
    Ok(result)
}

/// Optimized Sequential Heterogeneous Grouped Best Fit Decreasing.
///
/// Stage `s` offers one bin per capacity in `stages[s]`. Items are tried
/// against each stage in decreasing order; whatever a stage cannot take
/// moves on to the next. Items left over after the last stage fail the call
/// with [`PackError::Unplaceable`]. `weights` is empty or holds one weight
/// list per stage.
pub fn oshgbfd<L: Length>(
    lengths: &[L],
    stages: &[Vec<L>],
    item_max_length: Option<L>,
    weights: &[Vec<f64>],
) -> PackResult<Vec<StageBins>> {
    if stages.is_empty() {
        return Err(PackError::config("at least one stage is required"));
    }
    for (stage_index, capacities) in stages.iter().enumerate() {
        validate_capacity_list(capacities, &format!("stage {stage_index}"))?;
    }
    if !weights.is_empty() {
        if weights.len() != stages.len() {
            return Err(PackError::config(format!(
                "{} weight lists given for {} stages",
                weights.len(),
                stages.len()
            )));
        }
        for (stage_index, (w, capacities)) in weights.iter().zip(stages).enumerate() {
            validate_weights(w, capacities.len(), &format!("stage {stage_index}"))?;
        }
    }
    if lengths.is_empty() {
        return Ok(Vec::new());
    }
    let largest = stages
        .iter()
        .map(|c| largest_capacity(c))
        .fold(L::ZERO, max_len);
    validate_hetero_items(lengths, largest, item_max_length)?;

    let mut pending = decreasing_order(lengths);
    let mut result = Vec::new();
    for (stage_index, capacities) in stages.iter().enumerate() {
        if pending.is_empty() {
            break;
        }
        let stage_weights = weights.get(stage_index).map_or(&[][..], Vec::as_slice);
        let mut packer = HeteroPacker::new(capacities, stage_weights, Some(1));

        let mut leftover = Vec::new();
        for index in pending {
            if !packer.place(index, lengths[index])? {
                leftover.push(index);
            }
        }
        debug!(
            stage = stage_index,
            placed_groups = packer.groups,
            leftover = leftover.len(),
            "oshgbfd stage packed"
        );
        pending = leftover;

        for (capacity_index, bins) in packer.into_class_bins().into_iter().enumerate() {
            result.push(StageBins {
                stage_index,
                capacity_index,
                bins,
            });
        }
    }

    if let Some(&first_index) = pending.first() {
        return Err(PackError::Unplaceable {
            count: pending.len(),
            first_index,
        });
    }
    Ok(result)
}

//! Grouped Best Fit Decreasing: packs `bins_per_group` bins at a time.
//!
//! Downstream cost of a bin grows with the square of its item lengths
//! (attention over each packed document), and the bins of a group run side
//! by side. A group is only as fast as its slowest bin, so besides keeping
//! bins full these packers keep the per-bin sum of squared lengths even
//! across the bins of a group.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bin::{Bin, into_member_lists};
use crate::error::{PackError, PackResult};
use crate::items::{decreasing_order, decreasing_order_of, validate_capacity, validate_items};
use crate::length::{Length, max_len};
use crate::optimized::best_fit_bins;
use crate::parallel::{CodeOrName, MergePolicy, ParallelConfig, fan_out, repack_bins};
use crate::tracker::CapacityTracker;
use crate::verify::square_sum_spread;

/// How items are assigned to the bins of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "CodeOrName")]
pub enum GroupStrategy {
    /// Per item: best-fit a group, then the lightest bin in it (code 0).
    #[default]
    Greedy,
    /// Pack bins first, then cut windows of similar weight (code 1).
    Windowed,
}

impl TryFrom<CodeOrName> for GroupStrategy {
    type Error = PackError;

    fn try_from(value: CodeOrName) -> PackResult<Self> {
        match value {
            CodeOrName::Code(code) => Self::try_from(code),
            CodeOrName::Name(name) => match name.as_str() {
                "greedy" => Ok(Self::Greedy),
                "windowed" => Ok(Self::Windowed),
                other => Err(PackError::config(format!(
                    "group_strategy must be greedy or windowed, got '{other}'"
                ))),
            },
        }
    }
}

impl TryFrom<u8> for GroupStrategy {
    type Error = PackError;

    fn try_from(code: u8) -> PackResult<Self> {
        match code {
            0 => Ok(Self::Greedy),
            1 => Ok(Self::Windowed),
            other => Err(PackError::config(format!(
                "group strategy must be 0 or 1, got {other}"
            ))),
        }
    }
}

/// A fixed-size set of bins filled together.
#[derive(Debug, Clone)]
struct Group<L> {
    bins: Vec<Bin<L>>,
}

impl<L: Length> Group<L> {
    fn new(bins_per_group: usize, capacity: L) -> Self {
        Self {
            bins: (0..bins_per_group).map(|_| Bin::new(capacity)).collect(),
        }
    }

    fn max_remaining(&self) -> L {
        self.bins
            .iter()
            .map(Bin::remaining)
            .fold(L::ZERO, max_len)
    }

    fn is_complete(&self) -> bool {
        self.bins.iter().all(|b| !b.is_empty())
    }

    /// Put the item into the bin with the lowest sum of squares that fits.
    fn place(&mut self, index: usize, length: L) -> PackResult<()> {
        let target = self
            .bins
            .iter()
            .enumerate()
            .filter(|(_, bin)| bin.fits(length))
            .min_by(|(a, x), (b, y)| {
                x.sum_squares()
                    .total_cmp(&y.sum_squares())
                    .then(a.cmp(b))
            })
            .map(|(slot, _)| slot);

        match target {
            Some(slot) => self.bins[slot].push(index, length),
            None => Err(PackError::invariant(format!(
                "group selected for item {index} has no bin with room"
            ))),
        }
    }

    /// Redistribute this group's items over fresh bins, each item in
    /// decreasing order going to the lightest bin with room. `None` if some
    /// item finds no room.
    fn rebalanced(&self, lengths: &[L], capacity: L) -> PackResult<Option<Self>> {
        let members: Vec<usize> = self
            .bins
            .iter()
            .flat_map(|bin| bin.members().iter().copied())
            .collect();
        let mut group = Self::new(self.bins.len(), capacity);
        for index in decreasing_order_of(lengths, &members) {
            let length = lengths[index];
            if !group.bins.iter().any(|bin| bin.fits(length)) {
                return Ok(None);
            }
            group.place(index, length)?;
        }
        Ok(Some(group))
    }

    fn member_lists(&self) -> Vec<Vec<usize>> {
        self.bins.iter().map(|bin| bin.members().to_vec()).collect()
    }

    fn into_member_lists(self) -> Vec<Vec<usize>> {
        into_member_lists(self.bins)
    }
}

fn spread<L: Length>(lengths: &[L], groups: &[Group<L>]) -> f64 {
    let lists: Vec<Vec<Vec<usize>>> = groups.iter().map(Group::member_lists).collect();
    square_sum_spread(lengths, &lists)
}

fn validate_group_size(bins_per_group: usize) -> PackResult<()> {
    if bins_per_group == 0 {
        return Err(PackError::config("bins_per_group must be at least 1"));
    }
    Ok(())
}

/// Greedy grouped packing over the items in `order`.
///
/// Every group stays open. Groups are keyed by their largest remaining bin
/// capacity and the tightest group that can take the item wins.
fn greedy_groups<L: Length>(
    lengths: &[L],
    order: &[usize],
    capacity: L,
    bins_per_group: usize,
) -> PackResult<Vec<Group<L>>> {
    let mut groups: Vec<Group<L>> = Vec::new();
    let mut tracker = CapacityTracker::new();

    for &index in order {
        let length = lengths[index];
        let slot = match tracker.best_fit(length) {
            Some(slot) => slot,
            None => {
                groups.push(Group::new(bins_per_group, capacity));
                tracker.open(capacity)
            }
        };
        groups[slot].place(index, length)?;
        tracker.update(slot, groups[slot].max_remaining());
    }
    Ok(groups)
}

/// Cut bins into windows of `bins_per_group`, heaviest first.
///
/// Bins are ordered by sum of squares (descending, creation order on ties)
/// so that each window holds bins of similar quadratic load. The last
/// window is padded with empty bins.
fn windowed_groups<L: Length>(
    mut bins: Vec<Bin<L>>,
    capacity: L,
    bins_per_group: usize,
) -> Vec<Group<L>> {
    // Stable sort keeps creation order among equal weights.
    bins.sort_by(|a, b| b.sum_squares().total_cmp(&a.sum_squares()));

    let mut groups = Vec::with_capacity(bins.len().div_ceil(bins_per_group));
    let mut iter = bins.into_iter().peekable();
    while iter.peek().is_some() {
        let mut window: Vec<Bin<L>> = iter.by_ref().take(bins_per_group).collect();
        window.resize_with(bins_per_group, || Bin::new(capacity));
        groups.push(Group { bins: window });
    }
    groups
}

fn pack_groups<L: Length>(
    lengths: &[L],
    order: &[usize],
    capacity: L,
    bins_per_group: usize,
    strategy: GroupStrategy,
) -> PackResult<Vec<Group<L>>> {
    match strategy {
        GroupStrategy::Greedy => greedy_groups(lengths, order, capacity, bins_per_group),
        GroupStrategy::Windowed => {
            let bins = best_fit_bins(lengths, order, capacity)?;
            let windowed = windowed_groups(bins, capacity, bins_per_group)
                .into_iter()
                .map(|group| {
                    group
                        .rebalanced(lengths, capacity)
                        .map(|rebalanced| rebalanced.unwrap_or(group))
                })
                .collect::<PackResult<Vec<_>>>()?;

            // Rebalancing only moves items inside a window, so the greedy
            // layout can still be more even. Keep whichever spreads less.
            let greedy = greedy_groups(lengths, order, capacity, bins_per_group)?;
            let (windowed_spread, greedy_spread) =
                (spread(lengths, &windowed), spread(lengths, &greedy));
            debug!(windowed_spread, greedy_spread, "windowed layout scored");
            Ok(if windowed_spread <= greedy_spread {
                windowed
            } else {
                greedy
            })
        }
    }
}

/// Optimized Grouped Best Fit Decreasing.
///
/// Returns groups of exactly `bins_per_group` bins each; trailing bins of
/// the last group may be empty.
pub fn ogbfd<L: Length>(
    lengths: &[L],
    capacity: L,
    bins_per_group: usize,
    item_max_length: Option<L>,
    strategy: GroupStrategy,
) -> PackResult<Vec<Vec<Vec<usize>>>> {
    validate_capacity(capacity)?;
    validate_group_size(bins_per_group)?;
    if lengths.is_empty() {
        return Ok(Vec::new());
    }
    validate_items(lengths, capacity, item_max_length)?;

    let order = decreasing_order(lengths);
    let groups = pack_groups(lengths, &order, capacity, bins_per_group, strategy)?;

    debug!(
        items = lengths.len(),
        groups = groups.len(),
        bins_per_group,
        ?strategy,
        "ogbfd packed"
    );
    Ok(groups.into_iter().map(Group::into_member_lists).collect())
}

/// Parallel OGBFD. Chunks are grouped independently and merged at group
/// granularity.
///
/// With [`MergePolicy::Repack`], complete groups keep their chunk order and
/// the bins of incomplete groups are pooled, best-fit into each other, and
/// regrouped at the end. With [`MergePolicy::Concatenate`] chunk groups are
/// chained as they are.
pub fn ogbfdp<L: Length>(
    lengths: &[L],
    capacity: L,
    bins_per_group: usize,
    item_max_length: Option<L>,
    strategy: GroupStrategy,
    parallel: &ParallelConfig,
) -> PackResult<Vec<Vec<Vec<usize>>>> {
    validate_capacity(capacity)?;
    validate_group_size(bins_per_group)?;
    parallel.validate()?;
    if lengths.is_empty() {
        return Ok(Vec::new());
    }
    validate_items(lengths, capacity, item_max_length)?;

    let ranges = parallel.chunk_ranges(lengths.len());
    let chunks = ranges.len();
    let chunk_groups = fan_out(ranges, |range| {
        let indices: Vec<usize> = range.collect();
        let order = decreasing_order_of(lengths, &indices);
        pack_groups(lengths, &order, capacity, bins_per_group, strategy)
    })?;

    let groups = match parallel.merge {
        MergePolicy::Concatenate => chunk_groups.into_iter().flatten().collect(),
        MergePolicy::Repack => {
            let mut complete: Vec<Group<L>> = Vec::new();
            let mut loose: Vec<Bin<L>> = Vec::new();
            for group in chunk_groups.into_iter().flatten() {
                if group.is_complete() {
                    complete.push(group);
                } else {
                    loose.extend(group.bins.into_iter().filter(|b| !b.is_empty()));
                }
            }
            let merged = repack_bins(loose, capacity)?;
            complete.extend(windowed_groups(merged, capacity, bins_per_group));
            complete
        }
    };

    debug!(
        items = lengths.len(),
        chunks,
        groups = groups.len(),
        merge = ?parallel.merge,
        "ogbfdp packed"
    );
    Ok(groups.into_iter().map(Group::into_member_lists).collect())
}

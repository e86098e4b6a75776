//! Optimized Best Fit Decreasing and its parallel form.
//!
//! [`obfd`] places items in exactly the order and bins that the naive
//! [`crate::single::bfd`] would, but selects each bin through a
//! [`CapacityTracker`] in O(log k) instead of scanning all k open bins.

use tracing::debug;

use crate::bin::{Bin, into_member_lists};
use crate::error::PackResult;
use crate::items::{decreasing_order, decreasing_order_of, validate_capacity, validate_items};
use crate::length::Length;
use crate::parallel::{MergePolicy, ParallelConfig, fan_out, repack_bins};
use crate::tracker::CapacityTracker;

/// Best-fit the items in `order` into fresh bins of `capacity`.
///
/// Items must already be validated against `capacity`.
pub(crate) fn best_fit_bins<L: Length>(
    lengths: &[L],
    order: &[usize],
    capacity: L,
) -> PackResult<Vec<Bin<L>>> {
    let mut bins: Vec<Bin<L>> = Vec::new();
    let mut tracker = CapacityTracker::with_capacity(order.len() / 2 + 1);

    for &index in order {
        let length = lengths[index];
        let slot = match tracker.best_fit(length) {
            Some(slot) => slot,
            None => {
                bins.push(Bin::new(capacity));
                tracker.open(capacity)
            }
        };
        bins[slot].push(index, length)?;
        tracker.update(slot, bins[slot].remaining());
    }
    Ok(bins)
}

/// Optimized Best Fit Decreasing.
///
/// `item_max_length` bounds the largest admissible item; `None` derives it
/// from the input. Every item is checked before the first placement.
pub fn obfd<L: Length>(
    lengths: &[L],
    capacity: L,
    item_max_length: Option<L>,
) -> PackResult<Vec<Vec<usize>>> {
    validate_capacity(capacity)?;
    if lengths.is_empty() {
        return Ok(Vec::new());
    }
    let item_max = validate_items(lengths, capacity, item_max_length)?;

    let bins = best_fit_bins(lengths, &decreasing_order(lengths), capacity)?;
    debug!(items = lengths.len(), bins = bins.len(), %item_max, "obfd packed");
    Ok(into_member_lists(bins))
}

/// Parallel OBFD.
///
/// Each contiguous chunk of the input is sorted and packed independently,
/// then the chunk bins are merged per `parallel.merge`. The result depends
/// only on the input and the chunk layout, never on which worker finishes
/// first.
pub fn obfdp<L: Length>(
    lengths: &[L],
    capacity: L,
    item_max_length: Option<L>,
    parallel: &ParallelConfig,
) -> PackResult<Vec<Vec<usize>>> {
    validate_capacity(capacity)?;
    parallel.validate()?;
    if lengths.is_empty() {
        return Ok(Vec::new());
    }
    validate_items(lengths, capacity, item_max_length)?;

    let ranges = parallel.chunk_ranges(lengths.len());
    let chunks = ranges.len();
    let chunk_bins = fan_out(ranges, |range| {
        let indices: Vec<usize> = range.collect();
        best_fit_bins(lengths, &decreasing_order_of(lengths, &indices), capacity)
    })?;

    let flat: Vec<Bin<L>> = chunk_bins.into_iter().flatten().collect();
    let before = flat.len();
    let bins = match parallel.merge {
        MergePolicy::Repack => repack_bins(flat, capacity)?,
        MergePolicy::Concatenate => flat,
    };

    debug!(
        items = lengths.len(),
        chunks,
        chunk_bins = before,
        bins = bins.len(),
        merge = ?parallel.merge,
        "obfdp packed"
    );
    Ok(into_member_lists(bins))
}

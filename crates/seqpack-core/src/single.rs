//! Baseline single-capacity packers: Next Fit, First Fit Decreasing,
//! Best Fit Decreasing.
//!
//! All three return bins as ordered lists of original item indices, bins in
//! creation order. Items longer than the capacity fail the call before any
//! bin is opened.

use std::cmp::Ordering;
use std::mem;

use tracing::debug;

use crate::bin::{Bin, into_member_lists};
use crate::error::PackResult;
use crate::items::{decreasing_order, validate_capacity, validate_items};
use crate::length::Length;
use crate::tracker::FirstFitTracker;

/// Next Fit: one open bin, filled in arrival order.
pub fn nf<L: Length>(lengths: &[L], capacity: L) -> PackResult<Vec<Vec<usize>>> {
    validate_capacity(capacity)?;
    if lengths.is_empty() {
        return Ok(Vec::new());
    }
    validate_items(lengths, capacity, None)?;

    let mut bins = Vec::new();
    let mut current = Bin::new(capacity);
    for (index, &length) in lengths.iter().enumerate() {
        if !current.fits(length) {
            bins.push(mem::replace(&mut current, Bin::new(capacity)));
        }
        current.push(index, length)?;
    }
    bins.push(current);

    debug!(items = lengths.len(), bins = bins.len(), "nf packed");
    Ok(into_member_lists(bins))
}

/// First Fit Decreasing: each item goes to the earliest bin with room.
pub fn ffd<L: Length>(lengths: &[L], capacity: L) -> PackResult<Vec<Vec<usize>>> {
    validate_capacity(capacity)?;
    if lengths.is_empty() {
        return Ok(Vec::new());
    }
    validate_items(lengths, capacity, None)?;

    let mut bins: Vec<Bin<L>> = Vec::new();
    let mut tracker = FirstFitTracker::with_capacity(lengths.len());
    for index in decreasing_order(lengths) {
        let length = lengths[index];
        let slot = match tracker.first_fit(length) {
            Some(slot) => slot,
            None => {
                bins.push(Bin::new(capacity));
                tracker.open(capacity)
            }
        };
        bins[slot].push(index, length)?;
        tracker.update(slot, bins[slot].remaining());
    }

    debug!(items = lengths.len(), bins = bins.len(), "ffd packed");
    Ok(into_member_lists(bins))
}

/// Best Fit Decreasing, naive form: scans every open bin per item.
///
/// This is the O(n·k) reference that [`crate::optimized::obfd`] must match
/// exactly.
pub fn bfd<L: Length>(lengths: &[L], capacity: L) -> PackResult<Vec<Vec<usize>>> {
    validate_capacity(capacity)?;
    if lengths.is_empty() {
        return Ok(Vec::new());
    }
    validate_items(lengths, capacity, None)?;

    let mut bins: Vec<Bin<L>> = Vec::new();
    for index in decreasing_order(lengths) {
        let length = lengths[index];
        let mut best: Option<usize> = None;
        for (slot, bin) in bins.iter().enumerate() {
            if !bin.fits(length) {
                continue;
            }
            // Strictly tighter only, so the earliest bin wins ties.
            let tighter = match best {
                None => true,
                Some(b) => bin.remaining().cmp_len(&bins[b].remaining()) == Ordering::Less,
            };
            if tighter {
                best = Some(slot);
            }
        }
        match best {
            Some(slot) => bins[slot].push(index, length)?,
            None => {
                let mut bin = Bin::new(capacity);
                bin.push(index, length)?;
                bins.push(bin);
            }
        }
    }

    debug!(items = lengths.len(), bins = bins.len(), "bfd packed");
    Ok(into_member_lists(bins))
}

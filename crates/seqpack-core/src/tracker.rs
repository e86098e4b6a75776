//! Capacity trackers for sub-linear bin selection.
//!
//! Both trackers index "slots" (bins, or groups of bins) by their remaining
//! capacity. Slot ids are handed out in creation order, which is also the
//! tie-break order: among equally good candidates the earliest slot wins.
//!
//! - [`CapacityTracker`] answers best-fit queries (smallest remaining
//!   capacity that still fits) from an ordered set keyed by
//!   `(remaining, slot)`.
//! - [`FirstFitTracker`] answers first-fit queries (earliest slot that
//!   fits) from a max segment tree over slots.

use std::collections::BTreeSet;

use crate::length::{Length, Ordered};

/// Best-fit index over slots keyed by remaining capacity.
#[derive(Debug, Clone)]
pub struct CapacityTracker<L> {
    remaining: Vec<L>,
    index: BTreeSet<(Ordered<L>, usize)>,
}

impl<L: Length> CapacityTracker<L> {
    pub fn new() -> Self {
        Self {
            remaining: Vec::new(),
            index: BTreeSet::new(),
        }
    }

    pub fn with_capacity(slots: usize) -> Self {
        Self {
            remaining: Vec::with_capacity(slots),
            index: BTreeSet::new(),
        }
    }

    /// Register a new slot and return its id.
    pub fn open(&mut self, remaining: L) -> usize {
        let slot = self.remaining.len();
        self.remaining.push(remaining);
        if remaining.is_positive() {
            self.index.insert((Ordered(remaining), slot));
        }
        slot
    }

    /// Slot with the smallest remaining capacity `>= length`; earliest on ties.
    pub fn best_fit(&self, length: L) -> Option<usize> {
        self.index
            .range((Ordered(length), 0)..)
            .next()
            .map(|&(_, slot)| slot)
    }

    /// Replace a slot's remaining capacity. Exhausted slots leave the index.
    pub fn update(&mut self, slot: usize, remaining: L) {
        let old = self.remaining[slot];
        self.index.remove(&(Ordered(old), slot));
        self.remaining[slot] = remaining;
        if remaining.is_positive() {
            self.index.insert((Ordered(remaining), slot));
        }
    }

    /// Permanently drop a slot from selection.
    pub fn retire(&mut self, slot: usize) {
        let old = self.remaining[slot];
        self.index.remove(&(Ordered(old), slot));
    }

    pub fn remaining(&self, slot: usize) -> L {
        self.remaining[slot]
    }

    /// Number of slots ever opened.
    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}

impl<L: Length> Default for CapacityTracker<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// First-fit index: a max segment tree over slots in creation order.
#[derive(Debug, Clone)]
pub struct FirstFitTracker<L> {
    /// Leaf count, always a power of two.
    width: usize,
    slots: usize,
    tree: Vec<L>,
}

impl<L: Length> FirstFitTracker<L> {
    pub fn with_capacity(slots: usize) -> Self {
        let width = slots.max(1).next_power_of_two();
        Self {
            width,
            slots: 0,
            tree: vec![L::ZERO; 2 * width],
        }
    }

    /// Register a new slot and return its id.
    pub fn open(&mut self, remaining: L) -> usize {
        if self.slots == self.width {
            self.grow();
        }
        let slot = self.slots;
        self.slots += 1;
        self.update(slot, remaining);
        slot
    }

    /// Earliest slot whose remaining capacity is `>= length`.
    pub fn first_fit(&self, length: L) -> Option<usize> {
        if self.slots == 0 || self.tree[1] < length {
            return None;
        }
        let mut node = 1;
        while node < self.width {
            node = if self.tree[2 * node] >= length {
                2 * node
            } else {
                2 * node + 1
            };
        }
        Some(node - self.width)
    }

    pub fn update(&mut self, slot: usize, remaining: L) {
        let mut node = slot + self.width;
        self.tree[node] = remaining;
        while node > 1 {
            node /= 2;
            let (left, right) = (self.tree[2 * node], self.tree[2 * node + 1]);
            self.tree[node] = if left >= right { left } else { right };
        }
    }

    pub fn remaining(&self, slot: usize) -> L {
        self.tree[slot + self.width]
    }

    pub fn len(&self) -> usize {
        self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots == 0
    }

    fn grow(&mut self) {
        let leaves: Vec<L> = self.tree[self.width..self.width + self.slots].to_vec();
        let width = self.width * 2;
        let mut tree = vec![L::ZERO; 2 * width];
        tree[width..width + leaves.len()].copy_from_slice(&leaves);
        for node in (1..width).rev() {
            let (left, right) = (tree[2 * node], tree[2 * node + 1]);
            tree[node] = if left >= right { left } else { right };
        }
        self.width = width;
        self.tree = tree;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_fit_picks_tightest_slot() {
        let mut t = CapacityTracker::new();
        let a = t.open(10u32);
        let b = t.open(4);
        let c = t.open(6);
        assert_eq!(t.best_fit(5), Some(c));
        assert_eq!(t.best_fit(4), Some(b));
        assert_eq!(t.best_fit(7), Some(a));
        assert_eq!(t.best_fit(11), None);
    }

    #[test]
    fn best_fit_ties_prefer_earliest_slot() {
        let mut t = CapacityTracker::new();
        t.open(5u32);
        t.open(5);
        t.open(5);
        assert_eq!(t.best_fit(3), Some(0));
        t.update(0, 2);
        assert_eq!(t.best_fit(3), Some(1));
    }

    #[test]
    fn exhausted_slots_leave_the_index() {
        let mut t = CapacityTracker::new();
        let a = t.open(4u32);
        t.update(a, 0);
        assert_eq!(t.best_fit(1), None);
        assert_eq!(t.remaining(a), 0);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn retired_slot_is_never_selected() {
        let mut t = CapacityTracker::new();
        let a = t.open(8u32);
        let b = t.open(9);
        t.retire(a);
        assert_eq!(t.best_fit(1), Some(b));
    }

    #[test]
    fn best_fit_handles_floats() {
        let mut t = CapacityTracker::new();
        t.open(1.5f64);
        t.open(2.5);
        assert_eq!(t.best_fit(2.0), Some(1));
        assert_eq!(t.best_fit(1.5), Some(0));
    }

    #[test]
    fn first_fit_picks_earliest_slot() {
        let mut t = FirstFitTracker::with_capacity(4);
        t.open(3u32);
        t.open(9);
        t.open(9);
        assert_eq!(t.first_fit(2), Some(0));
        assert_eq!(t.first_fit(5), Some(1));
        t.update(1, 1);
        assert_eq!(t.first_fit(5), Some(2));
        assert_eq!(t.first_fit(10), None);
    }

    #[test]
    fn first_fit_grows_past_initial_width() {
        let mut t = FirstFitTracker::with_capacity(1);
        for cap in [1u32, 2, 3, 4, 5] {
            t.open(cap);
        }
        assert_eq!(t.len(), 5);
        assert_eq!(t.first_fit(5), Some(4));
        assert_eq!(t.remaining(2), 3);
    }

    #[test]
    fn empty_first_fit_tracker_finds_nothing() {
        let t: FirstFitTracker<u32> = FirstFitTracker::with_capacity(8);
        assert!(t.is_empty());
        assert_eq!(t.first_fit(1), None);
    }
}

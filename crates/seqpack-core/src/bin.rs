//! A single capacity-bounded bin.

use std::cmp::Ordering;

use crate::error::{PackError, PackResult};
use crate::length::Length;

/// A bin: fixed capacity, ordered member indices, and the running total.
///
/// `used` always equals the sum of member lengths and never exceeds
/// `capacity`. The sum of squared member lengths is tracked alongside for
/// the grouped packers' balance metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Bin<L> {
    capacity: L,
    used: L,
    sum_squares: f64,
    members: Vec<usize>,
}

impl<L: Length> Bin<L> {
    pub fn new(capacity: L) -> Self {
        Self {
            capacity,
            used: L::ZERO,
            sum_squares: 0.0,
            members: Vec::new(),
        }
    }

    pub fn capacity(&self) -> L {
        self.capacity
    }

    pub fn used(&self) -> L {
        self.used
    }

    pub fn remaining(&self) -> L {
        self.capacity - self.used
    }

    pub fn sum_squares(&self) -> f64 {
        self.sum_squares
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn fits(&self, length: L) -> bool {
        length.cmp_len(&self.remaining()) != Ordering::Greater
    }

    /// Append an item. Fails only if the caller picked a bin without room.
    pub fn push(&mut self, index: usize, length: L) -> PackResult<()> {
        if !self.fits(length) {
            return Err(PackError::invariant(format!(
                "item {index} of length {length} placed into bin with {} remaining",
                self.remaining()
            )));
        }
        self.used += length;
        let l = length.as_f64();
        self.sum_squares += l * l;
        self.members.push(index);
        Ok(())
    }

    /// Move every member of `other` into this bin, keeping their order.
    pub fn absorb(&mut self, other: Bin<L>) -> PackResult<()> {
        if !self.fits(other.used) {
            return Err(PackError::invariant(format!(
                "bin of {} merged into bin with {} remaining",
                other.used,
                self.remaining()
            )));
        }
        self.used += other.used;
        self.sum_squares += other.sum_squares;
        self.members.extend(other.members);
        Ok(())
    }

    pub fn into_members(self) -> Vec<usize> {
        self.members
    }
}

/// Strip bins down to their member lists, preserving order.
pub(crate) fn into_member_lists<L: Length>(bins: Vec<Bin<L>>) -> Vec<Vec<usize>> {
    bins.into_iter().map(Bin::into_members).collect()
}

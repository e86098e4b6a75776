//! Numeric abstraction over item lengths and bin capacities.
//!
//! Token counts are integers, but every packer also accepts floating-point
//! sizes. [`Length`] gives both a total order so that trackers can key on
//! remaining capacity regardless of the concrete type.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A non-negative quantity that can be summed, compared, and subtracted.
pub trait Length:
    Copy
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + AddAssign
    + SubAssign
    + Default
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + 'static
{
    const ZERO: Self;

    /// Total ordering. Floats order by `total_cmp`.
    fn cmp_len(&self, other: &Self) -> Ordering;

    /// `true` for finite values strictly greater than zero.
    fn is_positive(self) -> bool;

    fn as_f64(self) -> f64;
}

macro_rules! impl_integer_length {
    ($($t:ty),*) => {$(
        impl Length for $t {
            const ZERO: Self = 0;

            #[inline]
            fn cmp_len(&self, other: &Self) -> Ordering {
                self.cmp(other)
            }

            #[inline]
            fn is_positive(self) -> bool {
                self > 0
            }

            #[inline]
            fn as_f64(self) -> f64 {
                self as f64
            }
        }
    )*};
}

macro_rules! impl_float_length {
    ($($t:ty),*) => {$(
        impl Length for $t {
            const ZERO: Self = 0.0;

            #[inline]
            fn cmp_len(&self, other: &Self) -> Ordering {
                self.total_cmp(other)
            }

            #[inline]
            fn is_positive(self) -> bool {
                self.is_finite() && self > 0.0
            }

            #[inline]
            fn as_f64(self) -> f64 {
                f64::from(self)
            }
        }
    )*};
}

impl_integer_length!(u32, u64, usize);
impl_float_length!(f32, f64);

/// Wrapper giving any [`Length`] an `Ord` impl, for use as a tree key.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ordered<L>(pub L);

impl<L: Length> PartialEq for Ordered<L> {
    fn eq(&self, other: &Self) -> bool {
        self.0.cmp_len(&other.0) == Ordering::Equal
    }
}

impl<L: Length> Eq for Ordered<L> {}

impl<L: Length> PartialOrd for Ordered<L> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<L: Length> Ord for Ordered<L> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_len(&other.0)
    }
}

/// Largest of two lengths under the total order.
#[inline]
pub(crate) fn max_len<L: Length>(a: L, b: L) -> L {
    if b.cmp_len(&a) == Ordering::Greater { b } else { a }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_positive_above_zero() {
        assert!(1u32.is_positive());
        assert!(!0u64.is_positive());
    }

    #[test]
    fn floats_reject_nan_and_infinity() {
        assert!(2.5f64.is_positive());
        assert!(!f64::NAN.is_positive());
        assert!(!f64::INFINITY.is_positive());
        assert!(!(-1.0f32).is_positive());
    }

    #[test]
    fn ordered_wrapper_sorts_floats() {
        let mut keys = vec![Ordered(3.0f64), Ordered(1.5), Ordered(2.0)];
        keys.sort();
        let values: Vec<f64> = keys.into_iter().map(|k| k.0).collect();
        assert_eq!(values, vec![1.5, 2.0, 3.0]);
    }

    #[test]
    fn max_len_picks_larger() {
        assert_eq!(max_len(3u32, 7), 7);
        assert_eq!(max_len(4.0f64, 1.0), 4.0);
    }
}

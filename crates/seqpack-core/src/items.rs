//! Input validation and item ordering shared by every packer.

use std::cmp::Ordering;

use crate::error::{PackError, PackResult};
use crate::length::{Length, max_len};

/// Reject a capacity that is zero, negative, or not finite.
pub(crate) fn validate_capacity<L: Length>(capacity: L) -> PackResult<()> {
    if capacity.is_positive() {
        Ok(())
    } else {
        Err(PackError::InvalidCapacity {
            capacity: capacity.to_string(),
        })
    }
}

/// Validate every item against `capacity` and the optional item limit.
///
/// Returns the effective item max length: the given limit, or the largest
/// item when none was given. Runs before any packing so that a bad item
/// fails the call up front rather than mid-pass.
pub(crate) fn validate_items<L: Length>(
    lengths: &[L],
    capacity: L,
    item_max_length: Option<L>,
) -> PackResult<L> {
    if let Some(limit) = item_max_length {
        if !limit.is_positive() {
            return Err(PackError::config(format!(
                "item_max_length must be positive, got {limit}"
            )));
        }
    }

    let mut largest = L::ZERO;
    for (index, &length) in lengths.iter().enumerate() {
        if !length.is_positive() {
            return Err(PackError::InvalidLength {
                index,
                length: length.to_string(),
            });
        }
        if let Some(limit) = item_max_length {
            if length.cmp_len(&limit) == Ordering::Greater {
                return Err(PackError::ExceedsItemMax {
                    index,
                    length: length.to_string(),
                    limit: limit.to_string(),
                });
            }
        }
        if length.cmp_len(&capacity) == Ordering::Greater {
            return Err(PackError::ItemTooLarge {
                index,
                length: length.to_string(),
                capacity: capacity.to_string(),
            });
        }
        largest = max_len(largest, length);
    }

    Ok(item_max_length.unwrap_or(largest))
}

/// Item indices sorted by length descending, ties by index ascending.
pub(crate) fn decreasing_order<L: Length>(lengths: &[L]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..lengths.len()).collect();
    // Stable, so equal lengths keep ascending index order.
    order.sort_by(|&a, &b| lengths[b].cmp_len(&lengths[a]));
    order
}

/// Decreasing order restricted to `indices`, same tie-break.
pub(crate) fn decreasing_order_of<L: Length>(lengths: &[L], indices: &[usize]) -> Vec<usize> {
    let mut order = indices.to_vec();
    order.sort_by(|&a, &b| lengths[b].cmp_len(&lengths[a]).then(a.cmp(&b)));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn capacity_must_be_positive() {
        assert!(validate_capacity(40u32).is_ok());
        let err = validate_capacity(0u32).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(validate_capacity(f64::NAN).is_err());
    }

    #[test]
    fn derived_item_max_is_largest_item() {
        let max = validate_items(&[3u32, 9, 4], 10, None).unwrap();
        assert_eq!(max, 9);
    }

    #[test]
    fn explicit_item_max_is_enforced() {
        let err = validate_items(&[3u32, 9, 4], 10, Some(5)).unwrap_err();
        assert!(matches!(err, PackError::ExceedsItemMax { index: 1, .. }));
    }

    #[test]
    fn oversized_item_is_infeasible() {
        let err = validate_items(&[3u32, 11], 10, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Infeasible);
        assert!(matches!(err, PackError::ItemTooLarge { index: 1, .. }));
    }

    #[test]
    fn zero_length_is_rejected() {
        let err = validate_items(&[3u32, 0], 10, None).unwrap_err();
        assert!(matches!(err, PackError::InvalidLength { index: 1, .. }));
    }

    #[test]
    fn decreasing_order_breaks_ties_by_index() {
        let order = decreasing_order(&[10u32, 20, 10, 20, 5]);
        assert_eq!(order, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn decreasing_order_of_subset() {
        let lengths = [1u32, 8, 8, 3];
        assert_eq!(decreasing_order_of(&lengths, &[3, 2, 0, 1]), vec![1, 2, 3, 0]);
    }
}

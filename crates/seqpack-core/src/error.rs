//! Packing error types.

use thiserror::Error;

/// Errors that can occur during packing, grouping, or balancing.
///
/// Every error aborts the call; no partial result is ever returned
/// alongside one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackError {
    #[error("invalid capacity {capacity}: capacities must be positive and finite")]
    InvalidCapacity { capacity: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("item {index} has invalid length {length}: lengths must be positive and finite")]
    InvalidLength { index: usize, length: String },

    #[error("item {index} of length {length} exceeds item_max_length {limit}")]
    ExceedsItemMax {
        index: usize,
        length: String,
        limit: String,
    },

    #[error("item {index} of length {length} exceeds every available capacity (largest is {capacity})")]
    ItemTooLarge {
        index: usize,
        length: String,
        capacity: String,
    },

    #[error("{count} items could not be placed in any stage (first: item {first_index})")]
    Unplaceable { count: usize, first_index: usize },

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// Coarse classification of a [`PackError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed capacities, shapes, or parameters. Detected before any work.
    Configuration,
    /// The data cannot be packed under a well-formed configuration.
    Infeasible,
    /// A packer broke its own guarantees. Always a defect.
    Internal,
}

impl PackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCapacity { .. }
            | Self::Config(_)
            | Self::InvalidLength { .. }
            | Self::ExceedsItemMax { .. } => ErrorKind::Configuration,
            Self::ItemTooLarge { .. } | Self::Unplaceable { .. } => ErrorKind::Infeasible,
            Self::Invariant(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }
}

pub type PackResult<T> = Result<T, PackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            PackError::InvalidCapacity { capacity: "0".into() }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(PackError::config("bad").kind(), ErrorKind::Configuration);
        assert_eq!(
            PackError::ItemTooLarge {
                index: 3,
                length: "9".into(),
                capacity: "8".into(),
            }
            .kind(),
            ErrorKind::Infeasible
        );
        assert_eq!(
            PackError::Unplaceable { count: 2, first_index: 0 }.kind(),
            ErrorKind::Infeasible
        );
        assert_eq!(PackError::invariant("dup").kind(), ErrorKind::Internal);
    }

    #[test]
    fn messages_name_the_item() {
        let err = PackError::ItemTooLarge {
            index: 7,
            length: "50".into(),
            capacity: "40".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("item 7"));
        assert!(msg.contains("40"));
    }
}

//! Strategy names, capacity shapes, and the single `pack` entry point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PackConfig;
use crate::error::{PackError, PackResult};
use crate::grouped::{GroupStrategy, ogbfd, ogbfdp};
use crate::hetero::{CapacityBins, StageBins, ohgbfd, oshgbfd};
use crate::length::Length;
use crate::optimized::{obfd, obfdp};
use crate::parallel::ParallelConfig;
use crate::single::{bfd, ffd, nf};
use crate::verify;

/// Named packing strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackStrategy {
    Nf,
    Ffd,
    Bfd,
    Obfd,
    Obfdp,
    Ogbfd,
    Ogbfdp,
    Ohgbfd,
    Oshgbfd,
}

impl PackStrategy {
    pub const ALL: [PackStrategy; 9] = [
        Self::Nf,
        Self::Ffd,
        Self::Bfd,
        Self::Obfd,
        Self::Obfdp,
        Self::Ogbfd,
        Self::Ogbfdp,
        Self::Ohgbfd,
        Self::Oshgbfd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nf => "nf",
            Self::Ffd => "ffd",
            Self::Bfd => "bfd",
            Self::Obfd => "obfd",
            Self::Obfdp => "obfdp",
            Self::Ogbfd => "ogbfd",
            Self::Ogbfdp => "ogbfdp",
            Self::Ohgbfd => "ohgbfd",
            Self::Oshgbfd => "oshgbfd",
        }
    }

    /// Parallel counterpart, if the strategy has one.
    pub fn parallel(self) -> Self {
        match self {
            Self::Obfd => Self::Obfdp,
            Self::Ogbfd => Self::Ogbfdp,
            other => other,
        }
    }
}

impl fmt::Display for PackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackStrategy {
    type Err = PackError;

    fn from_str(s: &str) -> PackResult<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == lower)
            .ok_or_else(|| PackError::config(format!("unknown strategy '{s}'")))
    }
}

/// Legacy selector used when no strategy is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackVariant {
    /// Plain best fit (OBFD).
    Linear,
    /// Grouped best fit balancing squared lengths (OGBFD).
    Square,
}

/// Capacity argument in one of three shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapacitySpec<L> {
    /// One capacity for every bin.
    Uniform(L),
    /// One capacity per bin of a heterogeneous group.
    Heterogeneous(Vec<L>),
    /// One heterogeneous capacity list per stage.
    Staged(Vec<Vec<L>>),
}

/// Per-class weights for the heterogeneous packers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightSpec {
    Flat(Vec<f64>),
    Staged(Vec<Vec<f64>>),
}

/// A fully resolved packing job: one strategy with exactly the arguments
/// it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Algorithm<L> {
    Nf {
        capacity: L,
    },
    Ffd {
        capacity: L,
    },
    Bfd {
        capacity: L,
    },
    Obfd {
        capacity: L,
        item_max_length: Option<L>,
    },
    Obfdp {
        capacity: L,
        item_max_length: Option<L>,
        parallel: ParallelConfig,
    },
    Ogbfd {
        capacity: L,
        bins_per_group: usize,
        item_max_length: Option<L>,
        strategy: GroupStrategy,
    },
    Ogbfdp {
        capacity: L,
        bins_per_group: usize,
        item_max_length: Option<L>,
        strategy: GroupStrategy,
        parallel: ParallelConfig,
    },
    Ohgbfd {
        capacities: Vec<L>,
        item_max_length: Option<L>,
        weights: Vec<f64>,
    },
    Oshgbfd {
        stages: Vec<Vec<L>>,
        item_max_length: Option<L>,
        weights: Vec<Vec<f64>>,
    },
}

impl<L: Length> Algorithm<L> {
    pub fn strategy(&self) -> PackStrategy {
        match self {
            Self::Nf { .. } => PackStrategy::Nf,
            Self::Ffd { .. } => PackStrategy::Ffd,
            Self::Bfd { .. } => PackStrategy::Bfd,
            Self::Obfd { .. } => PackStrategy::Obfd,
            Self::Obfdp { .. } => PackStrategy::Obfdp,
            Self::Ogbfd { .. } => PackStrategy::Ogbfd,
            Self::Ogbfdp { .. } => PackStrategy::Ogbfdp,
            Self::Ohgbfd { .. } => PackStrategy::Ohgbfd,
            Self::Oshgbfd { .. } => PackStrategy::Oshgbfd,
        }
    }

    /// The capacity argument this job packs against.
    pub fn capacity(&self) -> CapacitySpec<L> {
        match self {
            Self::Nf { capacity }
            | Self::Ffd { capacity }
            | Self::Bfd { capacity }
            | Self::Obfd { capacity, .. }
            | Self::Obfdp { capacity, .. }
            | Self::Ogbfd { capacity, .. }
            | Self::Ogbfdp { capacity, .. } => CapacitySpec::Uniform(*capacity),
            Self::Ohgbfd { capacities, .. } => CapacitySpec::Heterogeneous(capacities.clone()),
            Self::Oshgbfd { stages, .. } => CapacitySpec::Staged(stages.clone()),
        }
    }

    pub fn run(&self, lengths: &[L]) -> PackResult<PackingResult> {
        let result = match self {
            Self::Nf { capacity } => PackingResult::Bins(nf(lengths, *capacity)?),
            Self::Ffd { capacity } => PackingResult::Bins(ffd(lengths, *capacity)?),
            Self::Bfd { capacity } => PackingResult::Bins(bfd(lengths, *capacity)?),
            Self::Obfd {
                capacity,
                item_max_length,
            } => PackingResult::Bins(obfd(lengths, *capacity, *item_max_length)?),
            Self::Obfdp {
                capacity,
                item_max_length,
                parallel,
            } => PackingResult::Bins(obfdp(lengths, *capacity, *item_max_length, parallel)?),
            Self::Ogbfd {
                capacity,
                bins_per_group,
                item_max_length,
                strategy,
            } => PackingResult::Groups(ogbfd(
                lengths,
                *capacity,
                *bins_per_group,
                *item_max_length,
                *strategy,
            )?),
            Self::Ogbfdp {
                capacity,
                bins_per_group,
                item_max_length,
                strategy,
                parallel,
            } => PackingResult::Groups(ogbfdp(
                lengths,
                *capacity,
                *bins_per_group,
                *item_max_length,
                *strategy,
                parallel,
            )?),
            Self::Ohgbfd {
                capacities,
                item_max_length,
                weights,
            } => PackingResult::Heterogeneous(ohgbfd(
                lengths,
                capacities,
                *item_max_length,
                weights,
            )?),
            Self::Oshgbfd {
                stages,
                item_max_length,
                weights,
            } => PackingResult::Staged(oshgbfd(lengths, stages, *item_max_length, weights)?),
        };
        debug!(
            strategy = %self.strategy(),
            items = lengths.len(),
            bins = result.bin_count(),
            "pack finished"
        );
        Ok(result)
    }
}

/// Output of [`pack`], shaped by the resolved strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PackingResult {
    /// NF, FFD, BFD, OBFD, OBFDP.
    Bins(Vec<Vec<usize>>),
    /// OGBFD, OGBFDP.
    Groups(Vec<Vec<Vec<usize>>>),
    /// OHGBFD.
    Heterogeneous(Vec<CapacityBins>),
    /// OSHGBFD.
    Staged(Vec<StageBins>),
}

impl PackingResult {
    /// Total number of bins, empty ones included.
    pub fn bin_count(&self) -> usize {
        match self {
            Self::Bins(bins) => bins.len(),
            Self::Groups(groups) => groups.iter().map(Vec::len).sum(),
            Self::Heterogeneous(classes) => classes.iter().map(|c| c.bins.len()).sum(),
            Self::Staged(entries) => entries.iter().map(|e| e.bins.len()).sum(),
        }
    }

    /// Check completeness and capacity validity against `capacity`.
    ///
    /// Grouped results must have groups of one common size.
    pub fn verify<L: Length>(&self, lengths: &[L], capacity: &CapacitySpec<L>) -> PackResult<()> {
        match (self, capacity) {
            (Self::Bins(bins), CapacitySpec::Uniform(c)) => verify::verify_bins(lengths, bins, *c),
            (Self::Groups(groups), CapacitySpec::Uniform(c)) => {
                let size = groups.first().map_or(0, Vec::len);
                verify::verify_groups(lengths, groups, *c, size)
            }
            (Self::Heterogeneous(classes), CapacitySpec::Heterogeneous(caps)) => {
                verify::verify_heterogeneous(lengths, classes, caps)
            }
            (Self::Staged(entries), CapacitySpec::Staged(stages)) => {
                verify::verify_staged(lengths, entries, stages)
            }
            _ => Err(PackError::invariant(
                "result shape does not match the capacity shape",
            )),
        }
    }
}

/// Resolve `config` and pack `lengths` with it.
pub fn pack<L: Length>(lengths: &[L], config: &PackConfig<L>) -> PackResult<PackingResult> {
    config.resolve()?.run(lengths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in PackStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<PackStrategy>().unwrap(), strategy);
        }
        assert_eq!("OBFD".parse::<PackStrategy>().unwrap(), PackStrategy::Obfd);
        assert!("best".parse::<PackStrategy>().is_err());
    }

    #[test]
    fn test_parallel_upgrade() {
        assert_eq!(PackStrategy::Obfd.parallel(), PackStrategy::Obfdp);
        assert_eq!(PackStrategy::Ogbfd.parallel(), PackStrategy::Ogbfdp);
        assert_eq!(PackStrategy::Nf.parallel(), PackStrategy::Nf);
    }

    #[test]
    fn test_run_and_verify_bins() {
        let lengths = [2u32, 1, 3, 2, 1];
        let algorithm = Algorithm::Obfd {
            capacity: 4,
            item_max_length: None,
        };
        let result = algorithm.run(&lengths).unwrap();
        assert_eq!(result.bin_count(), 3);
        result.verify(&lengths, &algorithm.capacity()).unwrap();
    }

    #[test]
    fn test_verify_rejects_shape_mismatch() {
        let result = PackingResult::Bins(vec![vec![0]]);
        let err = result
            .verify(&[1u32], &CapacitySpec::Heterogeneous(vec![4]))
            .unwrap_err();
        assert!(matches!(err, PackError::Invariant(_)));
    }

    #[test]
    fn test_groups_serialize_as_nested_lists() {
        let result = PackingResult::Groups(vec![vec![vec![0, 3], vec![1, 2]]]);
        assert_eq!(serde_json::to_string(&result).unwrap(), "[[[0,3],[1,2]]]");
    }
}

//! Packing job configuration, loadable from TOML.
//!
//! ```toml
//! capacity = 4096
//! strategy = "ogbfd"
//! bins_per_group = 8
//! enable_parallel = true
//! parallel_strategy = "repack"
//! ```

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PackError, PackResult};
use crate::grouped::GroupStrategy;
use crate::length::Length;
use crate::parallel::{DEFAULT_MIN_CHUNK_LEN, MergePolicy, ParallelConfig};
use crate::strategy::{Algorithm, CapacitySpec, PackStrategy, PackVariant, WeightSpec};

fn default_bins_per_group() -> usize {
    1
}

fn default_min_chunk_len() -> usize {
    DEFAULT_MIN_CHUNK_LEN
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackConfig<L> {
    pub capacity: CapacitySpec<L>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<PackStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<PackVariant>,
    /// Bins per group for the grouped packers.
    #[serde(default = "default_bins_per_group")]
    pub bins_per_group: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_max_length: Option<L>,
    #[serde(default)]
    pub enable_parallel: bool,
    #[serde(default)]
    pub parallel_strategy: MergePolicy,
    #[serde(default)]
    pub group_strategy: GroupStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default = "default_min_chunk_len")]
    pub min_chunk_len: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<WeightSpec>,
}

impl<L: Length> PackConfig<L> {
    /// A config with every optional field at its default.
    pub fn new(capacity: CapacitySpec<L>) -> Self {
        Self {
            capacity,
            strategy: None,
            variant: None,
            bins_per_group: default_bins_per_group(),
            item_max_length: None,
            enable_parallel: false,
            parallel_strategy: MergePolicy::default(),
            group_strategy: GroupStrategy::default(),
            workers: None,
            min_chunk_len: default_min_chunk_len(),
            weights: None,
        }
    }

    pub fn with_strategy(mut self, strategy: PackStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self>
    where
        L: DeserializeOwned,
    {
        let config: PackConfig<L> = toml::from_str(content).context("invalid pack config")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self>
    where
        L: DeserializeOwned,
    {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String>
    where
        L: Serialize,
    {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn parallel_config(&self) -> ParallelConfig {
        ParallelConfig {
            workers: self.workers,
            min_chunk_len: self.min_chunk_len,
            merge: self.parallel_strategy,
        }
    }

    /// Strategy the capacity shape and variant select when none is named.
    fn implied_strategy(&self) -> PackStrategy {
        match (&self.capacity, self.variant) {
            (CapacitySpec::Staged(_), _) => PackStrategy::Oshgbfd,
            (CapacitySpec::Heterogeneous(_), _) => PackStrategy::Ohgbfd,
            (CapacitySpec::Uniform(_), Some(PackVariant::Linear)) => PackStrategy::Obfd,
            (CapacitySpec::Uniform(_), _) => PackStrategy::Ogbfd,
        }
    }

    fn uniform_capacity(&self, strategy: PackStrategy) -> PackResult<L> {
        match &self.capacity {
            CapacitySpec::Uniform(capacity) => Ok(*capacity),
            _ => Err(PackError::config(format!(
                "{strategy} needs a single capacity value"
            ))),
        }
    }

    fn no_weights(&self, strategy: PackStrategy) -> PackResult<()> {
        match &self.weights {
            None => Ok(()),
            Some(_) => Err(PackError::config(format!(
                "{strategy} does not take weights"
            ))),
        }
    }

    fn no_item_max(&self, strategy: PackStrategy) -> PackResult<()> {
        match self.item_max_length {
            None => Ok(()),
            Some(_) => Err(PackError::config(format!(
                "{strategy} does not take item_max_length"
            ))),
        }
    }

    /// Turn the config into exactly one runnable [`Algorithm`].
    ///
    /// An explicit strategy wins over `variant`. `enable_parallel` upgrades
    /// OBFD and OGBFD to their parallel forms. The capacity shape and the
    /// optional fields must suit the chosen strategy.
    pub fn resolve(&self) -> PackResult<Algorithm<L>> {
        let named = match (self.strategy, self.variant) {
            (Some(strategy), Some(variant)) => {
                warn!(%strategy, ?variant, "both strategy and variant given, ignoring variant");
                strategy
            }
            (Some(strategy), None) => strategy,
            (None, _) => self.implied_strategy(),
        };
        let strategy = if self.enable_parallel {
            named.parallel()
        } else {
            named
        };

        let algorithm = match strategy {
            PackStrategy::Nf | PackStrategy::Ffd | PackStrategy::Bfd => {
                let capacity = self.uniform_capacity(strategy)?;
                self.no_weights(strategy)?;
                self.no_item_max(strategy)?;
                match strategy {
                    PackStrategy::Nf => Algorithm::Nf { capacity },
                    PackStrategy::Ffd => Algorithm::Ffd { capacity },
                    _ => Algorithm::Bfd { capacity },
                }
            }
            PackStrategy::Obfd => {
                self.no_weights(strategy)?;
                Algorithm::Obfd {
                    capacity: self.uniform_capacity(strategy)?,
                    item_max_length: self.item_max_length,
                }
            }
            PackStrategy::Obfdp => {
                self.no_weights(strategy)?;
                Algorithm::Obfdp {
                    capacity: self.uniform_capacity(strategy)?,
                    item_max_length: self.item_max_length,
                    parallel: self.parallel_config(),
                }
            }
            PackStrategy::Ogbfd => {
                self.no_weights(strategy)?;
                Algorithm::Ogbfd {
                    capacity: self.uniform_capacity(strategy)?,
                    bins_per_group: self.bins_per_group,
                    item_max_length: self.item_max_length,
                    strategy: self.group_strategy,
                }
            }
            PackStrategy::Ogbfdp => {
                self.no_weights(strategy)?;
                Algorithm::Ogbfdp {
                    capacity: self.uniform_capacity(strategy)?,
                    bins_per_group: self.bins_per_group,
                    item_max_length: self.item_max_length,
                    strategy: self.group_strategy,
                    parallel: self.parallel_config(),
                }
            }
            PackStrategy::Ohgbfd => {
                let CapacitySpec::Heterogeneous(capacities) = &self.capacity else {
                    return Err(PackError::config("ohgbfd needs a list of capacities"));
                };
                let weights = match &self.weights {
                    None => Vec::new(),
                    Some(WeightSpec::Flat(w)) => w.clone(),
                    Some(WeightSpec::Staged(_)) => {
                        return Err(PackError::config("ohgbfd takes one flat weight list"));
                    }
                };
                Algorithm::Ohgbfd {
                    capacities: capacities.clone(),
                    item_max_length: self.item_max_length,
                    weights,
                }
            }
            PackStrategy::Oshgbfd => {
                let CapacitySpec::Staged(stages) = &self.capacity else {
                    return Err(PackError::config(
                        "oshgbfd needs a list of capacity lists, one per stage",
                    ));
                };
                let weights = match &self.weights {
                    None => Vec::new(),
                    Some(WeightSpec::Flat(w)) if w.is_empty() => Vec::new(),
                    Some(WeightSpec::Staged(w)) => w.clone(),
                    Some(WeightSpec::Flat(_)) => {
                        return Err(PackError::config("oshgbfd takes one weight list per stage"));
                    }
                };
                Algorithm::Oshgbfd {
                    stages: stages.clone(),
                    item_max_length: self.item_max_length,
                    weights,
                }
            }
        };

        debug!(%named, resolved = %strategy, "resolved packing strategy");
        Ok(algorithm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(toml_str: &str) -> PackConfig<u32> {
        PackConfig::from_toml_str(toml_str).unwrap()
    }

    #[test]
    fn test_parse_minimal() {
        let config = make_config("capacity = 4096");
        assert_eq!(config.capacity, CapacitySpec::Uniform(4096));
        assert_eq!(config.bins_per_group, 1);
        assert_eq!(config.min_chunk_len, DEFAULT_MIN_CHUNK_LEN);
        assert!(!config.enable_parallel);
    }

    #[test]
    fn test_parse_full() {
        let config = make_config(
            r#"
capacity = 4096
strategy = "ogbfd"
bins_per_group = 8
item_max_length = 2048
enable_parallel = true
parallel_strategy = "concatenate"
group_strategy = "windowed"
workers = 4
min_chunk_len = 256
"#,
        );
        assert_eq!(config.strategy, Some(PackStrategy::Ogbfd));
        assert_eq!(config.parallel_strategy, MergePolicy::Concatenate);
        assert_eq!(config.group_strategy, GroupStrategy::Windowed);
        match config.resolve().unwrap() {
            Algorithm::Ogbfdp {
                bins_per_group,
                item_max_length,
                parallel,
                ..
            } => {
                assert_eq!(bins_per_group, 8);
                assert_eq!(item_max_length, Some(2048));
                assert_eq!(parallel.workers, Some(4));
                assert_eq!(parallel.min_chunk_len, 256);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_integer_strategy_codes() {
        let config = make_config("capacity = 10\nparallel_strategy = 1\ngroup_strategy = 1");
        assert_eq!(config.parallel_strategy, MergePolicy::Concatenate);
        assert_eq!(config.group_strategy, GroupStrategy::Windowed);

        let config = make_config("capacity = 10\nparallel_strategy = 0\ngroup_strategy = 0");
        assert_eq!(config.parallel_strategy, MergePolicy::Repack);
        assert_eq!(config.group_strategy, GroupStrategy::Greedy);

        assert!(PackConfig::<u32>::from_toml_str("capacity = 10\nparallel_strategy = 2").is_err());
        assert!(PackConfig::<u32>::from_toml_str("capacity = 10\ngroup_strategy = \"fast\"").is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(PackConfig::<u32>::from_toml_str("capacity = 10\ndp_size = 2").is_err());
    }

    #[test]
    fn test_capacity_shape_selects_strategy() {
        let cases = [
            ("capacity = 10", PackStrategy::Ogbfd),
            ("capacity = 10\nvariant = \"linear\"", PackStrategy::Obfd),
            ("capacity = 10\nvariant = \"square\"", PackStrategy::Ogbfd),
            ("capacity = [4, 8]", PackStrategy::Ohgbfd),
            ("capacity = [[4, 8], [16]]", PackStrategy::Oshgbfd),
        ];
        for (toml_str, expected) in cases {
            assert_eq!(make_config(toml_str).resolve().unwrap().strategy(), expected);
        }
    }

    #[test]
    fn test_strategy_wins_over_variant() {
        let config = make_config("capacity = 10\nstrategy = \"ffd\"\nvariant = \"square\"");
        assert_eq!(config.resolve().unwrap(), Algorithm::Ffd { capacity: 10 });
    }

    #[test]
    fn test_parallel_upgrade_only_for_optimized() {
        let config = make_config("capacity = 10\nvariant = \"linear\"\nenable_parallel = true");
        assert_eq!(config.resolve().unwrap().strategy(), PackStrategy::Obfdp);
        let config = make_config("capacity = 10\nstrategy = \"nf\"\nenable_parallel = true");
        assert_eq!(config.resolve().unwrap().strategy(), PackStrategy::Nf);
    }

    #[test]
    fn test_shape_mismatch_is_config_error() {
        let config = make_config("capacity = [4, 8]\nstrategy = \"bfd\"");
        assert!(matches!(config.resolve(), Err(PackError::Config(_))));
        let config = make_config("capacity = 10\nstrategy = \"oshgbfd\"");
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_weights_follow_shape() {
        let config = make_config("capacity = [4, 8]\nweights = [1.0, 2.0]");
        match config.resolve().unwrap() {
            Algorithm::Ohgbfd { weights, .. } => assert_eq!(weights, vec![1.0, 2.0]),
            other => panic!("unexpected {other:?}"),
        }
        let config = make_config("capacity = [[4], [8]]\nweights = [1.0, 2.0]");
        assert!(config.resolve().is_err());
        let config = make_config("capacity = 10\nweights = [1.0]");
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PackConfig::new(CapacitySpec::Uniform(64u32)).with_strategy(PackStrategy::Bfd);
        let text = config.to_toml_string().unwrap();
        assert_eq!(PackConfig::<u32>::from_toml_str(&text).unwrap(), config);
    }
}

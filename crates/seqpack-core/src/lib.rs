//! seqpack-core: sequence packing, grouping, and load balancing.
//!
//! Packs variable-length sequences (token counts) into fixed-capacity bins
//! for batched training, and splits packed sequences across nodes. The crate
//! provides:
//!
//! - Single-bin heuristics: [`nf`], [`ffd`], [`bfd`]
//! - Tracker-backed best fit and its parallel form: [`obfd`], [`obfdp`]
//! - Grouped packing that evens out squared lengths: [`ogbfd`], [`ogbfdp`]
//! - Heterogeneous and staged capacity lists: [`ohgbfd`], [`oshgbfd`]
//! - Prefix grouping of keyed sequences: [`radix_sort`], [`radix_merge`]
//! - Mirrored partitioning across nodes: [`load_balance`]
//!
//! [`pack`] picks a packer from a [`PackConfig`] and runs it.
//!
//! # Architecture
//!
//! ```text
//! PackConfig ──resolve──▶ Algorithm ──run──▶ PackingResult
//!                            │
//!                            ├── single / optimized / grouped / hetero
//!                            │     └── CapacityTracker (ordered remaining capacity)
//!                            └── parallel (rayon fan-out, chunk-order merge)
//! ```

pub mod balance;
pub mod bin;
pub mod config;
pub mod error;
pub mod grouped;
pub mod hetero;
mod items;
pub mod length;
pub mod optimized;
pub mod parallel;
pub mod radix;
pub mod single;
pub mod strategy;
pub mod tracker;
pub mod verify;

pub use balance::{BalanceResult, Segment, load_balance};
pub use bin::Bin;
pub use config::PackConfig;
pub use error::{ErrorKind, PackError, PackResult};
pub use grouped::{GroupStrategy, ogbfd, ogbfdp};
pub use hetero::{CapacityBins, StageBins, ohgbfd, oshgbfd};
pub use length::Length;
pub use optimized::{obfd, obfdp};
pub use parallel::{MergePolicy, ParallelConfig};
pub use radix::{PrefixEntry, PrefixGroup, radix_merge, radix_sort};
pub use single::{bfd, ffd, nf};
pub use strategy::{Algorithm, CapacitySpec, PackStrategy, PackVariant, PackingResult, WeightSpec, pack};
pub use tracker::CapacityTracker;

//! Fork-join support for the parallel packers.
//!
//! Input is split once into contiguous index ranges, each range is packed
//! on its own with private state, and the per-chunk results are collected
//! in chunk order before a single merge step. Nothing is shared between
//! workers while they run.

use std::ops::Range;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bin::Bin;
use crate::error::{PackError, PackResult};
use crate::length::Length;
use crate::tracker::CapacityTracker;

/// Default minimum number of items per chunk.
pub const DEFAULT_MIN_CHUNK_LEN: usize = 1024;

/// How chunk results are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "CodeOrName")]
pub enum MergePolicy {
    /// Best-fit the chunk bins into each other as one flat pool (code 0).
    #[default]
    Repack,
    /// Chain chunk results in chunk order (code 1).
    Concatenate,
}

/// Serialized selector accepted for the strategy enums: either the
/// lowercase name or the integer code.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum CodeOrName {
    Code(u8),
    Name(String),
}

impl TryFrom<CodeOrName> for MergePolicy {
    type Error = PackError;

    fn try_from(value: CodeOrName) -> PackResult<Self> {
        match value {
            CodeOrName::Code(code) => Self::try_from(code),
            CodeOrName::Name(name) => match name.as_str() {
                "repack" => Ok(Self::Repack),
                "concatenate" => Ok(Self::Concatenate),
                other => Err(PackError::config(format!(
                    "parallel_strategy must be repack or concatenate, got '{other}'"
                ))),
            },
        }
    }
}

impl TryFrom<u8> for MergePolicy {
    type Error = PackError;

    fn try_from(code: u8) -> PackResult<Self> {
        match code {
            0 => Ok(Self::Repack),
            1 => Ok(Self::Concatenate),
            other => Err(PackError::config(format!(
                "parallel_strategy must be 0 or 1, got {other}"
            ))),
        }
    }
}

/// Parallel execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Number of chunks to fan out to. Defaults to rayon's thread count.
    pub workers: Option<usize>,
    /// Inputs shorter than this per worker use fewer chunks.
    pub min_chunk_len: usize,
    pub merge: MergePolicy,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            workers: None,
            min_chunk_len: DEFAULT_MIN_CHUNK_LEN,
            merge: MergePolicy::Repack,
        }
    }
}

impl ParallelConfig {
    pub fn with_merge(mut self, merge: MergePolicy) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_min_chunk_len(mut self, min_chunk_len: usize) -> Self {
        self.min_chunk_len = min_chunk_len;
        self
    }

    pub(crate) fn validate(&self) -> PackResult<()> {
        if self.workers == Some(0) {
            return Err(PackError::config("workers must be at least 1"));
        }
        if self.min_chunk_len == 0 {
            return Err(PackError::config("min_chunk_len must be at least 1"));
        }
        Ok(())
    }

    fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(rayon::current_num_threads)
            .max(1)
    }

    /// Split `0..len` into contiguous, near-equal ranges.
    pub(crate) fn chunk_ranges(&self, len: usize) -> Vec<Range<usize>> {
        if len == 0 {
            return Vec::new();
        }
        let chunks = self
            .worker_count()
            .min(len.div_ceil(self.min_chunk_len))
            .max(1);
        let base = len / chunks;
        let extra = len % chunks;

        let mut ranges = Vec::with_capacity(chunks);
        let mut start = 0;
        for chunk in 0..chunks {
            let size = base + usize::from(chunk < extra);
            ranges.push(start..start + size);
            start += size;
        }
        ranges
    }
}

/// Run `task` over every chunk in parallel; results come back in chunk order.
///
/// Returns only after every chunk has finished. The first error (by chunk
/// order) fails the whole call.
pub(crate) fn fan_out<T, F>(ranges: Vec<Range<usize>>, task: F) -> PackResult<Vec<T>>
where
    T: Send,
    F: Fn(Range<usize>) -> PackResult<T> + Sync + Send,
{
    let chunks = ranges.len();
    let results: Vec<PackResult<T>> = ranges.into_par_iter().map(&task).collect();
    info!(chunks, "parallel chunks complete");
    results.into_iter().collect()
}

/// Combine chunk bins by best-fitting whole bins into each other.
///
/// Each input bin is treated as one item whose length is its used
/// capacity. Bins are considered in decreasing used order (ties by position
/// in the chunk-ordered input) and merged into the tightest earlier bin
/// with room.
pub(crate) fn repack_bins<L: Length>(bins: Vec<Bin<L>>, capacity: L) -> PackResult<Vec<Bin<L>>> {
    let mut order: Vec<usize> = (0..bins.len()).collect();
    order.sort_by(|&a, &b| bins[b].used().cmp_len(&bins[a].used()));

    let mut pending: Vec<Option<Bin<L>>> = bins.into_iter().map(Some).collect();
    let mut merged: Vec<Bin<L>> = Vec::new();
    let mut tracker = CapacityTracker::with_capacity(pending.len());

    for position in order {
        let Some(bin) = pending[position].take() else {
            return Err(PackError::invariant("chunk bin visited twice during merge"));
        };
        if bin.is_empty() {
            continue;
        }
        match tracker.best_fit(bin.used()) {
            Some(slot) => {
                merged[slot].absorb(bin)?;
                tracker.update(slot, merged[slot].remaining());
            }
            None => {
                let mut target = Bin::new(capacity);
                target.absorb(bin)?;
                tracker.open(target.remaining());
                merged.push(target);
            }
        }
    }
    Ok(merged)
}

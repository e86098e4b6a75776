//! Mirrored load balancing under a causal-attention cost model.
//!
//! A packed sequence of documents is split across `N` nodes. Within a
//! document every token attends to the tokens before it, so the cost of a
//! token grows with its offset in the document and a whole document of
//! length `L` costs `L²/2`. Cutting the sequence into `2N` pieces and giving
//! node `i` both piece `i` and piece `2N-1-i` pairs cheap early pieces with
//! expensive late ones.
//!
//! Costs are evaluated in closed form from prefix sums of lengths and of
//! `L²/2`, never by walking items inside a segment.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PackError, PackResult};
use crate::length::Length;

/// Accepted moves must improve the imbalance by more than this fraction.
const EPSILON: f64 = 1e-9;

/// Instances with at most this many boundary layouts are solved exactly.
const EXACT_SEARCH_LIMIT: usize = 200_000;

/// Half-width, in items, of the joint move tried for each boundary pair.
const PAIR_WINDOW: usize = 16;

/// Half-open range of item indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Balance outcome for one sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResult {
    /// `2N` contiguous segments covering every item exactly once.
    pub segments: Vec<Segment>,
    /// Cost of node `i`: segments `i` and `2N-1-i` combined.
    pub node_costs: Vec<f64>,
    /// Largest absolute deviation of a node cost from the mean.
    pub imbalance: f64,
    /// Node costs for an exact token-level split into `2N` equal pieces.
    pub split_costs: Vec<f64>,
    /// Imbalance of the token-level split.
    pub split_imbalance: f64,
}

/// Prefix sums over one sequence.
struct CostProfile {
    /// `cum[i]` = total length of items before `i`.
    cum: Vec<f64>,
    /// `half_sq[i]` = sum of `L²/2` over items before `i`.
    half_sq: Vec<f64>,
}

impl CostProfile {
    fn new<L: Length>(lengths: &[L]) -> Self {
        let mut cum = Vec::with_capacity(lengths.len() + 1);
        let mut half_sq = Vec::with_capacity(lengths.len() + 1);
        cum.push(0.0);
        half_sq.push(0.0);
        for length in lengths {
            let l = length.as_f64();
            cum.push(cum[cum.len() - 1] + l);
            half_sq.push(half_sq[half_sq.len() - 1] + l * l / 2.0);
        }
        Self { cum, half_sq }
    }

    fn items(&self) -> usize {
        self.cum.len() - 1
    }

    fn total(&self) -> f64 {
        self.cum[self.items()]
    }

    /// Cost of items `segment.start..segment.end`.
    fn item_cost(&self, segment: Segment) -> f64 {
        self.half_sq[segment.end] - self.half_sq[segment.start]
    }

    /// Cost of the token range `[a, b)`.
    ///
    /// Full items inside the range contribute `L²/2`; the items holding `a`
    /// and `b` contribute only the part of their triangle inside the range.
    fn token_cost(&self, a: f64, b: f64) -> f64 {
        if b <= a {
            return 0.0;
        }
        let last = self.items() - 1;
        let i = (self.cum.partition_point(|&c| c <= a) - 1).min(last);
        let j = (self.cum.partition_point(|&c| c < b) - 1).clamp(i, last);

        let offset_a = a - self.cum[i];
        if i == j {
            let offset_b = b - self.cum[i];
            return (offset_b * offset_b - offset_a * offset_a) / 2.0;
        }
        let len_i = self.cum[i + 1] - self.cum[i];
        let tail = (len_i * len_i - offset_a * offset_a) / 2.0;
        let middle = self.half_sq[j] - self.half_sq[i + 1];
        let offset_b = b - self.cum[j];
        tail + middle + offset_b * offset_b / 2.0
    }

    /// Item boundary whose cumulative length is closest to `t`; lower on ties.
    fn nearest_boundary(&self, t: f64) -> usize {
        let above = self.cum.partition_point(|&c| c < t).min(self.items());
        if above == 0 {
            return 0;
        }
        let below = above - 1;
        if t - self.cum[below] <= self.cum[above] - t {
            below
        } else {
            above
        }
    }
}

/// Fold `2N` segment costs into `N` mirrored node costs.
fn mirrored(segment_costs: &[f64]) -> Vec<f64> {
    let pieces = segment_costs.len();
    (0..pieces / 2)
        .map(|i| segment_costs[i] + segment_costs[pieces - 1 - i])
        .collect()
}

/// Largest absolute deviation from the mean.
fn imbalance(costs: &[f64]) -> f64 {
    if costs.is_empty() {
        return 0.0;
    }
    let mean = costs.iter().sum::<f64>() / costs.len() as f64;
    costs.iter().map(|c| (c - mean).abs()).fold(0.0, f64::max)
}

fn segments_of(boundaries: &[usize]) -> Vec<Segment> {
    boundaries
        .windows(2)
        .map(|w| Segment { start: w[0], end: w[1] })
        .collect()
}

fn node_costs(profile: &CostProfile, boundaries: &[usize]) -> Vec<f64> {
    let costs: Vec<f64> = segments_of(boundaries)
        .into_iter()
        .map(|s| profile.item_cost(s))
        .collect();
    mirrored(&costs)
}

fn score(profile: &CostProfile, boundaries: &[usize]) -> f64 {
    imbalance(&node_costs(profile, boundaries))
}

fn improves(score: f64, best: f64) -> bool {
    score < best - EPSILON * best.max(1.0)
}

/// Number of non-decreasing inner boundary vectors, `C(items + k, k)` for
/// `k = pieces - 1`, saturating just above [`EXACT_SEARCH_LIMIT`].
fn layout_count(items: usize, pieces: usize) -> usize {
    let mut count: u128 = 1;
    for i in 1..pieces {
        count = count * (items as u128 + i as u128) / i as u128;
        if count > EXACT_SEARCH_LIMIT as u128 {
            return EXACT_SEARCH_LIMIT + 1;
        }
    }
    count as usize
}

/// Try every boundary layout and keep the best, preferring the starting
/// layout and then the earliest layout on ties.
fn exhaustive_search(profile: &CostProfile, boundaries: &mut [usize]) {
    let items = profile.items();
    let pieces = boundaries.len() - 1;
    let mut best = score(profile, boundaries);
    let mut candidate = vec![0; pieces + 1];
    candidate[pieces] = items;
    loop {
        let current = score(profile, &candidate);
        if improves(current, best) {
            best = current;
            boundaries.copy_from_slice(&candidate);
        }
        // Odometer over inner boundaries that never decreases left to right.
        let Some(k) = (1..pieces).rev().find(|&k| candidate[k] < items) else {
            return;
        };
        candidate[k] += 1;
        let value = candidate[k];
        candidate[k + 1..pieces].fill(value);
    }
}

/// Improve `boundaries` until no move helps.
///
/// Each pass moves every boundary to its best position between its
/// neighbours, then moves every pair of boundaries jointly within
/// [`PAIR_WINDOW`] items. Pair moves shift work between mirrored halves,
/// which single moves cannot do without first making things worse.
fn local_search(profile: &CostProfile, boundaries: &mut [usize]) {
    let items = profile.items();
    let pieces = boundaries.len() - 1;
    let mut best = score(profile, boundaries);
    let mut improved = true;
    while improved {
        improved = false;

        for k in 1..pieces {
            let mut chosen = boundaries[k];
            for candidate in boundaries[k - 1]..=boundaries[k + 1] {
                boundaries[k] = candidate;
                let current = score(profile, boundaries);
                if improves(current, best) {
                    best = current;
                    chosen = candidate;
                    improved = true;
                }
            }
            boundaries[k] = chosen;
        }

        for k in 1..pieces {
            for l in k + 1..pieces {
                let (start_k, start_l) = (boundaries[k], boundaries[l]);
                let mut chosen = (start_k, start_l);
                let range = |b: usize| b.saturating_sub(PAIR_WINDOW)..=(b + PAIR_WINDOW).min(items);
                for x in range(start_k) {
                    for y in range(start_l) {
                        boundaries[k] = x;
                        boundaries[l] = y;
                        if boundaries.windows(2).any(|w| w[0] > w[1]) {
                            continue;
                        }
                        let current = score(profile, boundaries);
                        if improves(current, best) {
                            best = current;
                            chosen = (x, y);
                            improved = true;
                        }
                    }
                }
                (boundaries[k], boundaries[l]) = chosen;
            }
        }
    }
}

fn balance_one<L: Length>(lengths: &[L], nodes: usize, pieces: usize) -> PackResult<BalanceResult> {
    if let Some((index, length)) = lengths.iter().enumerate().find(|(_, l)| !l.is_positive()) {
        return Err(PackError::InvalidLength {
            index,
            length: length.to_string(),
        });
    }

    if lengths.is_empty() {
        return Ok(BalanceResult {
            segments: vec![Segment { start: 0, end: 0 }; pieces],
            node_costs: vec![0.0; nodes],
            imbalance: 0.0,
            split_costs: vec![0.0; nodes],
            split_imbalance: 0.0,
        });
    }

    let profile = CostProfile::new(lengths);
    let total = profile.total();
    let width = total / pieces as f64;
    let target = |k: usize| if k == pieces { total } else { k as f64 * width };

    let split_segments: Vec<f64> = (0..pieces)
        .map(|k| profile.token_cost(target(k), target(k + 1)))
        .collect();
    let split_costs = mirrored(&split_segments);
    let split_imbalance = imbalance(&split_costs);

    // Closed-form placement: round each equal-length target to the nearest
    // item boundary, keeping boundaries non-decreasing.
    let mut boundaries = Vec::with_capacity(pieces + 1);
    boundaries.push(0);
    for k in 1..pieces {
        let previous = boundaries[k - 1];
        boundaries.push(profile.nearest_boundary(target(k)).max(previous));
    }
    boundaries.push(profile.items());

    if layout_count(profile.items(), pieces) <= EXACT_SEARCH_LIMIT {
        exhaustive_search(&profile, &mut boundaries);
    } else {
        local_search(&profile, &mut boundaries);
    }

    let node_costs = node_costs(&profile, &boundaries);
    Ok(BalanceResult {
        segments: segments_of(&boundaries),
        imbalance: imbalance(&node_costs),
        node_costs,
        split_costs,
        split_imbalance,
    })
}

/// Balance each sequence across `nodes` nodes.
///
/// Returns one [`BalanceResult`] per input sequence, in order. An empty
/// sequence yields empty segments and zero costs.
pub fn load_balance<L: Length>(sequences: &[Vec<L>], nodes: usize) -> PackResult<Vec<BalanceResult>> {
    if nodes == 0 {
        return Err(PackError::config("nodes must be at least 1"));
    }
    let Some(pieces) = nodes.checked_mul(2) else {
        return Err(PackError::config(format!("nodes {nodes} is too large")));
    };
    let results = sequences
        .iter()
        .map(|lengths| balance_one(lengths, nodes, pieces))
        .collect::<PackResult<Vec<_>>>()?;

    debug!(
        sequences = sequences.len(),
        nodes,
        worst = results.iter().map(|r| r.imbalance).fold(0.0, f64::max),
        "load balanced"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Best imbalance over every contiguous `2N`-segment split.
    fn exhaustive_best(lengths: &[u32], nodes: usize) -> f64 {
        let profile = CostProfile::new(lengths);
        let n = lengths.len();
        let pieces = 2 * nodes;
        let mut best = f64::INFINITY;
        let mut inner = vec![0usize; pieces - 1];
        loop {
            let mut boundaries = vec![0];
            boundaries.extend(&inner);
            boundaries.push(n);
            if boundaries.windows(2).all(|w| w[0] <= w[1]) {
                best = best.min(imbalance(&node_costs(&profile, &boundaries)));
            }
            // Odometer over inner boundaries in 0..=n.
            let mut k = 0;
            while k < inner.len() && inner[k] == n {
                inner[k] = 0;
                k += 1;
            }
            if k == inner.len() {
                return best;
            }
            inner[k] += 1;
        }
    }

    fn assert_covers(result: &BalanceResult, len: usize, nodes: usize) {
        assert_eq!(result.segments.len(), 2 * nodes);
        assert_eq!(result.segments[0].start, 0);
        assert_eq!(result.segments[2 * nodes - 1].end, len);
        for pair in result.segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn nine_nine_two_matches_exhaustive_search() {
        let results = load_balance(&[vec![9u32, 9, 2]], 2).unwrap();
        let result = &results[0];
        assert_covers(result, 3, 2);
        assert!(result.imbalance <= exhaustive_best(&[9, 9, 2], 2) + 1e-9);
        assert_eq!(result.imbalance, 1.0);
        assert_eq!(result.node_costs, vec![42.5, 40.5]);
    }

    #[test]
    fn six_six_five_matches_exhaustive_search() {
        let results = load_balance(&[vec![6u32, 6, 5]], 2).unwrap();
        assert!(results[0].imbalance <= exhaustive_best(&[6, 6, 5], 2) + 1e-9);
        assert_eq!(results[0].imbalance, 6.25);
    }

    #[test]
    fn moves_middle_block_past_single_boundary_minimum() {
        // Shifting either boundary of node 1 alone makes things worse; the
        // optimum moves both.
        let lengths = [15u32, 16, 14, 19, 19];
        let results = load_balance(&[lengths.to_vec()], 2).unwrap();
        assert_covers(&results[0], 5, 2);
        assert!(results[0].imbalance <= 11.25 + 1e-9);
        assert!(results[0].imbalance <= exhaustive_best(&lengths, 2) + 1e-9);
    }

    #[test]
    fn layout_count_saturates() {
        assert_eq!(layout_count(3, 4), 20);
        assert_eq!(layout_count(5, 1), 1);
        assert_eq!(layout_count(100_000, 8), EXACT_SEARCH_LIMIT + 1);
    }

    #[test]
    fn local_search_never_worsens_start() {
        let lengths: Vec<u32> = (0..300).map(|i| (i * 37 % 97) + 1).collect();
        let profile = CostProfile::new(&lengths);
        let pieces = 8;
        let mut boundaries: Vec<usize> = (0..=pieces).map(|k| k * lengths.len() / pieces).collect();
        let start = score(&profile, &boundaries);
        local_search(&profile, &mut boundaries);
        assert_eq!(boundaries[0], 0);
        assert_eq!(boundaries[pieces], lengths.len());
        assert!(boundaries.windows(2).all(|w| w[0] <= w[1]));
        assert!(score(&profile, &boundaries) <= start);
    }

    #[test]
    fn large_sequence_uses_local_search() {
        let lengths: Vec<u32> = (0..2000).map(|i| (i * 53 % 211) + 1).collect();
        assert!(layout_count(lengths.len(), 8) > EXACT_SEARCH_LIMIT);
        let results = load_balance(&[lengths.clone()], 4).unwrap();
        assert_covers(&results[0], lengths.len(), 4);
        let total: f64 = lengths.iter().map(|&l| f64::from(l) * f64::from(l) / 2.0).sum();
        let covered: f64 = results[0].node_costs.iter().sum();
        assert!((covered - total).abs() <= 1e-6 * total);
    }

    #[test]
    fn token_split_uses_closed_form() {
        // Pieces of 5 tokens over documents [0,9) [9,18) [18,20):
        // 12.5, 28.5, 17.5, 24.5 -> nodes 37 and 46.
        let results = load_balance(&[vec![9u32, 9, 2]], 2).unwrap();
        assert_eq!(results[0].split_costs, vec![37.0, 46.0]);
        assert_eq!(results[0].split_imbalance, 4.5);
    }

    #[test]
    fn token_costs_sum_to_total() {
        let lengths = [7u32, 3, 12, 1, 5];
        let profile = CostProfile::new(&lengths);
        let total: f64 = lengths.iter().map(|&l| f64::from(l * l) / 2.0).sum();
        let cuts = [0.0, 4.0, 9.5, 21.0, 28.0];
        let sum: f64 = cuts.windows(2).map(|w| profile.token_cost(w[0], w[1])).sum();
        assert!((sum - total).abs() < 1e-9);
    }

    #[test]
    fn node_costs_cover_every_item() {
        let lengths = vec![18u32, 18, 18, 2];
        let results = load_balance(&[lengths.clone()], 3).unwrap();
        let total: f64 = lengths.iter().map(|&l| f64::from(l * l) / 2.0).sum();
        let covered: f64 = results[0].node_costs.iter().sum();
        assert!((covered - total).abs() < 1e-9);
        assert_covers(&results[0], 4, 3);
    }

    #[test]
    fn one_result_per_sequence() {
        let seqs = vec![vec![9u32, 9, 2], vec![6, 6, 5], vec![18, 18, 18, 2]];
        let results = load_balance(&seqs, 2).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn empty_sequence_yields_empty_segments() {
        let results = load_balance::<u32>(&[vec![]], 2).unwrap();
        assert_eq!(results[0].segments.len(), 4);
        assert!(results[0].segments.iter().all(Segment::is_empty));
        assert_eq!(results[0].imbalance, 0.0);
    }

    #[test]
    fn zero_nodes_is_rejected() {
        assert!(load_balance(&[vec![1u32]], 0).is_err());
    }

    #[test]
    fn oversized_node_count_is_rejected() {
        let err = load_balance(&[vec![1u32]], usize::MAX).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn single_node_has_no_imbalance() {
        let results = load_balance(&[vec![4u32, 8, 1]], 1).unwrap();
        assert_eq!(results[0].imbalance, 0.0);
        assert_eq!(results[0].node_costs.len(), 1);
    }

    proptest! {
        #[test]
        fn small_sequences_reach_exhaustive_optimum(
            lengths in prop::collection::vec(1u32..=20, 1..=7),
            nodes in 1usize..=3,
        ) {
            let results = load_balance(&[lengths.clone()], nodes).unwrap();
            let best = exhaustive_best(&lengths, nodes);
            prop_assert!(results[0].imbalance <= best + 1e-6 * best.max(1.0));
        }
    }
}

//! Prefix radix grouping.
//!
//! A group is an ordered list of `[key, position]` entries, where the key
//! identifies shared content (for example a prompt-prefix block) and the
//! position is carried along untouched. Sorting groups by their key
//! sequences puts groups with common prefixes next to each other, and
//! merging then clusters them so they can be packed together.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PackError, PackResult};

/// One keyed entry of a group. Serializes as `[key, position]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct PrefixEntry {
    pub key: u32,
    pub position: u32,
}

impl From<[u32; 2]> for PrefixEntry {
    fn from([key, position]: [u32; 2]) -> Self {
        Self { key, position }
    }
}

impl From<PrefixEntry> for [u32; 2] {
    fn from(entry: PrefixEntry) -> Self {
        [entry.key, entry.position]
    }
}

pub type PrefixGroup = Vec<PrefixEntry>;

/// Sort groups lexicographically by the keys at positions
/// `start_index..=max_index`.
///
/// LSD radix sort with one stable counting pass per key position, so the
/// cost is linear in the number of groups times the window width plus the
/// largest key present. A group shorter than a position sorts before every
/// group that has a key there. Keys above `max_value` inside the window are
/// a configuration error.
pub fn radix_sort(
    groups: &[PrefixGroup],
    start_index: usize,
    max_index: usize,
    max_value: u32,
) -> PackResult<Vec<PrefixGroup>> {
    if start_index > max_index {
        return Err(PackError::config(format!(
            "start_index {start_index} is past max_index {max_index}"
        )));
    }
    if groups.is_empty() {
        return Ok(Vec::new());
    }

    // Positions past the longest group cannot change the order.
    let longest = groups.iter().map(Vec::len).max().unwrap_or(0);
    if longest <= start_index {
        return Ok(groups.to_vec());
    }
    let last = max_index.min(longest - 1);

    let mut largest_key = 0;
    for (g, group) in groups.iter().enumerate() {
        for entry in group.iter().take(last + 1).skip(start_index) {
            if entry.key > max_value {
                return Err(PackError::config(format!(
                    "group {g} has key {} above max_value {max_value}",
                    entry.key
                )));
            }
            largest_key = largest_key.max(entry.key);
        }
    }

    // Bucket 0 holds groups without a key at this position.
    let buckets = largest_key as usize + 2;
    let mut order: Vec<usize> = (0..groups.len()).collect();
    let mut counts = vec![0usize; buckets];
    let mut next = vec![0usize; groups.len()];

    for position in (start_index..=last).rev() {
        let bucket_of = |g: usize| groups[g].get(position).map_or(0, |e| e.key as usize + 1);

        counts.fill(0);
        for &g in &order {
            counts[bucket_of(g)] += 1;
        }
        let mut offset = 0;
        for count in counts.iter_mut() {
            let n = *count;
            *count = offset;
            offset += n;
        }
        for &g in &order {
            let b = bucket_of(g);
            next[counts[b]] = g;
            counts[b] += 1;
        }
        std::mem::swap(&mut order, &mut next);
    }

    debug!(groups = groups.len(), start_index, last, "radix sorted");
    Ok(order.into_iter().map(|g| groups[g].clone()).collect())
}

/// Number of leading entries whose keys agree.
fn common_prefix(a: &[PrefixEntry], b: &[PrefixEntry]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x.key == y.key).count()
}

fn leading_keys(group: &[PrefixEntry], n: usize) -> Vec<u32> {
    group[..n].iter().map(|e| e.key).collect()
}

/// A merged group under construction. The first member is the anchor.
struct Cluster {
    members: Vec<usize>,
    size: usize,
}

/// Coalesce groups that share at least `min_prefix_match` leading keys.
///
/// Each merged group starts from an anchor group; a later group joins it
/// when its keys agree with the anchor's on at least `min_prefix_match`
/// leading positions, the merged group holds fewer than `max_count` groups,
/// and the merged size stays within `max_length`. The merged size counts
/// the prefix shared with the anchor once.
///
/// Without `allow_cross_group_merge` a group may only join the merged group
/// directly before it. With it, a group joins the earliest-anchored open
/// merged group with the longest shared prefix. Merged groups come back in
/// anchor order.
pub fn radix_merge(
    groups: &[PrefixGroup],
    min_prefix_match: usize,
    max_length: usize,
    max_count: usize,
    allow_cross_group_merge: bool,
) -> PackResult<Vec<Vec<PrefixGroup>>> {
    if max_length == 0 {
        return Err(PackError::config("max_length must be at least 1"));
    }
    if max_count == 0 {
        return Err(PackError::config("max_count must be at least 1"));
    }

    let mut clusters: Vec<Cluster> = Vec::new();
    // Open clusters by their anchor's leading keys. Cross-group mode only.
    let mut open: HashMap<Vec<u32>, Vec<usize>> = HashMap::new();

    for (g, group) in groups.iter().enumerate() {
        let joinable = |cluster: &Cluster| -> Option<usize> {
            let anchor = &groups[cluster.members[0]];
            let shared = common_prefix(anchor, group);
            let fits = cluster.members.len() < max_count
                && cluster.size + (group.len() - shared) <= max_length;
            (shared >= min_prefix_match && fits).then_some(shared)
        };

        let target = if group.len() < min_prefix_match {
            None
        } else if allow_cross_group_merge {
            open.get(&leading_keys(group, min_prefix_match)).and_then(|candidates| {
                candidates
                    .iter()
                    .filter_map(|&c| joinable(&clusters[c]).map(|shared| (shared, c)))
                    // Longest prefix first, then earliest anchor.
                    .min_by(|(sa, ca), (sb, cb)| sb.cmp(sa).then(ca.cmp(cb)))
                    .map(|(shared, c)| (c, shared))
            })
        } else {
            clusters
                .last()
                .and_then(|cluster| joinable(cluster).map(|shared| (clusters.len() - 1, shared)))
        };

        match target {
            Some((c, shared)) => {
                let cluster = &mut clusters[c];
                cluster.members.push(g);
                cluster.size += group.len() - shared;
                if allow_cross_group_merge && cluster.members.len() >= max_count {
                    let key = leading_keys(group, min_prefix_match);
                    if let Some(candidates) = open.get_mut(&key) {
                        candidates.retain(|&other| other != c);
                    }
                }
            }
            None => {
                let c = clusters.len();
                clusters.push(Cluster {
                    members: vec![g],
                    size: group.len(),
                });
                if allow_cross_group_merge && group.len() >= min_prefix_match && max_count > 1 {
                    open.entry(leading_keys(group, min_prefix_match))
                        .or_default()
                        .push(c);
                }
            }
        }
    }

    debug!(
        groups = groups.len(),
        merged = clusters.len(),
        allow_cross_group_merge,
        "radix merged"
    );
    Ok(clusters
        .into_iter()
        .map(|cluster| cluster.members.into_iter().map(|g| groups[g].clone()).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(entries: &[[u32; 2]]) -> PrefixGroup {
        entries.iter().copied().map(PrefixEntry::from).collect()
    }

    fn sample() -> Vec<PrefixGroup> {
        vec![
            group(&[[4, 0], [7, 8], [4, 11]]),
            group(&[[4, 3], [9, 10]]),
            group(&[[1, 2], [5, 6]]),
        ]
    }

    #[test]
    fn radix_sort_orders_by_keys() {
        let sorted = radix_sort(&sample(), 0, 9, 40).unwrap();
        assert_eq!(
            sorted,
            vec![
                group(&[[1, 2], [5, 6]]),
                group(&[[4, 0], [7, 8], [4, 11]]),
                group(&[[4, 3], [9, 10]]),
            ]
        );
    }

    #[test]
    fn shorter_group_sorts_first_on_shared_prefix() {
        let groups = vec![group(&[[2, 0], [3, 0]]), group(&[[2, 1]])];
        let sorted = radix_sort(&groups, 0, 5, 10).unwrap();
        assert_eq!(sorted[0], group(&[[2, 1]]));
    }

    #[test]
    fn radix_sort_ignores_keys_outside_window() {
        // Only position 1 is compared; 9 > 3 at position 0 does not matter.
        let groups = vec![group(&[[9, 0], [5, 0]]), group(&[[3, 1], [2, 1]])];
        let sorted = radix_sort(&groups, 1, 1, 10).unwrap();
        assert_eq!(sorted[0], group(&[[3, 1], [2, 1]]));
    }

    #[test]
    fn radix_sort_is_stable_for_equal_keys() {
        let groups = vec![group(&[[1, 7]]), group(&[[1, 3]])];
        let sorted = radix_sort(&groups, 0, 0, 1).unwrap();
        assert_eq!(sorted, groups);
    }

    #[test]
    fn radix_sort_rejects_key_above_max_value() {
        let err = radix_sort(&sample(), 0, 9, 5).unwrap_err();
        assert!(matches!(err, PackError::Config(_)));
    }

    #[test]
    fn radix_sort_sizes_buckets_from_present_keys() {
        let groups = vec![group(&[[3, 0]]), group(&[[1, 1]])];
        let sorted = radix_sort(&groups, 0, 0, u32::MAX).unwrap();
        assert_eq!(sorted, vec![group(&[[1, 1]]), group(&[[3, 0]])]);
    }

    #[test]
    fn radix_sort_rejects_inverted_window() {
        assert!(radix_sort(&sample(), 3, 1, 40).is_err());
    }

    #[test]
    fn merge_keeps_distinct_prefixes_apart() {
        let sorted = radix_sort(&sample(), 0, 9, 40).unwrap();
        let merged = radix_merge(&sorted, 1, 10, 5, false).unwrap();
        assert_eq!(
            merged,
            vec![
                vec![group(&[[1, 2], [5, 6]])],
                vec![group(&[[4, 0], [7, 8], [4, 11]]), group(&[[4, 3], [9, 10]])],
            ]
        );
    }

    #[test]
    fn merge_respects_max_length() {
        let sorted = radix_sort(&sample(), 0, 9, 40).unwrap();
        // Anchor of 3 entries plus 1 unshared entry would be 4 > 3.
        let merged = radix_merge(&sorted, 1, 3, 5, false).unwrap();
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn merge_respects_max_count() {
        let groups = vec![group(&[[4, 0]]), group(&[[4, 1]]), group(&[[4, 2]])];
        let merged = radix_merge(&groups, 1, 100, 2, false).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].len(), 2);
        assert_eq!(merged[1], vec![group(&[[4, 2]])]);
    }

    #[test]
    fn adjacent_only_merge_skips_separated_groups() {
        let groups = vec![group(&[[4, 0]]), group(&[[1, 1]]), group(&[[4, 2]])];
        let merged = radix_merge(&groups, 1, 100, 5, false).unwrap();
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn cross_group_merge_reaches_back() {
        let groups = vec![group(&[[4, 0]]), group(&[[1, 1]]), group(&[[4, 2]])];
        let merged = radix_merge(&groups, 1, 100, 5, true).unwrap();
        assert_eq!(
            merged,
            vec![
                vec![group(&[[4, 0]]), group(&[[4, 2]])],
                vec![group(&[[1, 1]])],
            ]
        );
    }

    #[test]
    fn zero_caps_are_rejected() {
        assert!(radix_merge(&sample(), 1, 0, 5, false).is_err());
        assert!(radix_merge(&sample(), 1, 10, 0, false).is_err());
    }

    #[test]
    fn entries_serialize_as_pairs() {
        let json = serde_json::to_string(&group(&[[4, 0], [7, 8]])).unwrap();
        assert_eq!(json, "[[4,0],[7,8]]");
    }
}

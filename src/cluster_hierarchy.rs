// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Agglomerative clustering of SiDB positions and the cluster tree built
//! from it.
//!
//! The clustering yields a strict binary hierarchy ([`BinaryClusterNode`]).
//! [`ClusterTree`] flattens it into an arena indexed by cluster uid:
//!
//! ```text
//!   uid 0 .. N-1      singletons, uid == SiDB index
//!   uid N .. 2N-2     composite clusters, assigned bottom-up
//! ```
//!
//! A parent therefore always has a larger uid than its children.

use crate::layout::SidbLayout;
use crate::physics::nm_distance;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Arena index of a cluster.
pub type ClusterId = usize;

/// Inter-cluster distance used when merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LinkageMethod {
    /// Maximum pairwise distance.
    Complete,
    /// Minimum pairwise distance.
    Single,
    /// Size-weighted mean distance (UPGMA).
    UnweightedAverage,
    /// Plain mean of the merged distances (WPGMA).
    WeightedAverage,
    /// Ward's criterion.
    #[default]
    MinimumVariance,
}

impl LinkageMethod {
    /// Lance-Williams update of the distance from cluster `k` to the union
    /// of `i` and `j`.
    fn update(self, d_ki: f64, d_kj: f64, d_ij: f64, n_i: f64, n_j: f64, n_k: f64) -> f64 {
        match self {
            LinkageMethod::Single => d_ki.min(d_kj),
            LinkageMethod::Complete => d_ki.max(d_kj),
            LinkageMethod::UnweightedAverage => (n_i * d_ki + n_j * d_kj) / (n_i + n_j),
            LinkageMethod::WeightedAverage => 0.5 * (d_ki + d_kj),
            LinkageMethod::MinimumVariance => {
                ((n_i + n_k) * d_ki + (n_j + n_k) * d_kj - n_k * d_ij) / (n_i + n_j + n_k)
            }
        }
    }
}

/// A node of the binary hierarchy: the SiDBs below it and either no or
/// exactly two children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryClusterNode {
    /// Sorted SiDB indices.
    pub sidbs: Vec<usize>,
    pub children: Vec<BinaryClusterNode>,
}

impl BinaryClusterNode {
    fn leaf(ix: usize) -> Self {
        Self {
            sidbs: vec![ix],
            children: vec![],
        }
    }

    fn merge(a: BinaryClusterNode, b: BinaryClusterNode) -> Self {
        let mut sidbs = Vec::with_capacity(a.sidbs.len() + b.sidbs.len());
        sidbs.extend_from_slice(&a.sidbs);
        sidbs.extend_from_slice(&b.sidbs);
        sidbs.sort_unstable();
        Self {
            sidbs,
            children: vec![a, b],
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Clusters the SiDBs of `layout` bottom-up by their nanometer positions.
///
/// Runs the `N - 1` merges of naive agglomerative clustering. Ties between
/// equally close pairs are broken towards the lowest slot indices, so the
/// result is deterministic.
pub fn sidb_cluster_hierarchy(layout: &SidbLayout, linkage: LinkageMethod) -> BinaryClusterNode {
    let positions = layout.nm_positions();
    let n = positions.len();
    match n {
        0 => {
            return BinaryClusterNode {
                sidbs: vec![],
                children: vec![],
            }
        }
        1 => return BinaryClusterNode::leaf(0),
        _ => {}
    }

    let squared = linkage == LinkageMethod::MinimumVariance;
    let mut dist = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = nm_distance(positions[i], positions[j]);
            let d = if squared { d * d } else { d };
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }

    // slot i holds the cluster currently stored at row i
    let mut slots: Vec<Option<BinaryClusterNode>> = (0..n).map(|i| Some(BinaryClusterNode::leaf(i))).collect();
    let mut sizes = vec![1.0f64; n];
    let mut active: Vec<usize> = (0..n).collect();

    while active.len() > 1 {
        let (mut best_a, mut best_b) = (0, 1);
        let mut best_d = f64::INFINITY;
        for (ia, &a) in active.iter().enumerate() {
            for &b in &active[ia + 1..] {
                if dist[a][b] < best_d {
                    best_d = dist[a][b];
                    best_a = a;
                    best_b = b;
                }
            }
        }

        for &k in &active {
            if k == best_a || k == best_b {
                continue;
            }
            let d = linkage.update(
                dist[k][best_a],
                dist[k][best_b],
                best_d,
                sizes[best_a],
                sizes[best_b],
                sizes[k],
            );
            dist[k][best_a] = d;
            dist[best_a][k] = d;
        }
        sizes[best_a] += sizes[best_b];
        active.retain(|&k| k != best_b);

        if let (Some(a), Some(b)) = (slots[best_a].take(), slots[best_b].take()) {
            clilog::trace!("merging {:?} and {:?} at {:.4}", a.sidbs, b.sidbs, best_d);
            slots[best_a] = Some(BinaryClusterNode::merge(a, b));
        }
    }

    slots
        .into_iter()
        .flatten()
        .next()
        .unwrap_or_else(|| BinaryClusterNode::leaf(0))
}

/// A cluster in the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidbCluster {
    pub uid: ClusterId,
    /// Sorted SiDB indices inside the cluster.
    pub sidbs: Vec<usize>,
    /// Sorted SiDB indices outside the cluster.
    pub external_sidbs: Vec<usize>,
    pub children: SmallVec<[ClusterId; 2]>,
    pub parent: Option<ClusterId>,
}

impl SidbCluster {
    #[inline]
    pub fn num_sidbs(&self) -> usize {
        self.sidbs.len()
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.children.is_empty()
    }

    /// The SiDB index of a singleton cluster.
    #[inline]
    pub fn singleton_sidb(&self) -> usize {
        debug_assert!(self.is_singleton());
        self.uid
    }
}

/// The cluster hierarchy as an arena indexed by uid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterTree {
    clusters: Vec<SidbCluster>,
    num_sidbs: usize,
}

impl ClusterTree {
    /// Builds the arena from a binary hierarchy over `root.sidbs`.
    ///
    /// A hierarchy of one SiDB gets a composite parent (uid 1) around the
    /// singleton so the top cluster always has children.
    pub fn from_binary(root: &BinaryClusterNode) -> Self {
        let n = root.sidbs.len();
        if n == 0 {
            return Self::default();
        }
        let capacity = if n == 1 { 2 } else { 2 * n - 1 };
        let mut slots: Vec<Option<SidbCluster>> = vec![None; capacity];
        let mut next_uid = n;

        let top = if n == 1 {
            let sidb = root.sidbs[0];
            slots[0] = Some(SidbCluster {
                uid: 0,
                sidbs: vec![sidb],
                external_sidbs: vec![],
                children: SmallVec::new(),
                parent: Some(1),
            });
            slots[1] = Some(SidbCluster {
                uid: 1,
                sidbs: vec![sidb],
                external_sidbs: vec![],
                children: SmallVec::from_slice(&[0]),
                parent: None,
            });
            1
        } else {
            Self::convert(root, n, &mut next_uid, &mut slots)
        };
        debug_assert_eq!(top, capacity - 1);

        Self {
            clusters: slots.into_iter().flatten().collect(),
            num_sidbs: n,
        }
    }

    fn convert(
        node: &BinaryClusterNode,
        n: usize,
        next_uid: &mut usize,
        slots: &mut [Option<SidbCluster>],
    ) -> ClusterId {
        let children: SmallVec<[ClusterId; 2]> = node
            .children
            .iter()
            .map(|c| Self::convert(c, n, next_uid, slots))
            .collect();

        let uid = if children.is_empty() {
            node.sidbs[0]
        } else {
            let uid = *next_uid;
            *next_uid += 1;
            uid
        };
        for &c in &children {
            if let Some(child) = slots[c].as_mut() {
                child.parent = Some(uid);
            }
        }

        let external_sidbs = (0..n)
            .filter(|ix| node.sidbs.binary_search(ix).is_err())
            .collect();
        slots[uid] = Some(SidbCluster {
            uid,
            sidbs: node.sidbs.clone(),
            external_sidbs,
            children,
            parent: None,
        });
        uid
    }

    pub fn build(layout: &SidbLayout, linkage: LinkageMethod) -> Self {
        Self::from_binary(&sidb_cluster_hierarchy(layout, linkage))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Number of clusters in the arena.
    #[inline]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[inline]
    pub fn num_sidbs(&self) -> usize {
        self.num_sidbs
    }

    /// The root; it is always the last cluster created.
    pub fn top(&self) -> Option<ClusterId> {
        self.clusters.len().checked_sub(1)
    }

    #[inline]
    pub fn cluster(&self, uid: ClusterId) -> &SidbCluster {
        &self.clusters[uid]
    }

    pub fn clusters(&self) -> impl Iterator<Item = &SidbCluster> {
        self.clusters.iter()
    }

    /// Uids of the singleton clusters.
    pub fn singletons(&self) -> std::ops::Range<ClusterId> {
        0..self.num_sidbs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SiqadCoord;
    use clap::ValueEnum;

    const ALL_LINKAGES: [LinkageMethod; 5] = [
        LinkageMethod::Complete,
        LinkageMethod::Single,
        LinkageMethod::UnweightedAverage,
        LinkageMethod::WeightedAverage,
        LinkageMethod::MinimumVariance,
    ];

    fn layout(cells: &[(i64, i64, u8)]) -> SidbLayout {
        SidbLayout::from_cells(cells.iter().map(|&c| SiqadCoord::from(c)))
    }

    fn check_tree(tree: &ClusterTree) {
        let n = tree.num_sidbs();
        let top = tree.top().unwrap();
        assert_eq!(tree.cluster(top).sidbs, (0..n).collect::<Vec<_>>());
        assert_eq!(tree.cluster(top).parent, None);
        for c in tree.clusters() {
            assert_eq!(tree.cluster(c.uid).uid, c.uid);
            let mut all: Vec<usize> = c.sidbs.iter().chain(&c.external_sidbs).copied().collect();
            all.sort_unstable();
            assert_eq!(all, (0..n).collect::<Vec<_>>());
            if c.is_singleton() {
                assert_eq!(c.sidbs, vec![c.uid]);
                continue;
            }
            assert!(c.uid >= n);
            let mut union: Vec<usize> = vec![];
            for &ch in &c.children {
                assert!(ch < c.uid);
                assert_eq!(tree.cluster(ch).parent, Some(c.uid));
                union.extend_from_slice(&tree.cluster(ch).sidbs);
            }
            union.sort_unstable();
            // children partition the parent
            assert_eq!(union, c.sidbs);
        }
    }

    #[test]
    fn test_empty_and_single() {
        let empty = sidb_cluster_hierarchy(&SidbLayout::new(), LinkageMethod::default());
        assert!(empty.sidbs.is_empty() && empty.is_leaf());
        assert!(ClusterTree::from_binary(&empty).is_empty());
        assert_eq!(ClusterTree::from_binary(&empty).top(), None);

        let tree = ClusterTree::build(&layout(&[(4, 2, 1)]), LinkageMethod::default());
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.top(), Some(1));
        assert_eq!(tree.cluster(1).children.as_slice(), &[0]);
        assert_eq!(tree.cluster(0).parent, Some(1));
        check_tree(&tree);
    }

    #[test]
    fn test_hierarchy_invariants() {
        let lyt = layout(&[
            (0, 0, 0),
            (3, 0, 0),
            (7, 1, 1),
            (20, 0, 0),
            (22, 2, 1),
            (9, 9, 0),
            (10, 9, 1),
            (-4, 3, 0),
        ]);
        for linkage in ALL_LINKAGES {
            let tree = ClusterTree::build(&lyt, linkage);
            assert_eq!(tree.len(), 2 * lyt.num_cells() - 1);
            check_tree(&tree);
        }
    }

    #[test]
    fn test_close_pairs_merge_first() {
        let lyt = layout(&[(0, 0, 0), (40, 0, 0), (1, 0, 0), (41, 0, 0)]);
        for linkage in ALL_LINKAGES {
            let root = sidb_cluster_hierarchy(&lyt, linkage);
            let mut groups: Vec<Vec<usize>> = root.children.iter().map(|c| c.sidbs.clone()).collect();
            groups.sort();
            assert_eq!(groups, vec![vec![0, 2], vec![1, 3]], "{linkage:?}");
        }
    }

    #[test]
    fn test_linkage_value_names() {
        let names: Vec<String> = LinkageMethod::value_variants()
            .iter()
            .filter_map(|l| l.to_possible_value().map(|v| v.get_name().to_string()))
            .collect();
        assert!(names.contains(&"minimum-variance".to_string()));
        assert_eq!(
            serde_json::to_string(&LinkageMethod::UnweightedAverage).unwrap(),
            "\"unweighted_average\""
        );
    }
}

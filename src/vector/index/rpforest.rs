//! Forest of random-projection trees.
//!
//! Each tree recursively splits the corpus by a hyperplane through two
//! randomly chosen points until a node holds at most `leaf_size` ids.
//! Queries walk every tree best-first, ordered by the smallest hyperplane
//! margin seen on the path, until the candidate budget is spent; candidates
//! are then ranked by exact distance.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::AHashSet;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::simd;
use crate::vector::VectorId;
use crate::vector::core::distance::DistanceMetric;
use crate::vector::index::cancel::CancellationToken;
use crate::vector::index::config::RpForestConfig;
use crate::vector::search::params::{Deadline, SearchParams};
use crate::vector::search::result::{QueryResult, SearchStatus, TopK};
use crate::vector::store::VectorStore;

/// Pops between two deadline checks.
const DEADLINE_CHECK_INTERVAL: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    /// An empty `normal` marks a random split; queries descend both sides.
    Split {
        normal: Vec<f32>,
        offset: f32,
        left: usize,
        right: usize,
    },
    Leaf { ids: Vec<VectorId> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tree {
    /// Arena of nodes; the root is at index 0.
    nodes: Vec<Node>,
}

/// Random-projection forest over a vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpForestIndex {
    metric: DistanceMetric,
    store: VectorStore,
    trees: Vec<Tree>,
    leaf_size: usize,
    search_k: Option<usize>,
}

impl RpForestIndex {
    /// Grow `config.n_trees` trees in parallel. Tree `t` draws from its own
    /// RNG seeded from `seed` and `t`, so the forest is reproducible
    /// regardless of scheduling.
    pub(crate) fn build(
        store: &VectorStore,
        metric: DistanceMetric,
        config: &RpForestConfig,
        seed: u64,
        token: &CancellationToken,
    ) -> Result<Self> {
        let trees = (0..config.n_trees)
            .into_par_iter()
            .map(|t| {
                token.check("tree construction")?;
                let mut rng = StdRng::seed_from_u64(tree_seed(seed, t));
                Ok(grow_tree(store, metric, config.leaf_size, &mut rng))
            })
            .collect::<Result<Vec<_>>>()?;

        let nodes: usize = trees.iter().map(|t| t.nodes.len()).sum();
        log::info!("grew {} trees with {nodes} nodes in total", trees.len());

        Ok(Self {
            metric,
            store: store.clone(),
            trees,
            leaf_size: config.leaf_size,
            search_k: config.search_k,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    pub(crate) fn search(
        &self,
        query: &[f32],
        k: usize,
        params: &SearchParams,
        deadline: Deadline,
    ) -> QueryResult {
        let search_k = params
            .search_k
            .or(self.search_k)
            .unwrap_or_else(|| self.trees.len().saturating_mul(k));

        let mut frontier: BinaryHeap<Frontier> = (0..self.trees.len())
            .map(|tree| Frontier {
                priority: f32::INFINITY,
                tree,
                node: 0,
            })
            .collect();

        let mut seen = AHashSet::new();
        let mut candidates = Vec::new();
        let mut pops = 0usize;
        let mut timed_out = false;

        while candidates.len() < search_k {
            let Some(Frontier {
                priority,
                tree,
                node,
            }) = frontier.pop()
            else {
                break;
            };

            pops += 1;
            if pops % DEADLINE_CHECK_INTERVAL == 0 && deadline.expired() {
                timed_out = true;
                break;
            }

            match &self.trees[tree].nodes[node] {
                Node::Leaf { ids } => {
                    for &id in ids {
                        if seen.insert(id) {
                            candidates.push(id);
                        }
                    }
                }
                Node::Split {
                    normal,
                    offset,
                    left,
                    right,
                } => {
                    let margin = margin(normal, *offset, query);
                    frontier.push(Frontier {
                        priority: priority.min(-margin),
                        tree,
                        node: *left,
                    });
                    frontier.push(Frontier {
                        priority: priority.min(margin),
                        tree,
                        node: *right,
                    });
                }
            }
        }

        if timed_out {
            log::warn!(
                "forest search exceeded its time budget after {} candidates",
                candidates.len()
            );
        }

        let mut top = TopK::new(k);
        for &id in &candidates {
            top.push(id, self.metric.distance_unchecked(query, self.store.row(id)));
        }
        let neighbors = top.into_sorted_vec();

        let status = if timed_out {
            SearchStatus::TimedOut
        } else if neighbors.len() < k {
            SearchStatus::Incomplete
        } else {
            SearchStatus::Complete
        };

        QueryResult {
            neighbors,
            status,
            candidates_examined: candidates.len(),
        }
    }
}

fn tree_seed(seed: u64, tree: usize) -> u64 {
    (seed ^ tree as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[inline]
fn margin(normal: &[f32], offset: f32, point: &[f32]) -> f32 {
    if normal.is_empty() {
        0.0
    } else {
        simd::dot_product(normal, point) + offset
    }
}

fn grow_tree(
    store: &VectorStore,
    metric: DistanceMetric,
    leaf_size: usize,
    rng: &mut StdRng,
) -> Tree {
    let mut nodes = vec![Node::Leaf { ids: Vec::new() }];
    let mut pending: Vec<(usize, Vec<VectorId>)> = vec![(0, (0..store.size()).collect())];

    while let Some((slot, ids)) = pending.pop() {
        if ids.len() <= leaf_size {
            nodes[slot] = Node::Leaf { ids };
            continue;
        }

        let (mut normal, offset) = hyperplane(store, metric, &ids, rng);
        let (mut left, mut right): (Vec<VectorId>, Vec<VectorId>) = ids
            .into_iter()
            .partition(|&id| margin(&normal, offset, store.row(id)) <= 0.0);

        if left.is_empty() || right.is_empty() {
            left.append(&mut right);
            left.shuffle(rng);
            right = left.split_off(left.len() / 2);
            normal.clear();
        }

        let left_slot = nodes.len();
        nodes.push(Node::Leaf { ids: Vec::new() });
        nodes.push(Node::Leaf { ids: Vec::new() });
        nodes[slot] = Node::Split {
            normal,
            offset,
            left: left_slot,
            right: left_slot + 1,
        };

        pending.push((left_slot + 1, right));
        pending.push((left_slot, left));
    }

    Tree { nodes }
}

/// Hyperplane separating two distinct random members of `ids`.
///
/// Euclidean-family splits bisect the segment between the two points;
/// angular splits pass through the origin between their directions.
fn hyperplane(
    store: &VectorStore,
    metric: DistanceMetric,
    ids: &[VectorId],
    rng: &mut StdRng,
) -> (Vec<f32>, f32) {
    let i = rng.random_range(0..ids.len());
    let mut j = rng.random_range(0..ids.len() - 1);
    if j >= i {
        j += 1;
    }
    let a = store.row(ids[i]);
    let b = store.row(ids[j]);

    if metric.is_angular() {
        let norm_a = simd::dot_product(a, a).sqrt().max(f32::MIN_POSITIVE);
        let norm_b = simd::dot_product(b, b).sqrt().max(f32::MIN_POSITIVE);
        let normal = a
            .iter()
            .zip(b)
            .map(|(x, y)| x / norm_a - y / norm_b)
            .collect();
        (normal, 0.0)
    } else {
        let normal: Vec<f32> = a.iter().zip(b).map(|(x, y)| x - y).collect();
        let midpoint: Vec<f32> = a.iter().zip(b).map(|(x, y)| (x + y) * 0.5).collect();
        let offset = -simd::dot_product(&normal, &midpoint);
        (normal, offset)
    }
}

#[derive(Debug, Clone, Copy)]
struct Frontier {
    priority: f32,
    tree: usize,
    node: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.tree.cmp(&self.tree))
            .then_with(|| other.node.cmp(&self.node))
    }
}

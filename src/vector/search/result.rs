//! Query results and the bounded top-k collector that produces them.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::vector::VectorId;

/// One ranked hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Id of the stored vector.
    pub id: VectorId,
    /// Distance to the query under the index metric (smaller is closer).
    pub distance: f32,
}

impl Neighbor {
    pub fn new(id: VectorId, distance: f32) -> Self {
        Self { id, distance }
    }

    /// Total order: distance ascending, then id ascending.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Whether a result covers everything the query asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SearchStatus {
    /// The search ran to completion.
    #[default]
    Complete,
    /// The configured search breadth reached fewer candidates than requested.
    Incomplete,
    /// The time budget expired; the hits are a best-effort partial answer.
    TimedOut,
}

impl SearchStatus {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, SearchStatus::TimedOut)
    }
}

/// Ranked neighbors for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryResult {
    /// Hits sorted by distance ascending, ties by ascending id.
    pub neighbors: Vec<Neighbor>,
    /// Completion status.
    pub status: SearchStatus,
    /// Number of stored vectors whose distance was evaluated.
    pub candidates_examined: usize,
}

impl QueryResult {
    /// Ids of the hits in rank order.
    pub fn ids(&self) -> Vec<VectorId> {
        self.neighbors.iter().map(|n| n.id).collect()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// True unless the search ran to completion.
    pub fn is_partial(&self) -> bool {
        self.status != SearchStatus::Complete
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.iter()
    }
}

#[derive(Debug, Clone, Copy)]
struct Ranked(Neighbor);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.rank_cmp(&other.0)
    }
}

/// Keeps the `k` best neighbors seen so far.
///
/// Backed by a max-heap whose top is the current worst hit. The ordering is
/// total, so the final ranking does not depend on insertion order and
/// collectors filled on different threads can be merged deterministically.
#[derive(Debug, Clone)]
pub(crate) struct TopK {
    k: usize,
    heap: BinaryHeap<Ranked>,
}

impl TopK {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)),
        }
    }

    pub(crate) fn push(&mut self, id: VectorId, distance: f32) {
        if self.k == 0 {
            return;
        }
        let candidate = Ranked(Neighbor::new(id, distance));
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek()
            && candidate < *worst
        {
            self.heap.pop();
            self.heap.push(candidate);
        }
    }

    pub(crate) fn merge(mut self, other: TopK) -> TopK {
        for Ranked(n) in other.heap {
            self.push(n.id, n.distance);
        }
        self
    }

    pub(crate) fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Ranked(n)| n)
            .collect()
    }
}

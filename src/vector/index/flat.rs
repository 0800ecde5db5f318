//! Exhaustive index: every query scans the whole store.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::vector::core::distance::DistanceMetric;
use crate::vector::search::result::{QueryResult, SearchStatus, TopK};
use crate::vector::store::VectorStore;

/// Vectors scanned per parallel work unit.
const SCAN_CHUNK: usize = 1024;

/// Linear-scan index returning exact top-k results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    metric: DistanceMetric,
    store: VectorStore,
}

impl FlatIndex {
    pub(crate) fn build(store: &VectorStore, metric: DistanceMetric) -> Self {
        Self {
            metric,
            store: store.clone(),
        }
    }

    /// Exact top-k. Large stores are scanned in parallel chunks whose
    /// partial results are merged; the merge order does not affect the output.
    pub(crate) fn search(&self, query: &[f32], k: usize) -> QueryResult {
        let vectors = self.store.vectors();

        let top = if vectors.len() > SCAN_CHUNK {
            vectors
                .par_chunks(SCAN_CHUNK)
                .enumerate()
                .map(|(chunk_index, chunk)| {
                    let mut top = TopK::new(k);
                    let base = chunk_index * SCAN_CHUNK;
                    for (offset, vector) in chunk.iter().enumerate() {
                        top.push(
                            base + offset,
                            self.metric.distance_unchecked(query, &vector.data),
                        );
                    }
                    top
                })
                .reduce(|| TopK::new(k), TopK::merge)
        } else {
            let mut top = TopK::new(k);
            for (id, vector) in vectors.iter().enumerate() {
                top.push(id, self.metric.distance_unchecked(query, &vector.data));
            }
            top
        };

        QueryResult {
            neighbors: top.into_sorted_vec(),
            status: SearchStatus::Complete,
            candidates_examined: vectors.len(),
        }
    }
}

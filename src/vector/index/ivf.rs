//! IVF-PQ index: coarse k-means partitions whose members are stored as
//! product-quantized residuals.

pub mod kmeans;
pub mod pq;


use std::borrow::Cow;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use self::kmeans::KMeansParams;
use self::pq::ProductQuantizer;
use crate::error::{AnnflowError, Result};
use crate::util::simd;
use crate::vector::VectorId;
use crate::vector::core::distance::DistanceMetric;
use crate::vector::index::cancel::CancellationToken;
use crate::vector::index::config::IvfPqConfig;
use crate::vector::search::params::{Deadline, SearchParams};
use crate::vector::search::result::{QueryResult, SearchStatus, TopK};
use crate::vector::store::VectorStore;

const ENCODE_CHUNK: usize = 4096;

/// Members of one coarse partition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InvertedList {
    ids: Vec<VectorId>,
    /// `ids.len() * n_subvectors` codes.
    codes: Vec<u8>,
}

/// Inverted-file index with product-quantized residuals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfPqIndex {
    metric: DistanceMetric,
    dimension: usize,
    /// `n_lists * dimension` values.
    centroids: Vec<f32>,
    lists: Vec<InvertedList>,
    pq: ProductQuantizer,
    n_probe: usize,
    refine_factor: usize,
    /// Full-precision vectors, kept only when exact re-ranking is enabled.
    refine_store: Option<VectorStore>,
}

impl IvfPqIndex {
    /// Train the coarse quantizer and the product quantizer over `store`,
    /// then encode every vector into its partition.
    pub(crate) fn build(
        store: &VectorStore,
        metric: DistanceMetric,
        config: &IvfPqConfig,
        seed: u64,
        token: &CancellationToken,
    ) -> Result<Self> {
        let size = store.size();
        let dimension = store.dimension();
        if config.n_clusters > size {
            return Err(AnnflowError::config(format!(
                "Cannot create {} clusters from {size} vectors",
                config.n_clusters
            )));
        }
        if config.codebook_size > size {
            return Err(AnnflowError::config(format!(
                "codebook_size {} exceeds the {size} vectors available for training",
                config.codebook_size
            )));
        }
        if dimension % config.n_subvectors != 0 {
            return Err(AnnflowError::config(format!(
                "dimension {dimension} is not divisible by n_subvectors {}",
                config.n_subvectors
            )));
        }

        // Cosine is served as inner product over unit vectors.
        let source: Cow<'_, VectorStore> = if metric == DistanceMetric::Cosine {
            Cow::Owned(store.normalized())
        } else {
            Cow::Borrowed(store)
        };
        let points: Vec<&[f32]> = source.vectors().iter().map(|v| v.as_slice()).collect();
        let angular = metric.is_angular();

        let coarse_params = KMeansParams {
            k: config.n_clusters,
            max_iterations: config.max_iterations,
            tolerance: 1e-5,
            max_training_points: config.max_training_points,
            seed,
        };
        let centroids = kmeans::train(&points, dimension, &coarse_params, token)?;
        log::info!("trained {} coarse centroids", config.n_clusters);
        token.check("partition assignment")?;

        let assignments: Vec<usize> = points
            .par_iter()
            .map(|p| nearest_list(p, &centroids, dimension, angular))
            .collect();

        let residuals: Vec<Vec<f32>> = points
            .par_iter()
            .zip(assignments.par_iter())
            .map(|(p, &list)| residual(p, list_centroid(&centroids, list, dimension)))
            .collect();
        let residual_refs: Vec<&[f32]> = residuals.iter().map(|r| r.as_slice()).collect();

        let pq = ProductQuantizer::train(
            &residual_refs,
            dimension,
            config.n_subvectors,
            config.codebook_size,
            config.max_iterations,
            config.max_training_points,
            seed,
            token,
        )?;
        log::info!(
            "trained product quantizer: {} subvectors x {} codewords",
            pq.n_subvectors(),
            pq.codebook_size()
        );

        let codes: Vec<Vec<u8>> = residual_refs
            .par_chunks(ENCODE_CHUNK)
            .map(|chunk| -> Result<Vec<Vec<u8>>> {
                token.check("residual encoding")?;
                Ok(chunk.iter().map(|r| pq.encode(r)).collect::<Vec<_>>())
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        let mut lists = vec![InvertedList::default(); config.n_clusters];
        for (id, (&list, code)) in assignments.iter().zip(&codes).enumerate() {
            lists[list].ids.push(id);
            lists[list].codes.extend_from_slice(code);
        }

        let (smallest, largest) = lists
            .iter()
            .map(|l| l.ids.len())
            .fold((usize::MAX, 0), |(lo, hi), n| (lo.min(n), hi.max(n)));
        log::debug!("inverted list sizes: min {smallest}, max {largest}");

        Ok(Self {
            metric,
            dimension,
            centroids,
            lists,
            pq,
            n_probe: config.n_probe.min(config.n_clusters),
            refine_factor: config.refine_factor,
            refine_store: (config.refine_factor > 0).then(|| store.clone()),
        })
    }

    /// Number of inverted lists.
    pub fn n_lists(&self) -> usize {
        self.lists.len()
    }

    /// Sizes of the inverted lists in partition order.
    pub fn list_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(|l| l.ids.len()).collect()
    }

    /// Default number of lists probed per query.
    pub fn n_probe(&self) -> usize {
        self.n_probe
    }

    pub(crate) fn search(
        &self,
        query: &[f32],
        k: usize,
        params: &SearchParams,
        deadline: Deadline,
    ) -> QueryResult {
        let query: Cow<'_, [f32]> = if self.metric == DistanceMetric::Cosine {
            let mut q = query.to_vec();
            normalize_in_place(&mut q);
            Cow::Owned(q)
        } else {
            Cow::Borrowed(query)
        };
        let angular = self.metric.is_angular();

        let n_probe = params.n_probe.unwrap_or(self.n_probe).min(self.lists.len());
        let probes = self.rank_lists(&query, angular, n_probe);

        let refine = self.refine_factor > 0 && self.refine_store.is_some();
        let capacity = if refine {
            k.saturating_mul(self.refine_factor)
        } else {
            k
        };

        let ip_table = angular.then(|| self.pq.inner_product_table(&query));
        let m = self.pq.n_subvectors();
        let mut top = TopK::new(capacity);
        let mut examined = 0;
        let mut timed_out = false;

        for (probe, &(score, list_index)) in probes.iter().enumerate() {
            if probe > 0 && deadline.expired() {
                timed_out = true;
                break;
            }
            let list = &self.lists[list_index];
            if list.ids.is_empty() {
                continue;
            }

            match &ip_table {
                Some(table) => {
                    // score is the negated query-centroid inner product
                    for (id, codes) in list.ids.iter().zip(list.codes.chunks_exact(m)) {
                        top.push(*id, score - self.pq.adc(table, codes));
                    }
                }
                None => {
                    let centroid = list_centroid(&self.centroids, list_index, self.dimension);
                    let table = self.pq.l2_table(&residual(&query, centroid));
                    for (id, codes) in list.ids.iter().zip(list.codes.chunks_exact(m)) {
                        top.push(*id, self.pq.adc(&table, codes));
                    }
                }
            }
            examined += list.ids.len();
        }

        let neighbors = match (&self.refine_store, refine) {
            (Some(store), true) => {
                let mut exact = TopK::new(k);
                for candidate in top.into_sorted_vec() {
                    let distance = self
                        .metric
                        .distance_unchecked(&query, store.row(candidate.id));
                    exact.push(candidate.id, distance);
                }
                exact.into_sorted_vec()
            }
            _ => {
                let mut neighbors = top.into_sorted_vec();
                for n in &mut neighbors {
                    n.distance = self.finish_distance(n.distance);
                }
                neighbors
            }
        };

        if timed_out {
            log::warn!(
                "IVF-PQ search exceeded its time budget after {examined} candidates"
            );
        }

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
            candidates_examined: examined,
        }
    }

    /// Order lists by closeness of their centroid to `query` and keep the
    /// first `n_probe`.
    fn rank_lists(&self, query: &[f32], angular: bool, n_probe: usize) -> Vec<(f32, usize)> {
        let mut scored: Vec<(f32, usize)> = self
            .centroids
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(i, c)| (coarse_score(query, c, angular), i))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(n_probe);
        scored
    }

    /// Map an ADC score onto the metric's distance scale.
    fn finish_distance(&self, score: f32) -> f32 {
        match self.metric {
            DistanceMetric::Euclidean => score.max(0.0).sqrt(),
            DistanceMetric::Cosine => 1.0 + score,
            _ => score,
        }
    }
}

/// Squared L2 for Euclidean, negated inner product for the angular family.
#[inline]
fn coarse_score(point: &[f32], centroid: &[f32], angular: bool) -> f32 {
    if angular {
        -simd::dot_product(point, centroid)
    } else {
        simd::l2_distance_squared(point, centroid)
    }
}

fn nearest_list(point: &[f32], centroids: &[f32], dimension: usize, angular: bool) -> usize {
    let mut best = 0;
    let mut best_score = f32::INFINITY;
    for (i, centroid) in centroids.chunks_exact(dimension).enumerate() {
        let score = coarse_score(point, centroid, angular);
        if score < best_score {
            best_score = score;
            best = i;
        }
    }
    best
}

fn list_centroid(centroids: &[f32], list: usize, dimension: usize) -> &[f32] {
    &centroids[list * dimension..(list + 1) * dimension]
}

fn residual(point: &[f32], centroid: &[f32]) -> Vec<f32> {
    point.iter().zip(centroid).map(|(p, c)| p - c).collect()
}

fn normalize_in_place(values: &mut [f32]) {
    let norm = simd::dot_product(values, values).sqrt();
    if norm > 0.0 {
        for v in values {
            *v /= norm;
        }
    }
}

//! Recall measurement against ground-truth neighbor lists.

use std::path::Path;
use std::time::{Duration, Instant};

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{AnnflowError, Result};
use crate::vector::VectorId;
use crate::vector::core::vector::Vector;
use crate::vector::io;
use crate::vector::search::engine::SearchEngine;
use crate::vector::search::params::SearchParams;
use crate::vector::search::result::QueryResult;

/// True nearest neighbors per query, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    neighbors: Vec<Vec<VectorId>>,
}

impl GroundTruth {
    pub fn new(neighbors: Vec<Vec<VectorId>>) -> Self {
        Self { neighbors }
    }

    /// Read an `.ivecs` ground-truth file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read(path, None)
    }

    /// Read at most `limit` query rows from an `.ivecs` file.
    pub fn load_limit<P: AsRef<Path>>(path: P, limit: usize) -> Result<Self> {
        Self::read(path, Some(limit))
    }

    fn read<P: AsRef<Path>>(path: P, limit: Option<usize>) -> Result<Self> {
        let records = io::read_ivecs(path.as_ref(), limit)?;
        let neighbors = records
            .into_iter()
            .enumerate()
            .map(|(row, ids)| {
                ids.into_iter()
                    .map(|id| {
                        VectorId::try_from(id).map_err(|_| {
                            AnnflowError::format(format!(
                                "negative neighbor id {id} in ground-truth row {row}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "loaded ground truth for {} queries from {}",
            neighbors.len(),
            path.as_ref().display()
        );
        Ok(Self { neighbors })
    }

    /// Neighbor ids of query `query`.
    pub fn ids(&self, query: usize) -> Option<&[VectorId]> {
        self.neighbors.get(query).map(Vec::as_slice)
    }

    pub fn rows(&self) -> &[Vec<VectorId>] {
        &self.neighbors
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

/// Mean recall@`k` of `results` against `truths`.
///
/// Each query scores `|top-k result ids ∩ top-k truth ids| / k`; the batch
/// score is the unweighted mean. An empty batch scores 0.0.
pub fn recall_at_k(results: &[QueryResult], truths: &[Vec<VectorId>], k: usize) -> Result<f64> {
    if k == 0 {
        return Err(AnnflowError::config("recall k must be at least 1"));
    }
    if results.len() != truths.len() {
        return Err(AnnflowError::mismatch(format!(
            "{} results but {} ground-truth rows",
            results.len(),
            truths.len()
        )));
    }
    if results.is_empty() {
        return Ok(0.0);
    }

    let total: f64 = results
        .iter()
        .zip(truths)
        .map(|(result, truth)| {
            let expected: AHashSet<VectorId> = truth.iter().take(k).copied().collect();
            let returned: AHashSet<VectorId> =
                result.neighbors.iter().take(k).map(|n| n.id).collect();
            let hits = returned.intersection(&expected).count();
            hits as f64 / k as f64
        })
        .sum();

    Ok(total / results.len() as f64)
}

/// Outcome of an [`Evaluator`] run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub queries: usize,
    pub k: usize,
    pub recall: f64,
    pub elapsed: Duration,
    pub queries_per_second: f64,
    /// Queries whose result was flagged partial.
    pub partial_results: usize,
}

/// Times a query set through a [`SearchEngine`] and scores its recall.
#[derive(Debug, Clone)]
pub struct Evaluator {
    k: usize,
    request_size: usize,
    params: SearchParams,
}

impl Evaluator {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            request_size: 1,
            params: SearchParams::default(),
        }
    }

    /// Number of queries submitted per batch.
    pub fn with_request_size(mut self, request_size: usize) -> Self {
        self.request_size = request_size;
        self
    }

    pub fn with_params(mut self, params: SearchParams) -> Self {
        self.params = params;
        self
    }

    /// Run every query and compare against `truth`.
    pub fn evaluate(
        &self,
        engine: &SearchEngine,
        queries: &[Vector],
        truth: &GroundTruth,
    ) -> Result<EvaluationReport> {
        if self.request_size == 0 {
            return Err(AnnflowError::config("request_size must be at least 1"));
        }
        if queries.len() != truth.len() {
            return Err(AnnflowError::mismatch(format!(
                "{} queries but {} ground-truth rows",
                queries.len(),
                truth.len()
            )));
        }

        let start = Instant::now();
        let mut results = Vec::with_capacity(queries.len());
        for batch in queries.chunks(self.request_size) {
            if self.request_size == 1 {
                results.push(engine.search_with(&batch[0], self.k, &self.params)?);
            } else {
                results.extend(engine.search_batch(batch, self.k, &self.params)?);
            }
        }
        let elapsed = start.elapsed();

        let recall = recall_at_k(&results, truth.rows(), self.k)?;
        let partial_results = results.iter().filter(|r| r.is_partial()).count();
        let secs = elapsed.as_secs_f64();
        let queries_per_second = if secs > 0.0 {
            queries.len() as f64 / secs
        } else {
            0.0
        };

        log::info!(
            "evaluated {} queries: recall@{} = {:.4}, {:.1} qps",
            queries.len(),
            self.k,
            recall,
            queries_per_second
        );

        Ok(EvaluationReport {
            queries: queries.len(),
            k: self.k,
            recall,
            elapsed,
            queries_per_second,
            partial_results,
        })
    }
}

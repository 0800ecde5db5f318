//! Per-query search parameters.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{AnnflowError, Result};
use crate::vector::core::distance::DistanceMetric;

/// Per-query overrides for an index search.
///
/// Unset fields fall back to the values the index was built with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Number of inverted lists probed by an IVF-PQ index.
    pub n_probe: Option<usize>,
    /// Candidate budget for a random-projection forest.
    pub search_k: Option<usize>,
    /// Wall-clock budget for approximate strategies.
    pub time_budget: Option<Duration>,
    /// Metric the caller expects; must equal the build metric when set.
    pub metric: Option<DistanceMetric>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_probe(mut self, n_probe: usize) -> Self {
        self.n_probe = Some(n_probe);
        self
    }

    pub fn with_search_k(mut self, search_k: usize) -> Self {
        self.search_k = Some(search_k);
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = Some(metric);
        self
    }

    pub(crate) fn validate(&self, build_metric: DistanceMetric) -> Result<()> {
        if let Some(metric) = self.metric
            && metric != build_metric
        {
            return Err(AnnflowError::config(format!(
                "query metric {metric} does not match index metric {build_metric}"
            )));
        }
        if self.n_probe == Some(0) {
            return Err(AnnflowError::config("n_probe must be at least 1"));
        }
        if self.search_k == Some(0) {
            return Err(AnnflowError::config("search_k must be at least 1"));
        }
        Ok(())
    }

    pub(crate) fn deadline(&self) -> Deadline {
        Deadline {
            at: self.time_budget.map(|budget| Instant::now() + budget),
        }
    }
}

/// Point in time after which an approximate search stops early.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    #[cfg(test)]
    pub(crate) fn none() -> Self {
        Self { at: None }
    }

    pub(crate) fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }
}

//! Query front end over the currently published index.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;

use crate::error::{AnnflowError, Result};
use crate::vector::core::vector::Vector;
use crate::vector::index::{Index, IndexBuilder, IndexHandle};
use crate::vector::search::params::SearchParams;
use crate::vector::search::result::QueryResult;
use crate::vector::store::VectorStore;

/// Answers top-K queries against a swappable index.
///
/// Searches take a snapshot of the current [`IndexHandle`] and run without
/// holding the lock, so a concurrent [`publish`](SearchEngine::publish) never
/// blocks on in-flight queries and queries never observe a half-built index.
pub struct SearchEngine {
    current: RwLock<Option<IndexHandle>>,
    default_params: SearchParams,
}

impl SearchEngine {
    /// Create an engine with nothing published yet.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            default_params: SearchParams::default(),
        }
    }

    /// Create an engine serving `index`.
    pub fn with_index(index: Index) -> Self {
        let engine = Self::new();
        engine.publish(Arc::new(index));
        engine
    }

    /// Parameters used by [`search`](SearchEngine::search).
    pub fn with_default_params(mut self, params: SearchParams) -> Self {
        self.default_params = params;
        self
    }

    pub fn default_params(&self) -> &SearchParams {
        &self.default_params
    }

    /// Swap in a finished index, returning the one it replaces.
    pub fn publish(&self, index: IndexHandle) -> Option<IndexHandle> {
        log::info!(
            "publishing {} index ({} vectors, dimension {})",
            index.strategy_name(),
            index.size(),
            index.dimension()
        );
        let mut guard = self.current.write();
        std::mem::replace(&mut *guard, Some(index))
    }

    /// Snapshot of the published index.
    pub fn current(&self) -> Result<IndexHandle> {
        self.current
            .read()
            .clone()
            .ok_or_else(|| AnnflowError::not_found("no index has been published"))
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    /// Build a new index over `store` and publish it.
    ///
    /// The build runs outside the lock; queries keep using the previous
    /// index until the swap. A failed or cancelled build leaves the
    /// published index untouched.
    pub fn rebuild(&self, store: &VectorStore, builder: &IndexBuilder) -> Result<IndexHandle> {
        let index = Arc::new(builder.build(store)?);
        self.publish(index.clone());
        Ok(index)
    }

    /// Top-`k` neighbors of `query` with the engine's default parameters.
    pub fn search(&self, query: &Vector, k: usize) -> Result<QueryResult> {
        self.search_with(query, k, &self.default_params)
    }

    /// Top-`k` neighbors of `query` with explicit parameters.
    pub fn search_with(
        &self,
        query: &Vector,
        k: usize,
        params: &SearchParams,
    ) -> Result<QueryResult> {
        let index = self.current()?;
        let result = index.search(query, k, params)?;
        if result.status.is_timed_out() {
            log::warn!(
                "query timed out after examining {} candidates",
                result.candidates_examined
            );
        }
        Ok(result)
    }

    /// Answer `queries` in parallel against a single index snapshot.
    ///
    /// Results come back in query order. The first failing query fails the
    /// whole batch.
    pub fn search_batch(
        &self,
        queries: &[Vector],
        k: usize,
        params: &SearchParams,
    ) -> Result<Vec<QueryResult>> {
        let index = self.current()?;
        let results = queries
            .par_iter()
            .map(|query| index.search(query, k, params))
            .collect::<Result<Vec<_>>>()?;

        let timed_out = results.iter().filter(|r| r.status.is_timed_out()).count();
        if timed_out > 0 {
            log::warn!("{timed_out} of {} queries timed out", queries.len());
        }
        Ok(results)
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.current.read();
        f.debug_struct("SearchEngine")
            .field("strategy", &guard.as_ref().map(|index| index.strategy_name()))
            .field("size", &guard.as_ref().map(|index| index.size()))
            .field("default_params", &self.default_params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::index::config::{IndexBuildConfig, IndexStrategy, RpForestConfig};

    fn line_store(n: usize) -> VectorStore {
        VectorStore::from_vectors((0..n).map(|i| Vector::new(vec![i as f32, 0.0])).collect())
            .unwrap()
    }

    fn flat_builder() -> IndexBuilder {
        IndexBuilder::new(IndexBuildConfig::default().with_threads(2)).unwrap()
    }

    #[test]
    fn test_search_before_publish() {
        let engine = SearchEngine::new();
        assert!(!engine.is_ready());
        assert!(matches!(
            engine.search(&Vector::new(vec![0.0, 0.0]), 1),
            Err(AnnflowError::NotFound(_))
        ));
    }

    #[test]
    fn test_rebuild_replaces_index() {
        let engine = SearchEngine::new();
        let first = engine.rebuild(&line_store(5), &flat_builder()).unwrap();
        assert_eq!(first.size(), 5);

        let second = engine.rebuild(&line_store(20), &flat_builder()).unwrap();
        assert_eq!(engine.current().unwrap().size(), 20);
        assert!(Arc::ptr_eq(&second, &engine.current().unwrap()));

        // A snapshot taken before the swap keeps answering from the old index.
        let result = first
            .search(&Vector::new(vec![19.0, 0.0]), 1, &SearchParams::default())
            .unwrap();
        assert_eq!(result.ids(), vec![4]);
    }

    #[test]
    fn test_failed_rebuild_keeps_published_index() {
        let engine = SearchEngine::new();
        engine.rebuild(&line_store(5), &flat_builder()).unwrap();

        let forest = IndexBuilder::new(IndexBuildConfig::new(IndexStrategy::RpForest(
            RpForestConfig::default(),
        )))
        .unwrap();
        forest.cancellation_token().cancel();
        assert!(engine.rebuild(&line_store(50), &forest).is_err());
        assert_eq!(engine.current().unwrap().size(), 5);
    }

    #[test]
    fn test_batch_matches_single_queries() {
        let engine = SearchEngine::new();
        engine.rebuild(&line_store(30), &flat_builder()).unwrap();

        let queries: Vec<Vector> = (0..10)
            .map(|i| Vector::new(vec![i as f32 * 3.0 + 0.2, 0.0]))
            .collect();
        let batch = engine
            .search_batch(&queries, 3, &SearchParams::default())
            .unwrap();

        assert_eq!(batch.len(), queries.len());
        for (query, result) in queries.iter().zip(&batch) {
            assert_eq!(result, &engine.search(query, 3).unwrap());
        }
    }

    #[test]
    fn test_batch_propagates_query_errors() {
        let engine = SearchEngine::new();
        engine.rebuild(&line_store(4), &flat_builder()).unwrap();

        let queries = vec![Vector::new(vec![0.0, 0.0]), Vector::new(vec![0.0; 3])];
        assert!(matches!(
            engine.search_batch(&queries, 1, &SearchParams::default()),
            Err(AnnflowError::DimensionMismatch { .. })
        ));
    }
}

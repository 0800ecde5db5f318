//! Approximate nearest-neighbor search over dense vectors.
//!
//! The pipeline runs in one direction:
//!
//! 1. [`store::VectorStore`] holds the corpus with dense ids `0..N`.
//! 2. [`index::IndexBuilder`] turns a store snapshot into an immutable
//!    [`index::Index`] using an exhaustive, IVF-PQ or random-projection
//!    forest strategy.
//! 3. [`search::engine::SearchEngine`] answers top-K queries against the
//!    published index.
//! 4. [`eval`] scores results against ground truth.

pub mod core;
pub mod eval;
pub mod index;
pub mod io;
pub mod search;
pub mod store;

pub use self::core::distance::DistanceMetric;
pub use self::core::vector::Vector;
pub use self::eval::{EvaluationReport, Evaluator, GroundTruth, recall_at_k};
pub use self::index::cancel::CancellationToken;
pub use self::index::config::{IndexBuildConfig, IndexStrategy, IvfPqConfig, RpForestConfig};
pub use self::index::{Index, IndexBuilder, IndexHandle};
pub use self::search::engine::SearchEngine;
pub use self::search::params::SearchParams;
pub use self::search::result::{Neighbor, QueryResult, SearchStatus};
pub use self::store::VectorStore;

use std::sync::Arc;

use crate::error::Result;

/// Dense identifier of a stored vector.
pub type VectorId = usize;

/// Build an index over `vectors` with `config`.
pub fn build(vectors: Vec<Vector>, config: IndexBuildConfig) -> Result<IndexHandle> {
    let store = VectorStore::from_vectors(vectors)?;
    let index = IndexBuilder::new(config)?.build(&store)?;
    Ok(Arc::new(index))
}

/// Top-`k` neighbors of `query` in `index`.
pub fn search(
    index: &IndexHandle,
    query: &Vector,
    k: usize,
    params: &SearchParams,
) -> Result<QueryResult> {
    index.search(query, k, params)
}

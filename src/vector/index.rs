//! Index construction and the immutable [`Index`] it produces.
//!
//! An [`IndexBuilder`] validates an [`IndexBuildConfig`] against a
//! [`VectorStore`] snapshot and runs the selected strategy inside its own
//! worker pool. The finished [`Index`] never changes; a parameter change
//! means building a new one.

pub mod cancel;
pub mod config;
pub mod flat;
pub mod ivf;
pub mod rpforest;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use self::cancel::CancellationToken;
use self::config::{IndexBuildConfig, IndexStrategy};
use self::flat::FlatIndex;
use self::ivf::IvfPqIndex;
use self::rpforest::RpForestIndex;
use crate::error::{AnnflowError, Result};
use crate::vector::core::distance::DistanceMetric;
use crate::vector::core::vector::Vector;
use crate::vector::search::params::SearchParams;
use crate::vector::search::result::QueryResult;
use crate::vector::store::VectorStore;

/// Shared, read-only handle to a built index.
pub type IndexHandle = Arc<Index>;

/// Strategy-specific index structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexKind {
    Flat(FlatIndex),
    IvfPq(IvfPqIndex),
    RpForest(RpForestIndex),
}

/// Immutable nearest-neighbor index over a store snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    config: IndexBuildConfig,
    dimension: usize,
    size: usize,
    kind: IndexKind,
}

impl Index {
    /// Top-`k` neighbors of `query`.
    ///
    /// `k` larger than the index size is clamped to the size. Queries are
    /// normalized when the index was built with normalization.
    pub fn search(&self, query: &Vector, k: usize, params: &SearchParams) -> Result<QueryResult> {
        query.validate_dimension(self.dimension)?;
        if k == 0 {
            return Err(AnnflowError::config("k must be at least 1"));
        }
        if !query.is_valid() {
            return Err(AnnflowError::format(
                "query contains invalid values (NaN or infinity)",
            ));
        }
        params.validate(self.config.metric)?;

        let k = k.min(self.size);
        let normalized;
        let query = if self.config.normalize_vectors {
            normalized = query.normalized();
            normalized.as_slice()
        } else {
            query.as_slice()
        };

        let deadline = params.deadline();
        let result = match &self.kind {
            IndexKind::Flat(index) => index.search(query, k),
            IndexKind::IvfPq(index) => index.search(query, k, params, deadline),
            IndexKind::RpForest(index) => index.search(query, k, params, deadline),
        };
        Ok(result)
    }

    /// Configuration the index was built with.
    pub fn config(&self) -> &IndexBuildConfig {
        &self.config
    }

    pub fn metric(&self) -> DistanceMetric {
        self.config.metric
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn kind(&self) -> &IndexKind {
        &self.kind
    }

    /// Short name of the index family.
    pub fn strategy_name(&self) -> &'static str {
        self.config.strategy.name()
    }

    /// Write the index to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        log::info!(
            "saved {} index ({} vectors) to {}",
            self.strategy_name(),
            self.size,
            path.as_ref().display()
        );
        Ok(())
    }

    /// Read an index written by [`Index::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let index: Index = bincode::deserialize_from(reader)?;
        log::info!(
            "loaded {} index ({} vectors) from {}",
            index.strategy_name(),
            index.size,
            path.as_ref().display()
        );
        Ok(index)
    }
}

/// Builds indexes from store snapshots.
pub struct IndexBuilder {
    config: IndexBuildConfig,
    thread_pool: Arc<ThreadPool>,
    token: CancellationToken,
}

impl IndexBuilder {
    /// Create a builder with its own worker pool of `config.num_threads`.
    pub fn new(config: IndexBuildConfig) -> Result<Self> {
        config.validate()?;
        let thread_pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.num_threads)
                .thread_name(|i| format!("annflow-build-{i}"))
                .build()
                .map_err(|e| AnnflowError::config(format!("Failed to create thread pool: {e}")))?,
        );
        Ok(Self::with_thread_pool(config, thread_pool))
    }

    /// Create a builder that runs on an existing pool.
    pub fn with_thread_pool(config: IndexBuildConfig, thread_pool: Arc<ThreadPool>) -> Self {
        Self {
            config,
            thread_pool,
            token: CancellationToken::new(),
        }
    }

    /// Use `token` to cancel builds started by this builder.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Token that cancels builds started by this builder.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn config(&self) -> &IndexBuildConfig {
        &self.config
    }

    /// Build an index over `store`.
    ///
    /// The store is only read. On cancellation or error nothing is returned
    /// but the error, so no partially built index can escape.
    pub fn build(&self, store: &VectorStore) -> Result<Index> {
        self.config.validate()?;
        if store.is_empty() {
            return Err(AnnflowError::config("cannot build an index over an empty store"));
        }
        if store.dimension() == 0 {
            return Err(AnnflowError::config(
                "cannot build an index over zero-dimension vectors",
            ));
        }
        self.token.check("setup")?;

        let start = Instant::now();
        log::info!(
            "building {} index over {} vectors (dimension {}, metric {}, seed {})",
            self.config.strategy,
            store.size(),
            store.dimension(),
            self.config.metric,
            self.config.seed
        );

        let working = if self.config.normalize_vectors {
            store.normalized()
        } else {
            store.clone()
        };

        let metric = self.config.metric;
        let seed = self.config.seed;
        let token = &self.token;
        let kind = self.thread_pool.install(|| -> Result<IndexKind> {
            Ok(match &self.config.strategy {
                IndexStrategy::Flat => IndexKind::Flat(FlatIndex::build(&working, metric)),
                IndexStrategy::IvfPq(params) => {
                    IndexKind::IvfPq(IvfPqIndex::build(&working, metric, params, seed, token)?)
                }
                IndexStrategy::RpForest(params) => IndexKind::RpForest(RpForestIndex::build(
                    &working, metric, params, seed, token,
                )?),
            })
        })?;
        self.token.check("finalization")?;

        log::info!(
            "built {} index in {:.1} ms",
            self.config.strategy.name(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Index {
            config: self.config.clone(),
            dimension: store.dimension(),
            size: store.size(),
            kind,
        })
    }
}

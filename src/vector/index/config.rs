//! Configuration types for index construction.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnnflowError, Result};
use crate::vector::core::distance::DistanceMetric;

/// Largest codebook a product quantizer supports (codes are stored as `u8`).
pub const MAX_CODEBOOK_SIZE: usize = 256;

/// Configuration for building an index over a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexBuildConfig {
    /// Distance metric, fixed for the lifetime of the index.
    pub metric: DistanceMetric,
    /// L2-normalize stored vectors and queries.
    pub normalize_vectors: bool,
    /// Seed for every randomized step of the build.
    pub seed: u64,
    /// Index family and its parameters.
    pub strategy: IndexStrategy,
    /// Size of the worker pool used during the build.
    pub num_threads: usize,
}

impl Default for IndexBuildConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Euclidean,
            normalize_vectors: false,
            seed: 42,
            strategy: IndexStrategy::default(),
            num_threads: num_cpus::get(),
        }
    }
}

impl IndexBuildConfig {
    /// Create a config for `strategy` with default settings otherwise.
    pub fn new(strategy: IndexStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize_vectors = normalize;
        self
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Check parameters that do not depend on the store.
    pub fn validate(&self) -> Result<()> {
        if self.num_threads == 0 {
            return Err(AnnflowError::config("num_threads must be at least 1"));
        }
        match &self.strategy {
            IndexStrategy::Flat => Ok(()),
            IndexStrategy::IvfPq(params) => {
                if !self.metric.supports_quantization() {
                    return Err(AnnflowError::config(format!(
                        "IVF-PQ does not support the {} metric",
                        self.metric
                    )));
                }
                params.validate()
            }
            IndexStrategy::RpForest(params) => params.validate(),
        }
    }
}

/// Index family selected for a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexStrategy {
    /// Exhaustive linear scan, exact results.
    #[default]
    Flat,
    /// Coarse k-means partitions with product-quantized residuals.
    IvfPq(IvfPqConfig),
    /// Forest of random-projection trees.
    RpForest(RpForestConfig),
}

impl IndexStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            IndexStrategy::Flat => "flat",
            IndexStrategy::IvfPq(_) => "ivf_pq",
            IndexStrategy::RpForest(_) => "rp_forest",
        }
    }
}

impl fmt::Display for IndexStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexStrategy::Flat => write!(f, "Flat"),
            IndexStrategy::IvfPq(p) => {
                if p.codebook_size == MAX_CODEBOOK_SIZE {
                    write!(f, "IVF{},PQ{}", p.n_clusters, p.n_subvectors)
                } else if p.codebook_size.is_power_of_two() {
                    let bits = p.codebook_size.trailing_zeros();
                    write!(f, "IVF{},PQ{}x{bits}", p.n_clusters, p.n_subvectors)
                } else {
                    // Not expressible as a factory key.
                    write!(
                        f,
                        "IVF{},PQ{} ({} codewords)",
                        p.n_clusters, p.n_subvectors, p.codebook_size
                    )
                }
            }
            IndexStrategy::RpForest(p) => write!(f, "RP{}", p.n_trees),
        }
    }
}

/// Parses factory strings such as `"Flat"`, `"IVF10,PQ4"`, `"IVF64,PQ8x6"`
/// or `"RP10"`.
impl FromStr for IndexStrategy {
    type Err = AnnflowError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim();
        if key.eq_ignore_ascii_case("flat") {
            return Ok(IndexStrategy::Flat);
        }

        if let Some(trees) = key.strip_prefix("RP") {
            let n_trees = parse_count(trees, key)?;
            return Ok(IndexStrategy::RpForest(RpForestConfig {
                n_trees,
                ..RpForestConfig::default()
            }));
        }

        if let Some(rest) = key.strip_prefix("IVF")
            && let Some((clusters, pq)) = rest.split_once(',')
            && let Some(pq) = pq.trim().strip_prefix("PQ")
        {
            let n_clusters = parse_count(clusters, key)?;
            let (subvectors, codebook_size) = match pq.split_once('x') {
                Some((m, bits)) => {
                    let bits = parse_count(bits, key)?;
                    if bits > 8 {
                        return Err(AnnflowError::config(format!(
                            "PQ codes wider than 8 bits are not supported: {key}"
                        )));
                    }
                    (m, 1usize << bits)
                }
                None => (pq, MAX_CODEBOOK_SIZE),
            };
            return Ok(IndexStrategy::IvfPq(IvfPqConfig {
                n_clusters,
                n_subvectors: parse_count(subvectors, key)?,
                codebook_size,
                ..IvfPqConfig::default()
            }));
        }

        Err(AnnflowError::config(format!("Unknown index key: {key}")))
    }
}

fn parse_count(value: &str, key: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| AnnflowError::config(format!("Invalid number {value:?} in index key {key}")))
}

/// Parameters for the IVF-PQ strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IvfPqConfig {
    /// Number of coarse partitions (inverted lists).
    pub n_clusters: usize,
    /// Number of subvectors each residual is split into.
    pub n_subvectors: usize,
    /// Centroids per subvector codebook, at most 256.
    pub codebook_size: usize,
    /// Lists probed per query unless overridden.
    pub n_probe: usize,
    /// Re-rank `k * refine_factor` ADC candidates exactly; 0 disables.
    pub refine_factor: usize,
    /// Upper bound on Lloyd iterations for every k-means run.
    pub max_iterations: usize,
    /// Training sample cap per k-means run; 0 trains on everything.
    pub max_training_points: usize,
}

impl Default for IvfPqConfig {
    fn default() -> Self {
        Self {
            n_clusters: 10,
            n_subvectors: 4,
            codebook_size: MAX_CODEBOOK_SIZE,
            n_probe: 1,
            refine_factor: 0,
            max_iterations: 25,
            max_training_points: 65_536,
        }
    }
}

impl IvfPqConfig {
    fn validate(&self) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(AnnflowError::config("n_clusters must be at least 1"));
        }
        if self.n_subvectors == 0 {
            return Err(AnnflowError::config("n_subvectors must be at least 1"));
        }
        if self.codebook_size == 0 || self.codebook_size > MAX_CODEBOOK_SIZE {
            return Err(AnnflowError::config(format!(
                "codebook_size must be in 1..={MAX_CODEBOOK_SIZE}, got {}",
                self.codebook_size
            )));
        }
        if self.n_probe == 0 {
            return Err(AnnflowError::config("n_probe must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(AnnflowError::config("max_iterations must be at least 1"));
        }
        Ok(())
    }
}

/// Parameters for the random-projection forest strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpForestConfig {
    /// Number of trees.
    pub n_trees: usize,
    /// Maximum number of ids in a leaf.
    pub leaf_size: usize,
    /// Candidate budget per query; `None` means `n_trees * k`.
    pub search_k: Option<usize>,
}

impl Default for RpForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 10,
            leaf_size: 32,
            search_k: None,
        }
    }
}

impl RpForestConfig {
    fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(AnnflowError::config("n_trees must be at least 1"));
        }
        if self.leaf_size == 0 {
            return Err(AnnflowError::config("leaf_size must be at least 1"));
        }
        if self.search_k == Some(0) {
            return Err(AnnflowError::config("search_k must be at least 1"));
        }
        Ok(())
    }
}

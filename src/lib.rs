//! # annflow
//!
//! Approximate nearest-neighbor indexing and search for SIFT-style vector
//! datasets, with recall evaluation against ground truth.
//!
//! ## Features
//!
//! - Streaming `.fvecs` / `.ivecs` readers
//! - Exhaustive, IVF-PQ and random-projection forest indexes
//! - Deterministic, parallel and cancellable index builds
//! - Atomic index publication for concurrent queries
//! - Recall@K and throughput evaluation
//!
//! ```
//! use annflow::prelude::*;
//!
//! let vectors = vec![
//!     Vector::new(vec![0.0, 0.0]),
//!     Vector::new(vec![1.0, 0.0]),
//!     Vector::new(vec![0.0, 1.0]),
//!     Vector::new(vec![10.0, 10.0]),
//! ];
//! let index = annflow::vector::build(vectors, IndexBuildConfig::default())?;
//! let result = annflow::vector::search(
//!     &index,
//!     &Vector::new(vec![0.0, 0.0]),
//!     2,
//!     &SearchParams::default(),
//! )?;
//! assert_eq!(result.ids(), vec![0, 1]);
//! # Ok::<(), annflow::error::AnnflowError>(())
//! ```

pub mod error;
pub mod util;
pub mod vector;

pub mod prelude {
    pub use crate::error::{AnnflowError, Result};
    pub use crate::vector::{
        DistanceMetric, Index, IndexBuildConfig, IndexBuilder, IndexHandle, IndexStrategy,
        QueryResult, SearchEngine, SearchParams, SearchStatus, Vector, VectorStore,
    };
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

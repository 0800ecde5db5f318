//! Distance metrics for vector similarity calculation.
//!
//! Every metric is expressed as a distance where smaller means closer. For
//! the inner-product family this is the negated similarity, so a single
//! ascending ordering serves all metrics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnnflowError, Result};
use crate::util::simd;

/// Distance metrics for vector similarity calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean (L2) distance.
    #[default]
    Euclidean,
    /// Negated inner product (higher dot product is closer).
    InnerProduct,
    /// Cosine distance (1 - cosine similarity).
    Cosine,
    /// Manhattan (L1) distance.
    Manhattan,
}

impl DistanceMetric {
    /// Calculate the distance between two vectors using this metric.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(AnnflowError::dimension_mismatch(a.len(), b.len()));
        }
        Ok(self.distance_unchecked(a, b))
    }

    /// Distance without the dimension check. Slices must have equal length.
    #[inline]
    pub(crate) fn distance_unchecked(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => simd::l2_distance_squared(a, b).sqrt(),
            DistanceMetric::InnerProduct => -simd::dot_product(a, b),
            DistanceMetric::Cosine => {
                let dot = simd::dot_product(a, b);
                let norm_a = simd::dot_product(a, a).sqrt();
                let norm_b = simd::dot_product(b, b).sqrt();

                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (norm_a * norm_b)
                }
            }
            DistanceMetric::Manhattan => simd::l1_distance(a, b),
        }
    }

    /// Whether this metric belongs to the inner-product family.
    pub fn is_angular(&self) -> bool {
        matches!(self, DistanceMetric::InnerProduct | DistanceMetric::Cosine)
    }

    /// Whether residual product quantization can approximate this metric.
    pub fn supports_quantization(&self) -> bool {
        !matches!(self, DistanceMetric::Manhattan)
    }

    /// Get the name of this distance metric.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::InnerProduct => "inner_product",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Manhattan => "manhattan",
        }
    }

    /// Parse a distance metric from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "inner_product" | "ip" | "dot" | "dot_product" => Ok(DistanceMetric::InnerProduct),
            "cosine" | "angular" => Ok(DistanceMetric::Cosine),
            "manhattan" | "l1" => Ok(DistanceMetric::Manhattan),
            _ => Err(AnnflowError::config(format!("Unknown distance metric: {s}"))),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = AnnflowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_str(s)
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

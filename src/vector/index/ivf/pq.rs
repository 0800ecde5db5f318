//! Product quantization of residual vectors.
//!
//! A vector of dimension `d` is split into `m` contiguous subvectors of
//! `d / m` components; each subvector is replaced by the index of its
//! nearest codeword in that subspace's codebook. Distances between a query
//! and a code are computed asymmetrically (ADC): a per-query table of
//! query-subvector-to-codeword distances is built once and every code costs
//! `m` table lookups.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::kmeans::{self, KMeansParams};
use crate::error::{AnnflowError, Result};
use crate::util::simd;
use crate::vector::index::cancel::CancellationToken;
use crate::vector::index::config::MAX_CODEBOOK_SIZE;

/// Trained product quantizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductQuantizer {
    dimension: usize,
    n_subvectors: usize,
    sub_dimension: usize,
    codebook_size: usize,
    /// Codewords laid out as `[subvector][codeword][component]`.
    codebooks: Vec<f32>,
}

impl ProductQuantizer {
    /// Train one codebook per subspace. Subspaces train in parallel, each
    /// with a seed derived from `seed` and its position.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn train(
        points: &[&[f32]],
        dimension: usize,
        n_subvectors: usize,
        codebook_size: usize,
        max_iterations: usize,
        max_training_points: usize,
        seed: u64,
        token: &CancellationToken,
    ) -> Result<Self> {
        if n_subvectors == 0 || dimension % n_subvectors != 0 {
            return Err(AnnflowError::config(format!(
                "dimension {dimension} is not divisible by n_subvectors {n_subvectors}"
            )));
        }
        if codebook_size == 0 || codebook_size > MAX_CODEBOOK_SIZE {
            return Err(AnnflowError::config(format!(
                "codebook_size must be in 1..={MAX_CODEBOOK_SIZE}, got {codebook_size}"
            )));
        }
        let sub_dimension = dimension / n_subvectors;

        let codebooks: Vec<Vec<f32>> = (0..n_subvectors)
            .into_par_iter()
            .map(|subspace| {
                token.check("product quantizer training")?;
                let range = subspace * sub_dimension..(subspace + 1) * sub_dimension;
                let sub_points: Vec<&[f32]> =
                    points.iter().map(|p| &p[range.clone()]).collect();
                let params = KMeansParams {
                    k: codebook_size,
                    max_iterations,
                    tolerance: 1e-5,
                    max_training_points,
                    seed: seed.wrapping_add(subspace as u64 + 1),
                };
                kmeans::train(&sub_points, sub_dimension, &params, token)
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            dimension,
            n_subvectors,
            sub_dimension,
            codebook_size,
            codebooks: codebooks.concat(),
        })
    }

    pub fn n_subvectors(&self) -> usize {
        self.n_subvectors
    }

    pub fn codebook_size(&self) -> usize {
        self.codebook_size
    }

    fn codebook(&self, subspace: usize) -> &[f32] {
        let width = self.codebook_size * self.sub_dimension;
        &self.codebooks[subspace * width..(subspace + 1) * width]
    }

    fn subvector<'a>(&self, vector: &'a [f32], subspace: usize) -> &'a [f32] {
        &vector[subspace * self.sub_dimension..(subspace + 1) * self.sub_dimension]
    }

    /// Encode a vector into `n_subvectors` codes.
    pub fn encode(&self, vector: &[f32]) -> Vec<u8> {
        debug_assert_eq!(vector.len(), self.dimension);
        (0..self.n_subvectors)
            .map(|s| {
                kmeans::nearest(
                    self.subvector(vector, s),
                    self.codebook(s),
                    self.sub_dimension,
                ) as u8
            })
            .collect()
    }

    /// Reconstruct the approximate vector a code stands for.
    pub fn decode(&self, codes: &[u8]) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dimension);
        for (s, &code) in codes.iter().enumerate() {
            let start = code as usize * self.sub_dimension;
            vector.extend_from_slice(&self.codebook(s)[start..start + self.sub_dimension]);
        }
        vector
    }

    /// ADC table of squared L2 distances, `[subvector][codeword]`.
    pub(crate) fn l2_table(&self, query: &[f32]) -> Vec<f32> {
        self.table(query, simd::l2_distance_squared)
    }

    /// ADC table of inner products, `[subvector][codeword]`.
    pub(crate) fn inner_product_table(&self, query: &[f32]) -> Vec<f32> {
        self.table(query, simd::dot_product)
    }

    fn table(&self, query: &[f32], kernel: fn(&[f32], &[f32]) -> f32) -> Vec<f32> {
        let mut table = Vec::with_capacity(self.n_subvectors * self.codebook_size);
        for s in 0..self.n_subvectors {
            let sub_query = self.subvector(query, s);
            table.extend(
                self.codebook(s)
                    .chunks_exact(self.sub_dimension)
                    .map(|codeword| kernel(sub_query, codeword)),
            );
        }
        table
    }

    /// Sum of table entries selected by `codes`.
    #[inline]
    pub(crate) fn adc(&self, table: &[f32], codes: &[u8]) -> f32 {
        codes
            .iter()
            .enumerate()
            .map(|(s, &code)| table[s * self.codebook_size + code as usize])
            .sum()
    }
}

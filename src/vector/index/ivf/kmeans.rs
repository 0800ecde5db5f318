//! Seeded k-means clustering used for coarse partitions and PQ codebooks.

use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::error::{AnnflowError, Result};
use crate::util::simd;
use crate::vector::index::cancel::CancellationToken;

const PARALLEL_THRESHOLD: usize = 1000;

/// Parameters of one k-means run.
#[derive(Debug, Clone)]
pub(crate) struct KMeansParams {
    pub k: usize,
    pub max_iterations: usize,
    pub tolerance: f32,
    pub max_training_points: usize,
    pub seed: u64,
}

/// Train `k` centroids over `points` with k-means++ seeding and Lloyd
/// iterations under squared L2.
///
/// Returns the centroids flattened as `k * dimension` values. The result
/// depends only on the points and `params.seed`.
pub(crate) fn train(
    points: &[&[f32]],
    dimension: usize,
    params: &KMeansParams,
    token: &CancellationToken,
) -> Result<Vec<f32>> {
    if params.k == 0 || points.len() < params.k {
        return Err(AnnflowError::config(format!(
            "Cannot create {} clusters from {} points",
            params.k,
            points.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let sample = training_sample(points, params, &mut rng);

    let mut centroids = init_plus_plus(&sample, dimension, params.k, &mut rng);

    for iteration in 0..params.max_iterations {
        token.check("k-means training")?;

        let assignments = assign(&sample, &centroids, dimension);
        let shift = update(&sample, &assignments, &mut centroids, dimension, params.k);

        log::debug!(
            "k-means iteration {} (k={}, points={}): mean shift {shift:.6}",
            iteration + 1,
            params.k,
            sample.len()
        );
        if shift < params.tolerance {
            log::debug!("k-means converged after {} iterations", iteration + 1);
            break;
        }
    }

    Ok(centroids)
}

/// Index of the centroid nearest to `point` under squared L2.
pub(crate) fn nearest(point: &[f32], centroids: &[f32], dimension: usize) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, centroid) in centroids.chunks_exact(dimension).enumerate() {
        let distance = simd::l2_distance_squared(point, centroid);
        if distance < best_distance {
            best_distance = distance;
            best = i;
        }
    }
    best
}

fn training_sample<'a>(
    points: &[&'a [f32]],
    params: &KMeansParams,
    rng: &mut StdRng,
) -> Vec<&'a [f32]> {
    let cap = params.max_training_points.max(params.k);
    if params.max_training_points == 0 || points.len() <= cap {
        return points.to_vec();
    }
    let mut indices: Vec<usize> = (0..points.len()).collect();
    indices.shuffle(rng);
    indices.truncate(cap);
    indices.sort_unstable();
    indices.into_iter().map(|i| points[i]).collect()
}

fn init_plus_plus(points: &[&[f32]], dimension: usize, k: usize, rng: &mut StdRng) -> Vec<f32> {
    let mut centroids = Vec::with_capacity(k * dimension);
    let first = rng.random_range(0..points.len());
    centroids.extend_from_slice(points[first]);

    let mut min_distances: Vec<f32> = points
        .iter()
        .map(|p| simd::l2_distance_squared(p, points[first]))
        .collect();

    for _ in 1..k {
        let total: f64 = min_distances.iter().map(|&d| d as f64).sum();

        let chosen = if total <= 0.0 {
            rng.random_range(0..points.len())
        } else {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut chosen = points.len() - 1;
            for (i, &d) in min_distances.iter().enumerate() {
                cumulative += d as f64;
                if d > 0.0 && cumulative >= target {
                    chosen = i;
                    break;
                }
            }
            chosen
        };

        let centroid = points[chosen];
        centroids.extend_from_slice(centroid);
        for (min_distance, point) in min_distances.iter_mut().zip(points) {
            *min_distance = min_distance.min(simd::l2_distance_squared(point, centroid));
        }
    }

    debug_assert_eq!(centroids.len(), k * dimension);
    centroids
}

fn assign(points: &[&[f32]], centroids: &[f32], dimension: usize) -> Vec<usize> {
    if points.len() > PARALLEL_THRESHOLD {
        points
            .par_iter()
            .map(|p| nearest(p, centroids, dimension))
            .collect()
    } else {
        points
            .iter()
            .map(|p| nearest(p, centroids, dimension))
            .collect()
    }
}

/// Move each centroid to the mean of its points and return the mean shift.
/// Centroids left without points keep their previous position.
fn update(
    points: &[&[f32]],
    assignments: &[usize],
    centroids: &mut [f32],
    dimension: usize,
    k: usize,
) -> f32 {
    let mut sums = vec![0.0f64; k * dimension];
    let mut counts = vec![0usize; k];

    for (point, &cluster) in points.iter().zip(assignments) {
        counts[cluster] += 1;
        let sum = &mut sums[cluster * dimension..(cluster + 1) * dimension];
        for (s, &v) in sum.iter_mut().zip(point.iter()) {
            *s += v as f64;
        }
    }

    let mut total_shift = 0.0f32;
    for cluster in 0..k {
        if counts[cluster] == 0 {
            continue;
        }
        let centroid = &mut centroids[cluster * dimension..(cluster + 1) * dimension];
        let sum = &sums[cluster * dimension..(cluster + 1) * dimension];
        let mut moved = 0.0f32;
        for (c, &s) in centroid.iter_mut().zip(sum) {
            let updated = (s / counts[cluster] as f64) as f32;
            moved += (updated - *c) * (updated - *c);
            *c = updated;
        }
        total_shift += moved.sqrt();
    }

    total_shift / k as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(k: usize, seed: u64) -> KMeansParams {
        KMeansParams {
            k,
            max_iterations: 50,
            tolerance: 1e-6,
            max_training_points: 0,
            seed,
        }
    }

    fn two_blobs() -> Vec<Vec<f32>> {
        let mut points = Vec::new();
        for i in 0..20 {
            let jitter = i as f32 * 0.01;
            points.push(vec![0.0 + jitter, 0.0 - jitter]);
            points.push(vec![10.0 - jitter, 10.0 + jitter]);
        }
        points
    }

    #[test]
    fn test_separates_blobs() {
        let data = two_blobs();
        let points: Vec<&[f32]> = data.iter().map(|p| p.as_slice()).collect();
        let centroids = train(&points, 2, &params(2, 7), &CancellationToken::new()).unwrap();

        let a = nearest(&[0.0, 0.0], &centroids, 2);
        let b = nearest(&[10.0, 10.0], &centroids, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_same_seed_same_centroids() {
        let data = two_blobs();
        let points: Vec<&[f32]> = data.iter().map(|p| p.as_slice()).collect();
        let token = CancellationToken::new();
        let first = train(&points, 2, &params(3, 11), &token).unwrap();
        let second = train(&points, 2, &params(3, 11), &token).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_too_many_clusters() {
        let data = two_blobs();
        let points: Vec<&[f32]> = data.iter().map(|p| p.as_slice()).collect();
        let result = train(&points, 2, &params(41, 0), &CancellationToken::new());
        assert!(matches!(result, Err(AnnflowError::Config(_))));
    }

    #[test]
    fn test_cancelled() {
        let data = two_blobs();
        let points: Vec<&[f32]> = data.iter().map(|p| p.as_slice()).collect();
        let token = CancellationToken::new();
        token.cancel();
        let result = train(&points, 2, &params(2, 0), &token);
        assert!(matches!(result, Err(AnnflowError::Cancelled(_))));
    }
}

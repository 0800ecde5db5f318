//! Vector kernels using the `wide` crate for true vectorization.
//!
//! Inputs are processed eight lanes at a time with `f32x8`; the tail that
//! does not fill a full lane group falls back to scalar code. Both kernels
//! assume equal-length slices; callers validate dimensions beforehand.

use wide::f32x8;

const LANES: usize = 8;

#[inline(always)]
fn load(chunk: &[f32]) -> f32x8 {
    let mut lanes = [0.0f32; LANES];
    lanes.copy_from_slice(chunk);
    f32x8::from(lanes)
}

/// Squared Euclidean distance between two slices.
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let chunks_a = a.chunks_exact(LANES);
    let chunks_b = b.chunks_exact(LANES);
    let tail: f32 = chunks_a
        .remainder()
        .iter()
        .zip(chunks_b.remainder())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();

    let mut acc = f32x8::ZERO;
    for (ca, cb) in chunks_a.zip(chunks_b) {
        let diff = load(ca) - load(cb);
        acc = acc + diff * diff;
    }

    acc.reduce_add() + tail
}

/// Dot product of two slices.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let chunks_a = a.chunks_exact(LANES);
    let chunks_b = b.chunks_exact(LANES);
    let tail: f32 = chunks_a
        .remainder()
        .iter()
        .zip(chunks_b.remainder())
        .map(|(x, y)| x * y)
        .sum();

    let mut acc = f32x8::ZERO;
    for (ca, cb) in chunks_a.zip(chunks_b) {
        acc = acc + load(ca) * load(cb);
    }

    acc.reduce_add() + tail
}

/// Manhattan (L1) distance between two slices.
#[inline]
pub fn l1_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let chunks_a = a.chunks_exact(LANES);
    let chunks_b = b.chunks_exact(LANES);
    let tail: f32 = chunks_a
        .remainder()
        .iter()
        .zip(chunks_b.remainder())
        .map(|(x, y)| (x - y).abs())
        .sum();

    let mut acc = f32x8::ZERO;
    for (ca, cb) in chunks_a.zip(chunks_b) {
        acc = acc + (load(ca) - load(cb)).abs();
    }

    acc.reduce_add() + tail
}

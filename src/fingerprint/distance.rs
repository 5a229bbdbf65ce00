//! Fingerprint distance metrics
//!
//! Five metrics trading speed for accuracy:
//!
//! | Metric | Cost | Uses |
//! |--------|------|------|
//! | [`distance_fast`] | O(1) | summary fields only |
//! | [`distance_pyramid`] | O(20) | spatial pyramids |
//! | [`distance_full`] | O(n) | per-macroblock arrays |
//! | [`cosine_similarity`] | O(n) | luma DC direction |
//! | [`hamming_distance`] | O(n) | luma DC sign pattern |
//!
//! All metrics are symmetric. Comparing fingerprints with different
//! macroblock grids yields the metric's sentinel: `f32::MAX` for the
//! distances, `0.0` for cosine, `u32::MAX` for Hamming.

use super::Fingerprint;

/// Default similarity threshold for [`is_similar`]
pub const SIMILARITY_THRESHOLD: f32 = 0.8;

/// O(1) weighted L1 distance over the summary fields
pub fn distance_fast(a: &Fingerprint, b: &Fingerprint) -> f32 {
    if !a.same_grid(b) {
        return f32::MAX;
    }

    0.5 * (a.qp_avg as f32 - b.qp_avg as f32).abs()
        + 50.0 * (a.skip_ratio - b.skip_ratio).abs()
        + 30.0 * (a.intra_ratio - b.intra_ratio).abs()
        + 0.1 * (a.dc_mean as f32 - b.dc_mean as f32).abs()
        + 0.5 * (a.dc_std - b.dc_std).abs()
        + 20.0 * (a.edge_density - b.edge_density).abs()
}

/// O(20) Euclidean distance over the two pyramid levels, the coarse level
/// weighted double
pub fn distance_pyramid(a: &Fingerprint, b: &Fingerprint) -> f32 {
    if !a.same_grid(b) {
        return f32::MAX;
    }

    let sq2: f64 = a
        .pyramid_2x2
        .iter()
        .zip(b.pyramid_2x2.iter())
        .map(|(&x, &y)| {
            let d = (x - y) as f64;
            d * d
        })
        .sum();
    let sq4: f64 = a
        .pyramid_4x4
        .iter()
        .zip(b.pyramid_4x4.iter())
        .map(|(&x, &y)| {
            let d = (x - y) as f64;
            d * d
        })
        .sum();

    (2.0 * sq2.sqrt() + sq4.sqrt()) as f32
}

/// O(n) distance over the per-macroblock arrays: type mismatches, DC
/// differences, and intra-mode mismatches
pub fn distance_full(a: &Fingerprint, b: &Fingerprint) -> f32 {
    if !a.same_grid(b) {
        return f32::MAX;
    }

    let n = a.num_mbs();
    if n == 0 {
        return 0.0;
    }

    let mut type_mismatches = 0u32;
    let mut mode_mismatches = 0u32;
    let mut dc_diff = 0f64;

    for i in 0..n {
        if a.mb_types[i] != b.mb_types[i] {
            type_mismatches += 1;
        }
        if a.intra_modes[i] != b.intra_modes[i] {
            mode_mismatches += 1;
        }
        dc_diff += (a.dc_luma[i] as f64 - b.dc_luma[i] as f64).abs()
            + 0.5 * (a.dc_cb[i] as f64 - b.dc_cb[i] as f64).abs()
            + 0.5 * (a.dc_cr[i] as f64 - b.dc_cr[i] as f64).abs();
    }

    let n = n as f64;
    (100.0 * (type_mismatches as f64 / n) + 0.5 * (dc_diff / n) + 20.0 * (mode_mismatches as f64 / n))
        as f32
}

/// O(n) cosine similarity of the luma DC vectors
///
/// Returns 0 when either vector has zero magnitude or the grids differ.
pub fn cosine_similarity(a: &Fingerprint, b: &Fingerprint) -> f32 {
    if !a.same_grid(b) {
        return 0.0;
    }

    let mut dot = 0f64;
    let mut mag_a = 0f64;
    let mut mag_b = 0f64;
    for (&x, &y) in a.dc_luma.iter().zip(b.dc_luma.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    (dot / (mag_a.sqrt() * mag_b.sqrt())) as f32
}

/// O(n) Hamming distance between the luma DC sign patterns
///
/// Each macroblock contributes bit 1 iff its luma DC exceeds the
/// fingerprint's own dc_mean; the distance is the XOR popcount.
pub fn hamming_distance(a: &Fingerprint, b: &Fingerprint) -> u32 {
    if !a.same_grid(b) {
        return u32::MAX;
    }

    let mut distance = 0u32;
    for (&x, &y) in a.dc_luma.iter().zip(b.dc_luma.iter()) {
        let bit_a = x > a.dc_mean;
        let bit_b = y > b.dc_mean;
        distance += (bit_a != bit_b) as u32;
    }
    distance
}

/// Cosine similarity rescaled to [0, 1]
pub fn similarity(a: &Fingerprint, b: &Fingerprint) -> f32 {
    ((cosine_similarity(a, b) + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Whether two fingerprints pass the default similarity threshold
pub fn is_similar(a: &Fingerprint, b: &Fingerprint) -> bool {
    similarity(a, b) >= SIMILARITY_THRESHOLD
}

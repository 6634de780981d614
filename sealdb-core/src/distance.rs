//! Distance and similarity functions.
//!
//! The k-d tree ranks by Euclidean distance; the flat collection ranks by
//! cosine similarity. Squared Euclidean distance is used internally wherever
//! only comparisons are needed.
//!
//! Sums and products are accumulated in `f64`. Every finite `f32` squared
//! fits in `f64` without overflow or underflow to zero, so finite inputs
//! always give finite, order-preserving results.

use crate::error::{Error, Result};

/// Computes Euclidean (L2) distance between two vectors.
///
/// Formula: sqrt(sum((a[i] - b[i])^2))
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    euclidean_distance_squared(a, b).sqrt() as f32
}

/// Computes squared Euclidean distance (avoids sqrt for comparisons).
///
/// Monotone in each coordinate difference, which is what lets the k-d tree
/// prune with a single-axis bound.
#[inline]
pub fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| axis_distance_squared(x, y))
        .sum()
}

/// Squared difference of two coordinates, in the same precision as
/// [`euclidean_distance_squared`].
#[inline]
pub fn axis_distance_squared(x: f32, y: f32) -> f64 {
    let diff = f64::from(x) - f64::from(y);
    diff * diff
}

/// Computes dot product (inner product) between two vectors.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    dot_product_wide(a, b) as f32
}

#[inline]
fn dot_product_wide(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

/// L2 norm accumulated in `f64`. Zero only for an all-zero vector.
#[inline]
pub fn norm(a: &[f32]) -> f64 {
    dot_product_wide(a, a).sqrt()
}

/// Computes cosine similarity between two vectors.
///
/// Formula: (a · b) / (||a|| * ||b||)
/// Range: [-1, 1] where 1 = identical direction, -1 = opposite direction
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if either vector is all zeros, since the
/// similarity is undefined there.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let norm_a = norm(a);
    let norm_b = norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(Error::InvalidInput(
            "cosine similarity of a zero-magnitude vector".into(),
        ));
    }

    // Divide one norm at a time so the denominator cannot overflow.
    let similarity = dot_product_wide(a, b) / norm_a / norm_b;
    Ok(similarity.clamp(-1.0, 1.0) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((euclidean_distance(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_same_vector() {
        let a = [1.0, 2.0, 3.0];
        assert!(euclidean_distance(&a, &a) < 1e-10);
    }

    #[test]
    fn test_euclidean_squared() {
        let a = [1.0, 1.0];
        let b = [2.0, 3.0];
        assert!((euclidean_distance_squared(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = [1.0, 0.0];
        let b = [2.0, 0.0]; // Same direction, different magnitude
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = [1.0, 0.0];
        let b = [-1.0, 0.0];
        assert!((cosine_similarity(&a, &b).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = [0.0, 0.0];
        let b = [1.0, 0.0];
        assert!(matches!(
            cosine_similarity(&a, &b),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            cosine_similarity(&b, &a),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_euclidean_squared_large_coordinates_stay_finite() {
        let d = euclidean_distance_squared(&[0.0], &[3e20]);
        assert!(d.is_finite());
        assert!((d / 9e40 - 1.0).abs() < 1e-6);
        assert!(euclidean_distance_squared(&[0.0], &[1e20]) < d);

        let extreme = euclidean_distance_squared(&[f32::MAX, f32::MAX], &[f32::MIN, f32::MIN]);
        assert!(extreme.is_finite());
    }

    #[test]
    fn test_cosine_similarity_large_magnitudes() {
        let s = cosine_similarity(&[1e20, 1e20], &[1e20, 0.0]).unwrap();
        assert!((s - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);

        let s = cosine_similarity(&[f32::MAX, f32::MAX], &[f32::MAX, f32::MAX]).unwrap();
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_tiny_magnitudes() {
        let s = cosine_similarity(&[1e-30, 0.0], &[1.0, 0.0]).unwrap();
        assert!((s - 1.0).abs() < 1e-6);

        let subnormal = f32::from_bits(1);
        let s = cosine_similarity(&[subnormal, 0.0], &[0.0, 1.0]).unwrap();
        assert!(s.abs() < 1e-6);
    }

    #[test]
    fn test_norm_nonzero_for_tiny_vector() {
        assert!(norm(&[1e-30, 0.0]) > 0.0);
        assert_eq!(norm(&[0.0, -0.0]), 0.0);
    }

    #[test]
    fn test_dot_product() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        // 1*4 + 2*5 + 3*6 = 4 + 10 + 18 = 32
        assert!((dot_product(&a, &b) - 32.0).abs() < 1e-6);
    }
}

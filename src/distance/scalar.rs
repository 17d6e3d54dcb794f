//! Scalar similarity kernels.
//!
//! Plain iterator loops; the compiler auto-vectorizes them well enough for
//! the segment widths PQ works with.

/// Compute the dot product of two vectors.
///
/// Returns sum(a[i] * b[i])
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute the Euclidean norm of a vector.
///
/// Accumulates in `f64` so components near the ends of the `f32` range do
/// not underflow or overflow the squared sum.
#[inline]
pub fn norm(a: &[f32]) -> f32 {
    a.iter()
        .map(|&x| {
            let x = x as f64;
            x * x
        })
        .sum::<f64>()
        .sqrt() as f32
}

/// True when every component is exactly zero.
#[inline]
pub fn is_zero(a: &[f32]) -> bool {
    a.iter().all(|&x| x == 0.0)
}

/// True when every component is finite.
#[inline]
pub fn is_finite(a: &[f32]) -> bool {
    a.iter().all(|x| x.is_finite())
}

/// Compute the dot product and both squared norms in one pass.
///
/// Returns `(dot, |a|^2, |b|^2)` accumulated in `f64`.
#[inline]
pub fn dot_and_norms(a: &[f32], b: &[f32]) -> (f64, f64, f64) {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    (dot, norm_a, norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product_simple() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0];
        assert!((dot_product(&a, &b) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_norm() {
        let a = vec![3.0, 4.0];
        assert!((norm(&a) - 5.0).abs() < 1e-6);
        assert_eq!(norm(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_norm_extreme_magnitudes() {
        assert!((norm(&[1e-30, 0.0]) - 1e-30).abs() < 1e-36);
        assert!((norm(&[1e30, 0.0]) - 1e30).abs() < 1e24);
        assert!(norm(&[1e-30, 0.0]) > 0.0);
    }

    #[test]
    fn test_is_zero_and_finite() {
        assert!(is_zero(&[0.0, -0.0]));
        assert!(!is_zero(&[0.0, 1e-40]));
        assert!(is_finite(&[1.0, f32::MAX]));
        assert!(!is_finite(&[1.0, f32::NAN]));
        assert!(!is_finite(&[f32::NEG_INFINITY]));
    }

    #[test]
    fn test_dot_and_norms() {
        let a = vec![1.0, 0.0];
        let b = vec![3.0, 4.0];
        let (dot, na, nb) = dot_and_norms(&a, &b);
        assert!((dot - 3.0).abs() < 1e-6);
        assert!((na - 1.0).abs() < 1e-6);
        assert!((nb - 25.0).abs() < 1e-6);
    }
}

//! The canonical similarity used everywhere in the index.
//!
//! Every arg-max in the crate (k-means assignment, bucket assignment, PQ
//! encoding, bucket selection at query time) and every PQ table entry goes
//! through [`similarity`]: cosine similarity with a hard failure on zero-norm
//! operands. Larger is closer.

pub mod scalar;

pub use scalar::{dot_product, is_finite, is_zero, norm};

use crate::error::{IvfPqError, Result};

/// Cosine similarity `dot(a, b) / (|a| * |b|)`, in `[-1.0, 1.0]`.
///
/// # Errors
/// `DimensionMismatch` if the lengths differ, `NonFiniteValue` if either
/// operand holds a NaN or infinity, `DegenerateVector` if either operand has
/// zero norm.
#[inline]
pub fn similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(IvfPqError::dimension_mismatch(a.len(), b.len()));
    }

    let (dot, norm_a, norm_b) = scalar::dot_and_norms(a, b);
    if !(dot.is_finite() && norm_a.is_finite() && norm_b.is_finite()) {
        return Err(IvfPqError::NonFiniteValue);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(IvfPqError::DegenerateVector);
    }

    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    Ok(cosine.clamp(-1.0, 1.0) as f32)
}

/// Index and score of the candidate most similar to `query`.
///
/// Ties go to the lowest index. Returns `None` when there are no candidates.
pub fn best_match<'a, I>(query: &[f32], candidates: I) -> Result<Option<(usize, f32)>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut best: Option<(usize, f32)> = None;
    for (idx, candidate) in candidates.into_iter().enumerate() {
        let score = similarity(query, candidate)?;
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((idx, score)),
        }
    }
    Ok(best)
}

//! Common query interface for built indexes.

use crate::error::Result;
use crate::types::VectorId;

/// A search hit: the matched vector's id and its approximate similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// The ID of the matched vector.
    pub id: VectorId,
    /// Reported score: `pq_score`, plus `coarse_similarity` in residual mode.
    pub score: f32,
    /// Sum of the per-segment table lookups for the row.
    pub pq_score: f32,
    /// Similarity of the query to the selected bucket's centroid.
    pub coarse_similarity: f32,
}

impl SearchResult {
    /// Combine a row's PQ score with the coarse offset.
    #[inline]
    pub fn new(id: impl Into<VectorId>, pq_score: f32, coarse_similarity: f32, residual: bool) -> Self {
        let score = if residual {
            pq_score + coarse_similarity
        } else {
            pq_score
        };
        Self {
            id: id.into(),
            score,
            pq_score,
            coarse_similarity,
        }
    }

    /// Convert to a raw (id, score) tuple.
    #[inline]
    pub fn to_tuple(self) -> (u64, f32) {
        (self.id.0, self.score)
    }
}

impl From<SearchResult> for (u64, f32) {
    fn from(result: SearchResult) -> Self {
        result.to_tuple()
    }
}

/// Read-only query interface of a built index.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; searches may run concurrently
/// from many threads against one handle.
pub trait VectorIndex: Send + Sync {
    /// Best-scoring vector for `query`, or `None` if the selected bucket is
    /// empty.
    fn search(&self, query: &[f32]) -> Result<Option<SearchResult>>;

    /// Up to `k` best-scoring vectors, best first.
    fn search_top_k(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Return the number of indexed vectors.
    fn len(&self) -> usize;

    /// Return true if the index contains no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the dimensionality of vectors in this index.
    fn dimension(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_result_scores() {
        let plain = SearchResult::new(42u64, 1.5, 0.25, false);
        assert_eq!(plain.id, VectorId(42));
        assert_eq!(plain.score, 1.5);

        let residual = SearchResult::new(42u64, 1.5, 0.25, true);
        assert_eq!(residual.score, 1.75);
        assert_eq!(residual.pq_score, 1.5);

        let tuple: (u64, f32) = residual.into();
        assert_eq!(tuple, (42, 1.75));
    }
}

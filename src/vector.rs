//! Fixed-length float vectors and insertion-ordered vector sets.
//!
//! [`Vector`] carries the in-place arithmetic the k-means update step needs.
//! [`VectorSet`] stores its members in one flat buffer so that carving out a
//! PQ segment or shifting every member by a centroid stays a single pass.

use crate::distance;
use crate::error::{IvfPqError, Result};
use rand::Rng;

/// A vector of `f32` values whose length is fixed at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    /// Create a new vector from the given data.
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    /// Create a zero vector of the given dimension.
    pub fn zeros(dim: usize) -> Self {
        Self {
            data: vec![0.0; dim],
        }
    }

    /// Create a random vector with values uniformly distributed in [-1.0, 1.0).
    pub fn random<R: Rng + ?Sized>(rng: &mut R, dim: usize) -> Self {
        let data: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Self::new(data)
    }

    /// Return the dimensionality of this vector.
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    /// Return the data as a slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consume the vector and return its data.
    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    fn check_dim(&self, other: &[f32]) -> Result<()> {
        if other.len() != self.data.len() {
            return Err(IvfPqError::dimension_mismatch(self.data.len(), other.len()));
        }
        Ok(())
    }

    /// Add `other` to this vector element-wise.
    pub fn add(&mut self, other: &[f32]) -> Result<()> {
        self.check_dim(other)?;
        for (x, y) in self.data.iter_mut().zip(other) {
            *x += y;
        }
        Ok(())
    }

    /// Subtract `other` from this vector element-wise.
    pub fn subtract(&mut self, other: &[f32]) -> Result<()> {
        self.check_dim(other)?;
        for (x, y) in self.data.iter_mut().zip(other) {
            *x -= y;
        }
        Ok(())
    }

    /// Divide every element by `divisor`.
    ///
    /// # Errors
    /// `DivisionByZero` if `divisor` is zero; the vector is left untouched.
    pub fn divide_by_scalar(&mut self, divisor: f32) -> Result<()> {
        if divisor == 0.0 {
            return Err(IvfPqError::DivisionByZero);
        }
        for x in &mut self.data {
            *x /= divisor;
        }
        Ok(())
    }

    /// Reset every element to zero.
    pub fn zero_fill(&mut self) {
        self.data.fill(0.0);
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f32 {
        distance::norm(&self.data)
    }

    /// Cosine similarity against another vector.
    pub fn similarity(&self, other: &Vector) -> Result<f32> {
        distance::similarity(&self.data, &other.data)
    }

    /// Copy of the contiguous range `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Result<Vector> {
        if start > end || end > self.data.len() {
            return Err(IvfPqError::invalid_parameter(format!(
                "slice {}..{} out of bounds for dimension {}",
                start,
                end,
                self.data.len()
            )));
        }
        Ok(Self::new(self.data[start..end].to_vec()))
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}

impl AsRef<[f32]> for Vector {
    fn as_ref(&self) -> &[f32] {
        &self.data
    }
}

/// Insertion-ordered vectors that all share one dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorSet {
    dim: usize,
    data: Vec<f32>,
}

impl VectorSet {
    /// Create an empty set of the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    /// Create an empty set with room for `capacity` vectors.
    pub fn with_capacity(dim: usize, capacity: usize) -> Self {
        Self {
            dim,
            data: Vec::with_capacity(dim * capacity),
        }
    }

    /// Build a set from rows, checking every row against the first one's length.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let dim = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut set = Self::with_capacity(dim, rows.len());
        for row in rows {
            set.push(row.as_ref())?;
        }
        Ok(set)
    }

    /// Dimension shared by every member.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    /// Return true if the set holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector.
    pub fn push(&mut self, row: &[f32]) -> Result<()> {
        if row.len() != self.dim {
            return Err(IvfPqError::dimension_mismatch(self.dim, row.len()));
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    /// Append every member of `other`.
    pub fn extend(&mut self, other: &VectorSet) -> Result<()> {
        if other.is_empty() {
            return Ok(());
        }
        if other.dim != self.dim {
            return Err(IvfPqError::dimension_mismatch(self.dim, other.dim));
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    /// Member at `index`.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    #[inline]
    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Mutable member at `index`.
    #[inline]
    pub fn row_mut(&mut self, index: usize) -> &mut [f32] {
        let start = index * self.dim;
        &mut self.data[start..start + self.dim]
    }

    /// Iterate over members in insertion order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f32]> + '_ {
        // chunks_exact on an empty buffer with dim 0 would panic
        self.data.chunks_exact(self.dim.max(1))
    }

    /// Narrow every member to the columns `start..end`.
    ///
    /// The result has the same length and dimension `end - start`.
    pub fn slice_columns(&self, start: usize, end: usize) -> Result<VectorSet> {
        if start >= end || end > self.dim {
            return Err(IvfPqError::invalid_parameter(format!(
                "column range {}..{} out of bounds for dimension {}",
                start, end, self.dim
            )));
        }
        let mut out = VectorSet::with_capacity(end - start, self.len());
        for row in self.rows() {
            out.data.extend_from_slice(&row[start..end]);
        }
        Ok(out)
    }

    /// Subtract `v` from every member in place.
    pub fn subtract_from_all(&mut self, v: &[f32]) -> Result<()> {
        if v.len() != self.dim {
            return Err(IvfPqError::dimension_mismatch(self.dim, v.len()));
        }
        for row in self.data.chunks_exact_mut(self.dim.max(1)) {
            for (x, y) in row.iter_mut().zip(v) {
                *x -= y;
            }
        }
        Ok(())
    }

    /// Index and similarity of the member most similar to `query`.
    ///
    /// Ties go to the lowest index.
    ///
    /// # Errors
    /// `EmptyInput` on an empty set, plus any error of
    /// [`similarity`](crate::distance::similarity).
    pub fn nearest(&self, query: &[f32]) -> Result<(usize, f32)> {
        distance::best_match(query, self.rows())?.ok_or_else(|| IvfPqError::empty_input(1, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_arithmetic() {
        let mut v = Vector::new(vec![1.0, 2.0]);
        v.add(&[1.0, 1.0]).unwrap();
        assert_eq!(v.as_slice(), &[2.0, 3.0]);
        v.subtract(&[0.5, 1.0]).unwrap();
        assert_eq!(v.as_slice(), &[1.5, 2.0]);
        v.divide_by_scalar(2.0).unwrap();
        assert_eq!(v.as_slice(), &[0.75, 1.0]);
        v.zero_fill();
        assert_eq!(v.as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_vector_dimension_checks() {
        let mut v = Vector::new(vec![1.0, 2.0]);
        assert!(matches!(
            v.add(&[1.0]),
            Err(IvfPqError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(v.subtract(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_divide_by_zero() {
        let mut v = Vector::new(vec![1.0, 2.0]);
        assert!(matches!(v.divide_by_scalar(0.0), Err(IvfPqError::DivisionByZero)));
        assert_eq!(v.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_vector_norm_and_slice() {
        let v = Vector::new(vec![3.0, 4.0, 12.0]);
        assert!((v.norm() - 13.0).abs() < 1e-5);
        assert_eq!(v.slice(1, 3).unwrap().as_slice(), &[4.0, 12.0]);
        assert!(v.slice(2, 4).is_err());
    }

    #[test]
    fn test_vector_similarity() {
        let a = Vector::new(vec![1.0, 0.0]);
        let b = Vector::new(vec![0.0, 0.0]);
        assert!((a.similarity(&a).unwrap() - 1.0).abs() < 1e-6);
        assert!(matches!(a.similarity(&b), Err(IvfPqError::DegenerateVector)));
    }

    #[test]
    fn test_vector_set_push_and_rows() {
        let mut set = VectorSet::new(2);
        set.push(&[1.0, 2.0]).unwrap();
        set.push(&[3.0, 4.0]).unwrap();
        assert!(set.push(&[1.0]).is_err());
        assert_eq!(set.len(), 2);
        assert_eq!(set.row(1), &[3.0, 4.0]);
        let rows: Vec<&[f32]> = set.rows().collect();
        assert_eq!(rows, vec![&[1.0, 2.0][..], &[3.0, 4.0][..]]);
    }

    #[test]
    fn test_slice_columns() {
        let set = VectorSet::from_rows(&[vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]])
            .unwrap();
        let seg = set.slice_columns(2, 4).unwrap();
        assert_eq!(seg.dim(), 2);
        assert_eq!(seg.len(), 2);
        assert_eq!(seg.row(0), &[3.0, 4.0]);
        assert_eq!(seg.row(1), &[7.0, 8.0]);
        assert!(set.slice_columns(3, 3).is_err());
        assert!(set.slice_columns(0, 5).is_err());
    }

    #[test]
    fn test_subtract_from_all() {
        let mut set = VectorSet::from_rows(&[vec![1.0, 2.0], vec![3.0, 5.0]]).unwrap();
        set.subtract_from_all(&[1.0, 1.0]).unwrap();
        assert_eq!(set.row(0), &[0.0, 1.0]);
        assert_eq!(set.row(1), &[2.0, 4.0]);
    }

    #[test]
    fn test_nearest() {
        let set = VectorSet::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.1]]).unwrap();
        let (idx, _) = set.nearest(&[1.0, 0.0]).unwrap();
        assert_eq!(idx, 1);
        assert!(VectorSet::new(2).nearest(&[1.0, 0.0]).is_err());
    }

    #[test]
    fn test_empty_set_rows() {
        let set = VectorSet::new(0);
        assert_eq!(set.len(), 0);
        assert_eq!(set.rows().count(), 0);
    }
}

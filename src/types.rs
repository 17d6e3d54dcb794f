//! Core newtypes and aliases shared by the build and query paths.

use crate::constants;
use crate::error::Result;
use crate::vector::VectorSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// A global identifier for an indexed vector.
///
/// Using a newtype prevents accidentally passing a row index where an ID is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct VectorId(pub u64);

impl VectorId {
    /// Create a new VectorId.
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VectorId({})", self.0)
    }
}

impl From<u64> for VectorId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<VectorId> for u64 {
    #[inline]
    fn from(id: VectorId) -> Self {
        id.0
    }
}

/// The M per-segment codes of one vector, each in `[0, pq_num)`.
pub type Codes = SmallVec<[u16; constants::pq::INLINE_CODES]>;

/// A compressed vector: its global id and its code tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRow {
    /// Global vector id.
    pub id: VectorId,
    /// Per-segment codebook indices.
    pub codes: Codes,
}

impl CodeRow {
    /// Create a new code row.
    pub fn new(id: impl Into<VectorId>, codes: Codes) -> Self {
        Self {
            id: id.into(),
            codes,
        }
    }
}

/// The raw vectors assigned to one coarse centroid, with their global ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// Global ids, parallel to `vectors`.
    pub ids: Vec<VectorId>,
    /// Member vectors in shard order.
    pub vectors: VectorSet,
}

impl Bucket {
    /// Create an empty bucket of the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            ids: Vec::new(),
            vectors: VectorSet::new(dim),
        }
    }

    /// Append a member.
    pub fn push(&mut self, id: VectorId, vector: &[f32]) -> Result<()> {
        self.vectors.push(vector)?;
        self.ids.push(id);
        Ok(())
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Return true if the bucket has no members.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_id() {
        let id = VectorId::new(42);
        assert_eq!(id.as_u64(), 42);
        assert_eq!(format!("{}", id), "VectorId(42)");

        let id2: VectorId = 100u64.into();
        assert_eq!(id2.as_u64(), 100);

        let raw: u64 = id.into();
        assert_eq!(raw, 42);
    }

    #[test]
    fn test_code_row_inline() {
        let row = CodeRow::new(7u64, Codes::from_slice(&[1, 0, 3]));
        assert_eq!(row.id, VectorId(7));
        assert!(!row.codes.spilled());
        assert_eq!(row.codes.as_slice(), &[1, 0, 3]);
    }

    #[test]
    fn test_bucket_push() {
        let mut bucket = Bucket::new(2);
        bucket.push(VectorId(4), &[1.0, 2.0]).unwrap();
        assert!(bucket.push(VectorId(5), &[1.0]).is_err());
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket.vectors.len(), 1);
    }
}

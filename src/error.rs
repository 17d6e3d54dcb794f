//! Error types for forge-ivfpq operations.
//!
//! Every build stage and query returns these errors to its caller. Logging
//! happens alongside, never instead of, propagation.

use std::io;
use thiserror::Error;

/// Result type alias using [`IvfPqError`].
pub type Result<T> = std::result::Result<T, IvfPqError>;

/// Errors that can occur while building or querying an IVF-PQ index.
#[derive(Error, Debug)]
pub enum IvfPqError {
    /// I/O error while reading or writing a shard or index file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Vector length does not match the configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected vector dimension.
        expected: usize,
        /// Actual vector dimension provided.
        actual: usize,
    },

    /// Vector dimension cannot be split into equal PQ segments.
    #[error("dimension mismatch: dimension {dim} is not divisible into {segments} segments")]
    UnevenSegments {
        /// Vector dimension.
        dim: usize,
        /// Requested segment count.
        segments: usize,
    },

    /// A zero-norm vector was given to the cosine similarity.
    #[error("degenerate vector: similarity requires a non-zero norm")]
    DegenerateVector,

    /// A vector component is NaN or infinite.
    #[error("non-finite value: vector components must be finite")]
    NonFiniteValue,

    /// Two input records resolve to the same global id.
    #[error("duplicate id: {0} is assigned to more than one vector")]
    DuplicateId(u64),

    /// Clustering was asked for more clusters than it has vectors, or for none at all.
    #[error("empty input: cannot form {clusters} clusters from {vectors} vectors")]
    EmptyInput {
        /// Requested cluster count.
        clusters: usize,
        /// Vectors available.
        vectors: usize,
    },

    /// A centroid lost all members and no reseed candidate was left.
    #[error("empty cluster: centroid {0} has no members and cannot be reseeded")]
    EmptyCluster(usize),

    /// Scalar division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// The index root holds no completed build.
    #[error("index not built: run the build stages before searching")]
    IndexNotBuilt,

    /// Encoding or searching before the PQ codebook was trained or loaded.
    #[error("untrained codebook: train or load the product quantizer first")]
    UntrainedCodebook,

    /// The persisted shard for a coarse centroid is missing.
    #[error("bucket not found: no shard for centroid {0}")]
    BucketNotFound(usize),

    /// A shard holds fewer records than the sampling stage needs.
    #[error("shard too small: shard {shard} has {available} records, sampling needs {required}")]
    ShardTooSmall {
        /// Shard name.
        shard: String,
        /// Records the sample needs.
        required: usize,
        /// Records the shard holds.
        available: usize,
    },

    /// Invalid parameter value provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A persisted or input file has a malformed row.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Checksum verification failed while loading the manifest.
    #[error("checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    /// Error during serialization or deserialization.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// A stage thread pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

impl IvfPqError {
    /// Creates a new `DimensionMismatch` error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Creates a new `EmptyInput` error.
    pub fn empty_input(clusters: usize, vectors: usize) -> Self {
        Self::EmptyInput { clusters, vectors }
    }

    /// Creates a new `ShardTooSmall` error.
    pub fn shard_too_small(shard: impl Into<String>, required: usize, available: usize) -> Self {
        Self::ShardTooSmall {
            shard: shard.into(),
            required,
            available,
        }
    }

    /// Creates a new `InvalidParameter` error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Creates a new `InvalidFormat` error.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Creates a new `SerializationError`.
    pub fn serialization_error(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// True for both members of the dimension-mismatch family.
    pub fn is_dimension_error(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::UnevenSegments { .. }
        )
    }
}

impl From<bincode::Error> for IvfPqError {
    fn from(err: bincode::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for IvfPqError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IvfPqError::dimension_mismatch(128, 256);
        assert_eq!(err.to_string(), "dimension mismatch: expected 128, got 256");

        let err = IvfPqError::empty_input(8, 3);
        assert_eq!(
            err.to_string(),
            "empty input: cannot form 8 clusters from 3 vectors"
        );

        let err = IvfPqError::shard_too_small("7.txt", 512, 100);
        assert_eq!(
            err.to_string(),
            "shard too small: shard 7.txt has 100 records, sampling needs 512"
        );

        let err = IvfPqError::BucketNotFound(3);
        assert_eq!(err.to_string(), "bucket not found: no shard for centroid 3");

        let err = IvfPqError::DuplicateId(42);
        assert_eq!(
            err.to_string(),
            "duplicate id: 42 is assigned to more than one vector"
        );
        assert_eq!(
            IvfPqError::NonFiniteValue.to_string(),
            "non-finite value: vector components must be finite"
        );
    }

    #[test]
    fn test_dimension_family() {
        assert!(IvfPqError::dimension_mismatch(4, 5).is_dimension_error());
        assert!(IvfPqError::UnevenSegments { dim: 10, segments: 3 }.is_dimension_error());
        assert!(!IvfPqError::DegenerateVector.is_dimension_error());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: IvfPqError = io_err.into();
        assert!(matches!(err, IvfPqError::Io(_)));
    }
}

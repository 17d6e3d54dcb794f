//! Build and query configuration.
//!
//! [`IndexConfig`] is the whole configuration surface of an index. It is
//! persisted in the manifest so a search handle opened later sees exactly
//! the parameters the index was built with.

use crate::constants;
use crate::error::{IvfPqError, Result};
use serde::{Deserialize, Serialize};

/// Concurrency width of each build stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageWidths {
    /// Coarse training: shard sampling tasks.
    pub sampling: usize,
    /// Coarse assignment: raw shard tasks.
    pub assignment: usize,
    /// PQ training: bucket sampling tasks.
    pub pq_sampling: usize,
    /// PQ training: segment tasks.
    pub pq_training: usize,
    /// Encoding: bucket tasks.
    pub encoding: usize,
}

impl Default for StageWidths {
    fn default() -> Self {
        Self {
            sampling: constants::widths::SAMPLING,
            assignment: constants::widths::ASSIGNMENT,
            pq_sampling: constants::widths::PQ_SAMPLING,
            pq_training: constants::widths::PQ_TRAINING,
            encoding: constants::widths::ENCODING,
        }
    }
}

impl StageWidths {
    /// Use the same width for every stage.
    pub fn uniform(width: usize) -> Self {
        Self {
            sampling: width,
            assignment: width,
            pq_sampling: width,
            pq_training: width,
            encoding: width,
        }
    }

    fn all(&self) -> [(&'static str, usize); 5] {
        [
            ("sampling", self.sampling),
            ("assignment", self.assignment),
            ("pq_sampling", self.pq_sampling),
            ("pq_training", self.pq_training),
            ("encoding", self.encoding),
        ]
    }
}

/// Parameters of one IVF-PQ index generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Vector dimension (D).
    pub dim: usize,
    /// Number of coarse centroids (K).
    pub n_clusters: usize,
    /// Number of PQ segments (M). Must divide `dim`.
    pub n_segments: usize,
    /// Codebook size per segment.
    pub pq_num: usize,
    /// Lloyd iterations for coarse training.
    pub coarse_iterations: usize,
    /// Lloyd iterations for each segment codebook.
    pub pq_iterations: usize,
    /// Coarse training sample per centroid, spread across all shards.
    pub coarse_samples_per_centroid: usize,
    /// PQ training sample taken from each bucket.
    pub pq_samples_per_bucket: usize,
    /// Quantize residuals against the coarse centroid instead of raw vectors.
    pub residual: bool,
    /// Seed for sampling and centroid initialization. `None` draws one at random.
    pub seed: Option<u64>,
    /// Concurrency width per build stage.
    pub widths: StageWidths,
    /// Extension of every shard and table file.
    pub file_extension: String,
}

impl IndexConfig {
    /// Create a configuration with default tuning for the given shape.
    ///
    /// # Arguments
    /// * `dim` - Vector dimension
    /// * `n_clusters` - Coarse centroid count
    /// * `n_segments` - PQ segment count
    /// * `pq_num` - Codebook size per segment
    pub fn new(dim: usize, n_clusters: usize, n_segments: usize, pq_num: usize) -> Self {
        Self {
            dim,
            n_clusters,
            n_segments,
            pq_num,
            coarse_iterations: constants::ivf::DEFAULT_ITERATIONS,
            pq_iterations: constants::pq::DEFAULT_ITERATIONS,
            coarse_samples_per_centroid: constants::ivf::SAMPLES_PER_CENTROID,
            pq_samples_per_bucket: constants::pq::SAMPLES_PER_BUCKET,
            residual: false,
            seed: None,
            widths: StageWidths::default(),
            file_extension: constants::layout::DEFAULT_EXTENSION.to_string(),
        }
    }

    /// Enable or disable residual encoding.
    pub fn with_residual(mut self, residual: bool) -> Self {
        self.residual = residual;
        self
    }

    /// Fix the seed so sampling and initialization are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the coarse and PQ iteration budgets.
    pub fn with_iterations(mut self, coarse: usize, pq: usize) -> Self {
        self.coarse_iterations = coarse;
        self.pq_iterations = pq;
        self
    }

    /// Set the coarse sample per centroid.
    pub fn with_coarse_samples(mut self, per_centroid: usize) -> Self {
        self.coarse_samples_per_centroid = per_centroid;
        self
    }

    /// Set the PQ sample budget per bucket.
    pub fn with_pq_samples(mut self, per_bucket: usize) -> Self {
        self.pq_samples_per_bucket = per_bucket;
        self
    }

    /// Set the per-stage concurrency widths.
    pub fn with_widths(mut self, widths: StageWidths) -> Self {
        self.widths = widths;
        self
    }

    /// Set the shard file extension.
    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.file_extension = ext.into();
        self
    }

    /// Width of one PQ segment (D / M).
    pub fn segment_dim(&self) -> usize {
        self.dim / self.n_segments
    }

    /// Seed to use for this build, drawing a random one if none was configured.
    pub fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }

    /// Check every parameter before any stage starts.
    ///
    /// # Errors
    /// `UnevenSegments` if `dim` is not a multiple of `n_segments`,
    /// `InvalidParameter` for any zero or out-of-range value.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("dim", self.dim),
            ("n_clusters", self.n_clusters),
            ("n_segments", self.n_segments),
            ("pq_num", self.pq_num),
            ("coarse_iterations", self.coarse_iterations),
            ("pq_iterations", self.pq_iterations),
            ("coarse_samples_per_centroid", self.coarse_samples_per_centroid),
            ("pq_samples_per_bucket", self.pq_samples_per_bucket),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(IvfPqError::invalid_parameter(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        for (stage, width) in self.widths.all() {
            if width == 0 {
                return Err(IvfPqError::invalid_parameter(format!(
                    "width of stage {} must be greater than zero",
                    stage
                )));
            }
        }

        if self.dim % self.n_segments != 0 {
            return Err(IvfPqError::UnevenSegments {
                dim: self.dim,
                segments: self.n_segments,
            });
        }

        if self.pq_num > constants::pq::MAX_CODEBOOK_SIZE {
            return Err(IvfPqError::invalid_parameter(format!(
                "pq_num {} exceeds the maximum codebook size {}",
                self.pq_num,
                constants::pq::MAX_CODEBOOK_SIZE
            )));
        }

        if self.file_extension.is_empty() || self.file_extension.contains(|c: char| c == '/' || c == '.') {
            return Err(IvfPqError::invalid_parameter(format!(
                "invalid file extension '{}'",
                self.file_extension
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexConfig::new(128, 16, 8, 256);
        assert_eq!(config.coarse_iterations, 500);
        assert_eq!(config.pq_samples_per_bucket, 256);
        assert_eq!(config.segment_dim(), 16);
        assert!(!config.residual);
        assert_eq!(config.widths.encoding, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_uneven_segments_rejected() {
        let config = IndexConfig::new(30, 4, 8, 16);
        assert!(matches!(
            config.validate(),
            Err(IvfPqError::UnevenSegments { dim: 30, segments: 8 })
        ));
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(IndexConfig::new(8, 0, 2, 4).validate().is_err());
        assert!(IndexConfig::new(8, 2, 2, 0).validate().is_err());
        let config = IndexConfig::new(8, 2, 2, 4).with_widths(StageWidths::uniform(0));
        assert!(matches!(
            config.validate(),
            Err(IvfPqError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_codebook_size_limit() {
        let config = IndexConfig::new(8, 2, 2, 70_000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_seed_resolution() {
        let config = IndexConfig::new(8, 2, 2, 4).with_seed(42);
        assert_eq!(config.resolve_seed(), 42);
    }
}

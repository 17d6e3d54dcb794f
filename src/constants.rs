//! Named constants for configuration values.
//!
//! Defaults for [`IndexConfig`](crate::config::IndexConfig) live here so they
//! can be found and tuned in one place.

/// Constants for coarse (IVF) quantization.
pub mod ivf {
    /// Default Lloyd iterations for coarse centroid training.
    pub const DEFAULT_ITERATIONS: usize = 500;

    /// Default coarse training sample per centroid, spread across all shards.
    pub const SAMPLES_PER_CENTROID: usize = 256;
}

/// Constants for product quantization (PQ).
pub mod pq {
    /// Default Lloyd iterations for each segment codebook.
    pub const DEFAULT_ITERATIONS: usize = 25;

    /// Default training sample taken from each bucket.
    pub const SAMPLES_PER_BUCKET: usize = 256;

    /// Largest codebook a `u16` code can address.
    pub const MAX_CODEBOOK_SIZE: usize = u16::MAX as usize + 1;

    /// Inline capacity for a code tuple before it spills to the heap.
    pub const INLINE_CODES: usize = 16;
}

/// Default concurrency width of each build stage.
pub mod widths {
    /// Coarse training: shard sampling.
    pub const SAMPLING: usize = 3;

    /// Coarse assignment: one task per raw shard.
    pub const ASSIGNMENT: usize = 3;

    /// PQ training: bucket sampling.
    pub const PQ_SAMPLING: usize = 6;

    /// PQ training: one task per segment.
    pub const PQ_TRAINING: usize = 4;

    /// Encoding: one task per bucket.
    pub const ENCODING: usize = 8;
}

/// Constants for the on-disk layout.
pub mod layout {
    /// Directory holding raw bucket shards and the coarse centroid table.
    pub const BUCKET_DIR: &str = "bucket";

    /// Directory holding code shards and the codebook table.
    pub const PQ_DIR: &str = "pqCode";

    /// File stem of the centroid / codebook tables.
    pub const CENTER_STEM: &str = "center";

    /// Default shard file extension.
    pub const DEFAULT_EXTENSION: &str = "txt";

    /// Manifest written once a build completes.
    pub const MANIFEST_FILE: &str = "index.meta";

    /// Separator row closing each segment block of the codebook table.
    pub const CODEBOOK_SENTINEL: &str = "||";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codebook_limit() {
        assert_eq!(pq::MAX_CODEBOOK_SIZE, 65536);
    }

    #[test]
    fn test_layout_names_distinct() {
        assert_ne!(layout::BUCKET_DIR, layout::PQ_DIR);
    }
}

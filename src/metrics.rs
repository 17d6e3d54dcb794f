//! Build reports and search statistics.
//!
//! # Build Report
//!
//! [`BuildReport`] is returned by every build and summarizes the generation
//! that was written:
//!
//! ```ignore
//! let report = IvfPqIndexBuilder::new(config).build(&source, root)?;
//! println!("{}", report.summary());
//! // BuildReport:
//! //   Vectors: 1000 (code rows: 1000)
//! //   Buckets: 16 (min=41, max=87, mean=62.5, std=11.2)
//! //   ...
//! ```
//!
//! # Search Statistics
//!
//! Use [`SearchStatistics`] to profile a single query:
//!
//! ```ignore
//! let (result, stats) = index.search_with_stats(&query)?;
//! println!("Query took {:.3}ms, scanned {} rows", stats.query_time_ms(), stats.rows_scanned);
//! ```

use std::time::Duration;

/// Size distribution of the coarse buckets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartitionStats {
    /// Number of buckets.
    pub count: usize,
    /// Smallest bucket.
    pub min: usize,
    /// Largest bucket.
    pub max: usize,
    /// Mean bucket size.
    pub mean: f32,
    /// Standard deviation of bucket sizes.
    pub std: f32,
    /// Buckets with no members.
    pub empty: usize,
}

impl PartitionStats {
    /// Compute the distribution of the given bucket sizes.
    pub fn from_sizes(sizes: &[usize]) -> Self {
        if sizes.is_empty() {
            return Self::default();
        }
        let count = sizes.len();
        let mean = sizes.iter().sum::<usize>() as f32 / count as f32;
        let variance = sizes
            .iter()
            .map(|&s| {
                let d = s as f32 - mean;
                d * d
            })
            .sum::<f32>()
            / count as f32;

        Self {
            count,
            min: sizes.iter().copied().min().unwrap_or(0),
            max: sizes.iter().copied().max().unwrap_or(0),
            mean,
            std: variance.sqrt(),
            empty: sizes.iter().filter(|&&s| s == 0).count(),
        }
    }
}

/// Wall-clock time of each build stage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StageTimings {
    /// Coarse sampling and k-means.
    pub coarse_training: Duration,
    /// Bucket assignment and centroid persistence.
    pub assignment: Duration,
    /// Bucket sampling and segment k-means.
    pub pq_training: Duration,
    /// Encoding and codebook persistence.
    pub encoding: Duration,
}

impl StageTimings {
    /// Sum of every stage.
    pub fn total(&self) -> Duration {
        self.coarse_training + self.assignment + self.pq_training + self.encoding
    }
}

/// Summary of one completed build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildReport {
    /// Vectors written to bucket shards.
    pub total_vectors: usize,
    /// Rows per bucket shard, indexed by centroid.
    pub bucket_sizes: Vec<usize>,
    /// Rows per code shard, indexed by centroid.
    pub code_rows: Vec<usize>,
    /// Bucket size distribution.
    pub partitions: PartitionStats,
    /// Stage timings.
    pub timings: StageTimings,
    /// Seed used for sampling and initialization.
    pub seed: u64,
}

impl BuildReport {
    /// Assemble a report from the stage outputs.
    pub fn new(bucket_sizes: Vec<usize>, code_rows: Vec<usize>, timings: StageTimings, seed: u64) -> Self {
        Self {
            total_vectors: bucket_sizes.iter().sum(),
            partitions: PartitionStats::from_sizes(&bucket_sizes),
            bucket_sizes,
            code_rows,
            timings,
            seed,
        }
    }

    /// Total code rows over all shards.
    pub fn total_code_rows(&self) -> usize {
        self.code_rows.iter().sum()
    }

    /// Create a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "BuildReport:\n  \
             Vectors: {} (code rows: {})\n  \
             Buckets: {} (min={}, max={}, mean={:.1}, std={:.1}, empty={})\n  \
             Timings: coarse={:.3}s assign={:.3}s pq={:.3}s encode={:.3}s total={:.3}s\n  \
             Seed: {}",
            self.total_vectors,
            self.total_code_rows(),
            self.partitions.count,
            self.partitions.min,
            self.partitions.max,
            self.partitions.mean,
            self.partitions.std,
            self.partitions.empty,
            self.timings.coarse_training.as_secs_f32(),
            self.timings.assignment.as_secs_f32(),
            self.timings.pq_training.as_secs_f32(),
            self.timings.encoding.as_secs_f32(),
            self.timings.total().as_secs_f32(),
            self.seed
        )
    }
}

/// Statistics about a single search operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchStatistics {
    /// Total query execution time.
    pub query_time: Duration,
    /// Bucket the query was routed to.
    pub bucket: usize,
    /// Similarity of the query to that bucket's centroid.
    pub coarse_similarity: f32,
    /// Code rows scored.
    pub rows_scanned: usize,
}

impl SearchStatistics {
    /// Get query time in milliseconds.
    pub fn query_time_ms(&self) -> f32 {
        self.query_time.as_secs_f32() * 1000.0
    }

    /// Create a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "SearchStatistics:\n  \
             Time: {:.3}ms\n  \
             Bucket: {} (coarse similarity {:.4})\n  \
             Rows scanned: {}",
            self.query_time_ms(),
            self.bucket,
            self.coarse_similarity,
            self.rows_scanned
        )
    }
}

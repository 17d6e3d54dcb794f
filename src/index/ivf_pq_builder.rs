//! Build pipeline for IVF-PQ index generations.
//!
//! The builder runs the stages strictly in order, each on its own bounded
//! [`StagePool`], and each stage finishes before the next one starts:
//!
//! 1. coarse training (sample every raw shard, k-means)
//! 2. assignment (route every record to its bucket shard, persist centroids)
//! 3. PQ training (sample every bucket, one k-means per segment)
//! 4. encoding (one task per bucket, persist the codebook table)
//! 5. manifest
//!
//! The manifest is written last. Until it exists the root does not count
//! as a built index.
//!
//! # Example
//!
//! ```ignore
//! use forge_ivfpq::{DirSource, IndexConfig, IvfPqIndex, IvfPqIndexBuilder};
//!
//! let config = IndexConfig::new(128, 64, 16, 256).with_residual(true);
//! let report = IvfPqIndexBuilder::new(config).build(&DirSource::new("raw", 128), "index")?;
//! println!("{}", report.summary());
//!
//! let index = IvfPqIndex::open("index")?;
//! let hit = index.search(&query)?;
//! ```

use crate::concurrency::StagePool;
use crate::config::IndexConfig;
use crate::error::{IvfPqError, Result};
use crate::index::ivf::CoarseQuantizer;
use crate::metrics::{BuildReport, StageTimings};
use crate::persistence::{IndexLayout, IndexManifest};
use crate::pq::ProductQuantizer;
use crate::source::VectorSource;
use crate::vector::VectorSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Builds index generations from a [`VectorSource`].
#[derive(Debug, Clone)]
pub struct IvfPqIndexBuilder {
    config: IndexConfig,
}

impl IvfPqIndexBuilder {
    /// Create a builder for the given configuration.
    pub fn new(config: IndexConfig) -> Self {
        Self { config }
    }

    /// The configuration every build uses.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Configuration with the seed fixed for this run.
    fn resolved_config(&self) -> Result<IndexConfig> {
        self.config.validate()?;
        let seed = self.config.resolve_seed();
        Ok(self.config.clone().with_seed(seed))
    }

    /// Build a complete index generation under `root`.
    ///
    /// # Errors
    /// Any error of any stage. The first failing task fails its stage and
    /// the build stops there without writing a manifest.
    pub fn build(&self, source: &dyn VectorSource, root: impl Into<PathBuf>) -> Result<BuildReport> {
        let config = self.resolved_config()?;
        let layout = IndexLayout::new(root, config.file_extension.clone());
        layout.create_dirs()?;
        clear_manifest(&layout)?;
        info!(
            root = %layout.root().display(),
            dim = config.dim,
            clusters = config.n_clusters,
            segments = config.n_segments,
            pq_num = config.pq_num,
            residual = config.residual,
            "building index"
        );

        let mut timings = StageTimings::default();

        let (coarse, elapsed) = timed(|| {
            let pool = StagePool::new("sampling", config.widths.sampling)?;
            let mut coarse = CoarseQuantizer::new(&config);
            coarse.train(source, &pool)?;
            Ok(coarse)
        })
        .map_err(|e| stage_failed("coarse training", e))?;
        timings.coarse_training = elapsed;

        let (bucket_sizes, elapsed) = timed(|| {
            let pool = StagePool::new("assignment", config.widths.assignment)?;
            coarse.assign_and_persist(source, &layout, &pool)
        })
        .map_err(|e| stage_failed("assignment", e))?;
        timings.assignment = elapsed;

        let centroids = coarse.centroids()?.clone();
        self.finish(&config, &layout, &centroids, bucket_sizes, timings)
    }

    /// Redo PQ training and encoding over the buckets and centroids already
    /// persisted under `root`.
    ///
    /// # Errors
    /// `IndexNotBuilt` if no centroid table exists yet, `BucketNotFound` if a
    /// bucket shard is missing.
    pub fn rebuild_pq(&self, root: impl Into<PathBuf>) -> Result<BuildReport> {
        let config = self.resolved_config()?;
        let layout = IndexLayout::new(root, config.file_extension.clone());

        let coarse = CoarseQuantizer::load(&layout, config.dim)?;
        if coarse.n_clusters() != config.n_clusters {
            return Err(IvfPqError::invalid_parameter(format!(
                "persisted centroid table has {} rows, configuration expects {}",
                coarse.n_clusters(),
                config.n_clusters
            )));
        }
        clear_manifest(&layout)?;
        info!(root = %layout.root().display(), "rebuilding PQ stage over persisted buckets");

        let mut bucket_sizes = Vec::with_capacity(config.n_clusters);
        for c in 0..config.n_clusters {
            bucket_sizes.push(layout.read_bucket(c, config.dim)?.len());
        }

        let centroids = coarse.centroids()?.clone();
        self.finish(&config, &layout, &centroids, bucket_sizes, StageTimings::default())
    }

    /// PQ training, encoding and the manifest.
    fn finish(
        &self,
        config: &IndexConfig,
        layout: &IndexLayout,
        centroids: &VectorSet,
        bucket_sizes: Vec<usize>,
        mut timings: StageTimings,
    ) -> Result<BuildReport> {
        let (pq, elapsed) = timed(|| {
            let sampling = StagePool::new("pq-sampling", config.widths.pq_sampling)?;
            let training = StagePool::new("pq-training", config.widths.pq_training)?;
            let mut pq = ProductQuantizer::new(config)?;
            pq.train(layout, &sampling, &training)?;
            Ok(pq)
        })
        .map_err(|e| stage_failed("pq training", e))?;
        timings.pq_training = elapsed;

        let (code_rows, elapsed) = timed(|| {
            let pool = StagePool::new("encoding", config.widths.encoding)?;
            pq.encode_and_persist_all(layout, centroids, &pool)
        })
        .map_err(|e| stage_failed("encoding", e))?;
        timings.encoding = elapsed;

        let total_vectors: usize = bucket_sizes.iter().sum();
        let total_codes: usize = code_rows.iter().sum();
        if total_codes != total_vectors {
            return Err(IvfPqError::invalid_format(format!(
                "encoded {} rows for {} bucketed vectors",
                total_codes, total_vectors
            )));
        }

        IndexManifest {
            config: config.clone(),
            total_vectors,
            bucket_sizes: bucket_sizes.clone(),
            code_rows: code_rows.clone(),
        }
        .save(layout)?;

        let report = BuildReport::new(bucket_sizes, code_rows, timings, config.seed.unwrap_or_default());
        info!(
            vectors = report.total_vectors,
            buckets = report.partitions.count,
            empty_buckets = report.partitions.empty,
            seconds = report.timings.total().as_secs_f32(),
            "index build complete"
        );
        Ok(report)
    }
}

fn timed<T>(stage: impl FnOnce() -> Result<T>) -> Result<(T, Duration)> {
    let start = Instant::now();
    let value = stage()?;
    Ok((value, start.elapsed()))
}

fn stage_failed(stage: &str, err: IvfPqError) -> IvfPqError {
    warn!(stage, error = %err, "build stage failed");
    err
}

fn clear_manifest(layout: &IndexLayout) -> Result<()> {
    match fs::remove_file(layout.manifest_path()) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

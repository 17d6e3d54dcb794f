//! Coarse (IVF) quantizer.
//!
//! The coarse quantizer partitions the input into K buckets keyed by the
//! most similar coarse centroid. Training clusters a sample drawn from every
//! raw shard; assignment streams every shard through the trained table and
//! appends each vector to its bucket shard on disk.

use crate::concurrency::StagePool;
use crate::config::IndexConfig;
use crate::error::{IvfPqError, Result};
use crate::kmeans::KMeans;
use crate::persistence::rows;
use crate::persistence::IndexLayout;
use crate::source::{ShardId, VectorSource};
use crate::vector::VectorSet;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tracing::{debug, info};

/// Trains, persists and loads the K coarse centroids.
#[derive(Debug, Clone)]
pub struct CoarseQuantizer {
    dim: usize,
    n_clusters: usize,
    iterations: usize,
    samples_per_centroid: usize,
    seed: u64,
    centroids: Option<VectorSet>,
}

impl CoarseQuantizer {
    /// Create an untrained quantizer from the index configuration.
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            dim: config.dim,
            n_clusters: config.n_clusters,
            iterations: config.coarse_iterations,
            samples_per_centroid: config.coarse_samples_per_centroid,
            seed: config.resolve_seed(),
            centroids: None,
        }
    }

    /// Wrap an existing centroid table.
    ///
    /// # Errors
    /// `EmptyInput` if the table is empty.
    pub fn from_centroids(centroids: VectorSet) -> Result<Self> {
        if centroids.is_empty() {
            return Err(IvfPqError::empty_input(1, 0));
        }
        Ok(Self {
            dim: centroids.dim(),
            n_clusters: centroids.len(),
            iterations: 0,
            samples_per_centroid: 0,
            seed: 0,
            centroids: Some(centroids),
        })
    }

    /// Load the persisted centroid table.
    ///
    /// # Errors
    /// `IndexNotBuilt` if the table has not been written yet.
    pub fn load(layout: &IndexLayout, dim: usize) -> Result<Self> {
        let centroids = match rows::read_centroids(&layout.centroids_path(), dim) {
            Err(IvfPqError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(IvfPqError::IndexNotBuilt)
            }
            other => other?,
        };
        Self::from_centroids(centroids)
    }

    /// Number of coarse centroids (K).
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Vector dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Return true once centroids are trained or loaded.
    pub fn is_trained(&self) -> bool {
        self.centroids.is_some()
    }

    /// The centroid table, position = centroid id.
    pub fn centroids(&self) -> Result<&VectorSet> {
        self.centroids.as_ref().ok_or(IvfPqError::IndexNotBuilt)
    }

    /// Most similar centroid to `vector` and its similarity. Ties go to the
    /// lowest centroid id.
    pub fn nearest(&self, vector: &[f32]) -> Result<(usize, f32)> {
        self.centroids()?.nearest(vector)
    }

    /// Records each shard contributes to the training sample.
    pub fn samples_per_shard(&self, shard_count: usize) -> usize {
        (self.n_clusters * self.samples_per_centroid).div_ceil(shard_count.max(1))
    }

    /// Train the centroid table on a uniform sample of every shard.
    ///
    /// # Errors
    /// `ShardTooSmall` if a shard holds fewer records than its share of the
    /// sample, plus any ingest or clustering error.
    pub fn train(&mut self, source: &dyn VectorSource, pool: &StagePool) -> Result<&VectorSet> {
        let shards = source.shards()?;
        if shards.is_empty() {
            return Err(IvfPqError::empty_input(self.n_clusters, 0));
        }
        let per_shard = self.samples_per_shard(shards.len());

        let samples = pool.run(shards, |shard| self.sample_shard(source, &shard, per_shard))?;
        let mut sample = VectorSet::with_capacity(self.dim, per_shard * samples.len());
        for part in &samples {
            sample.extend(part)?;
        }
        info!(
            samples = sample.len(),
            clusters = self.n_clusters,
            "training coarse centroids"
        );

        let mut kmeans = KMeans::new(self.n_clusters, self.iterations).with_seed(self.seed);
        pool.install(|| kmeans.fit(&sample))?;
        debug!(
            iterations = kmeans.iterations_run(),
            reseeds = kmeans.reseeds(),
            "coarse k-means finished"
        );

        Ok(&*self.centroids.insert(kmeans.into_centroids()))
    }

    fn sample_shard(
        &self,
        source: &dyn VectorSource,
        shard: &ShardId,
        per_shard: usize,
    ) -> Result<VectorSet> {
        let available = source.count_records(shard)?;
        if available < per_shard {
            return Err(IvfPqError::shard_too_small(&shard.name, per_shard, available));
        }

        let records = source.read_shard(shard)?;
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(shard.ordinal as u64));
        let mut picks = rand::seq::index::sample(&mut rng, records.len(), per_shard).into_vec();
        picks.sort_unstable();

        let mut sample = VectorSet::with_capacity(self.dim, per_shard);
        for i in picks {
            records[i].validate(self.dim)?;
            sample.push(&records[i].vector)?;
        }
        debug!(shard = %shard.name, sampled = sample.len(), "sampled shard");
        Ok(sample)
    }

    /// Assign every record to its nearest centroid, append it to that
    /// centroid's bucket shard, and persist the centroid table.
    ///
    /// Records without an explicit id get `base + row`, where `base` counts
    /// the records of every earlier shard. All K bucket shards are created,
    /// empty or not.
    ///
    /// Returns the row count of each bucket.
    ///
    /// # Errors
    /// `DuplicateId` if two records resolve to the same id, checked before
    /// any bucket shard is touched.
    pub fn assign_and_persist(
        &self,
        source: &dyn VectorSource,
        layout: &IndexLayout,
        pool: &StagePool,
    ) -> Result<Vec<usize>> {
        let centroids = self.centroids()?;

        let shards = source.shards()?;
        let ids = pool.run(shards.clone(), |shard| source.record_ids(&shard))?;
        let mut bases = Vec::with_capacity(ids.len());
        let mut next = 0u64;
        for shard_ids in &ids {
            bases.push(next);
            next += shard_ids.len() as u64;
        }
        check_unique_ids(&ids, &bases)?;

        layout.create_dirs()?;
        let writers = (0..self.n_clusters)
            .map(|c| -> Result<_> {
                Ok(Mutex::new(BufWriter::new(File::create(layout.bucket_path(c))?)))
            })
            .collect::<Result<Vec<_>>>()?;

        let tasks: Vec<(ShardId, u64)> = shards.into_iter().zip(bases).collect();
        let per_task = pool.run(tasks, |(shard, base)| {
            let records = source.read_shard(&shard)?;
            let mut buffers: Vec<Vec<u8>> = vec![Vec::new(); self.n_clusters];
            let mut sizes = vec![0usize; self.n_clusters];

            for (row, record) in records.iter().enumerate() {
                record.validate(self.dim)?;
                let id = record.id.unwrap_or(base + row as u64);
                let (c, _) = centroids.nearest(&record.vector)?;
                rows::write_vector_row(&mut buffers[c], id, &record.vector)?;
                sizes[c] += 1;
            }

            for (c, buf) in buffers.iter().enumerate() {
                if !buf.is_empty() {
                    writers[c].lock().write_all(buf)?;
                }
            }
            debug!(shard = %shard.name, records = records.len(), "assigned shard");
            Ok(sizes)
        })?;

        for writer in writers {
            writer.into_inner().flush()?;
        }
        rows::write_centroids(&layout.centroids_path(), centroids)?;

        let mut bucket_sizes = vec![0usize; self.n_clusters];
        for sizes in per_task {
            for (total, n) in bucket_sizes.iter_mut().zip(sizes) {
                *total += n;
            }
        }
        info!(
            vectors = bucket_sizes.iter().sum::<usize>(),
            buckets = self.n_clusters,
            "persisted coarse buckets"
        );
        Ok(bucket_sizes)
    }
}

/// Fail with `DuplicateId` unless every record resolves to a distinct id.
///
/// `ids[s][row]` is the explicit id of a record or `None`, and `bases[s]` is
/// the implicit id of the first row of shard `s`. An explicit id collides
/// with another explicit id, or with the implicit id of the row at that
/// global position when that row carries no id of its own.
fn check_unique_ids(ids: &[Vec<Option<u64>>], bases: &[u64]) -> Result<()> {
    let ends: Vec<u64> = ids
        .iter()
        .zip(bases)
        .map(|(shard_ids, base)| base + shard_ids.len() as u64)
        .collect();

    let mut explicit = HashSet::new();
    for id in ids.iter().flatten().filter_map(|id| *id) {
        if !explicit.insert(id) {
            return Err(IvfPqError::DuplicateId(id));
        }
        let shard = ends.partition_point(|&end| end <= id);
        if let Some(shard_ids) = ids.get(shard) {
            let row = (id - bases[shard]) as usize;
            if matches!(shard_ids.get(row), Some(None)) {
                return Err(IvfPqError::DuplicateId(id));
            }
        }
    }
    Ok(())
}

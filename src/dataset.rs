//! Dataset utilities for generating and evaluating vector search.

use crate::distance;
use crate::error::{IvfPqError, Result};
use crate::source::MemorySource;
use crate::vector::Vector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// A dataset containing vectors, queries, and ground truth for evaluation.
pub struct Dataset {
    pub vectors: Vec<Vector>,
    pub queries: Vec<Vector>,
    pub ground_truth: Vec<Vec<u64>>,
}

impl Dataset {
    /// Generate a seeded synthetic dataset with `n_centers` directions.
    ///
    /// Every vector and query is a random center plus uniform noise of
    /// amplitude `|spread|` per coordinate; a non-finite spread means no noise.
    /// Vector ids are their positions.
    pub fn generate_clustered(
        n_vectors: usize,
        n_queries: usize,
        dim: usize,
        n_centers: usize,
        spread: f32,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let centers: Vec<Vector> = (0..n_centers.max(1))
            .map(|_| Vector::random(&mut rng, dim))
            .collect();

        let spread = if spread.is_finite() { spread.abs() } else { 0.0 };
        let draw = |rng: &mut StdRng| loop {
            let center = &centers[rng.gen_range(0..centers.len())];
            let data: Vec<f32> = center
                .as_slice()
                .iter()
                .map(|c| c + rng.gen_range(-spread..=spread))
                .collect();
            if !distance::is_zero(&data) {
                return Vector::new(data);
            }
        };

        let vectors = (0..n_vectors).map(|_| draw(&mut rng)).collect();
        let queries = (0..n_queries).map(|_| draw(&mut rng)).collect();

        Self {
            vectors,
            queries,
            ground_truth: Vec::new(),
        }
    }

    /// Compute exact top-`k` ids per query by cosine similarity.
    pub fn compute_ground_truth(&mut self, k: usize) -> Result<()> {
        let mut truth = Vec::with_capacity(self.queries.len());
        for query in &self.queries {
            let mut scored = Vec::with_capacity(self.vectors.len());
            for (id, v) in self.vectors.iter().enumerate() {
                scored.push((id as u64, query.similarity(v)?));
            }
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            truth.push(scored.into_iter().take(k).map(|(id, _)| id).collect());
        }
        self.ground_truth = truth;
        Ok(())
    }

    /// Serve the vectors from memory, split into `n_shards` shards.
    pub fn to_source(&self, n_shards: usize) -> MemorySource {
        let rows = self.vectors.iter().map(|v| v.as_slice().to_vec()).collect();
        MemorySource::from_vectors(rows, n_shards)
    }

    /// Write the vectors as `n_shards` text shards `0.<ext>`, `1.<ext>`, ...
    /// under `dir`, one `v1,...,vD` row per vector.
    pub fn write_shards(&self, dir: &Path, n_shards: usize, ext: &str) -> Result<()> {
        if n_shards == 0 {
            return Err(IvfPqError::invalid_parameter("n_shards must be greater than zero"));
        }
        fs::create_dir_all(dir)?;
        let per_shard = self.vectors.len().div_ceil(n_shards).max(1);
        for (shard, chunk) in self.vectors.chunks(per_shard).enumerate() {
            let mut out = BufWriter::new(File::create(dir.join(format!("{}.{}", shard, ext)))?);
            for v in chunk {
                let row: Vec<String> = v.as_slice().iter().map(|x| x.to_string()).collect();
                writeln!(out, "{}", row.join(","))?;
            }
            out.flush()?;
        }
        Ok(())
    }
}

/// Compute recall@k between predicted and ground truth results.
///
/// Recall is the fraction of true nearest neighbors that were found.
/// Returns a value between 0.0 and 1.0.
pub fn recall_at_k(predicted: &[u64], ground_truth: &[u64], k: usize) -> f32 {
    if k == 0 {
        return 0.0;
    }
    let pred_set: HashSet<u64> = predicted.iter().take(k).copied().collect();
    let truth_set: HashSet<u64> = ground_truth.iter().take(k).copied().collect();

    let intersection = pred_set.intersection(&truth_set).count();
    intersection as f32 / k as f32
}

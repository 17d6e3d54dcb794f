//! K-Means clustering for coarse partitioning and PQ codebooks.
//!
//! Implements Lloyd's algorithm over the crate's cosine similarity: each
//! vector joins the centroid it is *most similar* to, then every centroid
//! becomes the mean of its members. Initialization picks K distinct input
//! vectors uniformly at random from a seeded generator.
//!
//! A centroid that ends an iteration with no members, or whose mean has zero
//! norm, is reseeded deterministically: input vectors are ranked by their
//! similarity to their own centroid (worst fit first, ties by lower index),
//! and each degenerate centroid in ascending order takes the next vector of
//! that ranking.

use crate::distance;
use crate::error::{IvfPqError, Result};
use crate::vector::{Vector, VectorSet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::cmp::Ordering;
use tracing::debug;

/// K-Means clustering algorithm.
///
/// The assignment step is parallel over input vectors and the update step
/// is parallel over centroids; the two are separated by a full barrier in
/// every iteration. Member sums are accumulated in input order, so a fixed
/// seed reproduces the same centroids bit for bit.
pub struct KMeans {
    /// The computed cluster centroids.
    centroids: VectorSet,
    /// Number of clusters.
    k: usize,
    /// Iteration budget.
    max_iters: usize,
    /// Seed for the initial centroid draw.
    seed: u64,
    /// Iterations actually executed by the last fit.
    iterations_run: usize,
    /// Centroids reseeded during the last fit.
    reseeds: usize,
}

impl KMeans {
    /// Create a new K-Means instance with a random seed.
    ///
    /// # Arguments
    /// * `k` - Number of clusters
    /// * `max_iters` - Iteration budget
    pub fn new(k: usize, max_iters: usize) -> Self {
        Self {
            centroids: VectorSet::new(0),
            k,
            max_iters,
            seed: rand::random(),
            iterations_run: 0,
            reseeds: 0,
        }
    }

    /// Fix the seed used to draw the initial centroids.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Create a model around an existing centroid table (no training).
    pub fn from_centroids(centroids: VectorSet) -> Self {
        let k = centroids.len();
        Self {
            centroids,
            k,
            max_iters: 0,
            seed: 0,
            iterations_run: 0,
            reseeds: 0,
        }
    }

    /// The computed centroids, position = centroid id.
    pub fn centroids(&self) -> &VectorSet {
        &self.centroids
    }

    /// Consume the model and return its centroids.
    pub fn into_centroids(self) -> VectorSet {
        self.centroids
    }

    /// Iterations executed by the last fit (may stop early at a fixed point).
    pub fn iterations_run(&self) -> usize {
        self.iterations_run
    }

    /// Number of centroid reseeds performed by the last fit.
    pub fn reseeds(&self) -> usize {
        self.reseeds
    }

    /// Fit the model starting from K randomly chosen input vectors.
    ///
    /// # Errors
    /// `EmptyInput` if `vectors` is empty, `k` is zero or `k > vectors.len()`;
    /// `DegenerateVector` if an input vector has zero norm.
    pub fn fit(&mut self, vectors: &VectorSet) -> Result<()> {
        self.check_input(vectors)?;
        let initial = self.random_init(vectors)?;
        self.fit_from(vectors, initial)
    }

    /// Fit the model starting from the given initial centroids.
    ///
    /// Runs without any randomness, so repeated calls with the same inputs
    /// produce identical centroids and assignments.
    pub fn fit_from(&mut self, vectors: &VectorSet, initial: VectorSet) -> Result<()> {
        self.check_input(vectors)?;
        if initial.len() != self.k {
            return Err(IvfPqError::invalid_parameter(format!(
                "expected {} initial centroids, got {}",
                self.k,
                initial.len()
            )));
        }
        if initial.dim() != vectors.dim() {
            return Err(IvfPqError::dimension_mismatch(vectors.dim(), initial.dim()));
        }

        self.centroids = initial;
        self.iterations_run = 0;
        self.reseeds = 0;

        // Labels of the previous iteration, kept only when it did not reseed.
        let mut previous: Option<Vec<usize>> = None;

        for _ in 0..self.max_iters {
            let scored = self.assign_scored(vectors)?;
            let reseeded = self.update_centroids(vectors, &scored)?;
            self.iterations_run += 1;
            self.reseeds += reseeded;

            let labels: Vec<usize> = scored.iter().map(|&(c, _)| c).collect();
            if reseeded == 0 && previous.as_ref() == Some(&labels) {
                // Same groups as last time: centroids are at a fixed point.
                break;
            }
            previous = if reseeded == 0 { Some(labels) } else { None };
        }

        Ok(())
    }

    fn check_input(&self, vectors: &VectorSet) -> Result<()> {
        if vectors.is_empty() || self.k == 0 || self.k > vectors.len() {
            return Err(IvfPqError::empty_input(self.k, vectors.len()));
        }
        Ok(())
    }

    /// Choose K distinct input vectors uniformly at random.
    fn random_init(&self, vectors: &VectorSet) -> Result<VectorSet> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let picks = rand::seq::index::sample(&mut rng, vectors.len(), self.k);

        let mut centroids = VectorSet::with_capacity(vectors.dim(), self.k);
        for idx in picks.into_iter() {
            centroids.push(vectors.row(idx))?;
        }
        Ok(centroids)
    }

    /// Assign every vector to its most similar centroid.
    ///
    /// Returns `(centroid, similarity)` per input vector.
    fn assign_scored(&self, vectors: &VectorSet) -> Result<Vec<(usize, f32)>> {
        (0..vectors.len())
            .into_par_iter()
            .map(|i| self.centroids.nearest(vectors.row(i)))
            .collect()
    }

    /// Replace every centroid by the mean of its members.
    ///
    /// Returns the number of centroids that had to be reseeded.
    fn update_centroids(&mut self, vectors: &VectorSet, scored: &[(usize, f32)]) -> Result<usize> {
        let dim = vectors.dim();

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); self.k];
        for (i, &(c, _)) in scored.iter().enumerate() {
            members[c].push(i);
        }

        let means: Vec<Option<Vector>> = members
            .par_iter()
            .map(|cluster| {
                if cluster.is_empty() {
                    return Ok(None);
                }
                let mut mean = Vector::zeros(dim);
                mean.zero_fill();
                for &i in cluster {
                    mean.add(vectors.row(i))?;
                }
                mean.divide_by_scalar(cluster.len() as f32)?;
                let slice = mean.as_slice();
                if distance::is_zero(slice) || !distance::is_finite(slice) {
                    return Ok(None);
                }
                Ok(Some(mean))
            })
            .collect::<Result<_>>()?;

        let mut degenerate = Vec::new();
        for (c, mean) in means.into_iter().enumerate() {
            match mean {
                Some(mean) => self.centroids.row_mut(c).copy_from_slice(mean.as_slice()),
                None => degenerate.push(c),
            }
        }

        if degenerate.is_empty() {
            return Ok(0);
        }

        // Worst-fitting vectors first; ties keep input order.
        let mut ranking: Vec<usize> = (0..scored.len()).collect();
        ranking.sort_by(|&a, &b| {
            scored[a]
                .1
                .partial_cmp(&scored[b].1)
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });
        let mut candidates = ranking.into_iter();

        for &c in &degenerate {
            let pick = candidates.next().ok_or(IvfPqError::EmptyCluster(c))?;
            debug!(centroid = c, vector = pick, "reseeding degenerate centroid");
            self.centroids.row_mut(c).copy_from_slice(vectors.row(pick));
        }

        Ok(degenerate.len())
    }

    /// Assign each vector to its most similar centroid.
    ///
    /// Returns a vector of centroid indices, one per input vector.
    pub fn assign(&self, vectors: &VectorSet) -> Result<Vec<usize>> {
        if self.centroids.is_empty() {
            return Err(IvfPqError::empty_input(self.k, 0));
        }
        Ok(self
            .assign_scored(vectors)?
            .into_iter()
            .map(|(c, _)| c)
            .collect())
    }

    /// Most similar centroid to `query` and its similarity.
    ///
    /// Ties go to the lowest centroid index.
    pub fn nearest(&self, query: &[f32]) -> Result<(usize, f32)> {
        self.centroids.nearest(query)
    }
}

//! IVF-PQ Index: Inverted File with Product Quantization.
//!
//! A read-only handle over an index generation written by
//! [`IvfPqIndexBuilder`](super::ivf_pq_builder::IvfPqIndexBuilder).
//!
//! Search process:
//! 1. Load the centroid table and codebooks on first use (then cached)
//! 2. Route the query to its most similar coarse centroid
//! 3. Build the PQ similarity table for the query (shifted by that centroid
//!    in residual mode)
//! 4. Stream the bucket's code shard, scoring each row with M lookups
//! 5. Return the best-scoring rows
//!
//! Raw vectors are never read or reconstructed on the search path.

use super::traits::{SearchResult, VectorIndex};
use crate::config::IndexConfig;
use crate::constants::layout::DEFAULT_EXTENSION;
use crate::error::{IvfPqError, Result};
use crate::index::ivf::CoarseQuantizer;
use crate::metrics::SearchStatistics;
use crate::persistence::{IndexLayout, IndexManifest};
use crate::pq::ProductQuantizer;
use crate::types::VectorId;
use parking_lot::RwLock;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Centroid table and codebooks, loaded once per handle.
#[derive(Debug)]
struct Models {
    coarse: CoarseQuantizer,
    pq: ProductQuantizer,
}

/// A scored row during the bucket scan.
///
/// Greater means better: higher score, then earlier in the shard.
#[derive(Clone, Copy)]
struct Candidate {
    score: f32,
    seq: usize,
    id: VectorId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// IVF-PQ index handle for approximate nearest neighbor search.
///
/// Opening reads only the manifest. The centroid table and codebooks are
/// loaded by the first search behind a double-checked lock and are never
/// modified afterwards, so any number of threads can search one handle.
pub struct IvfPqIndex {
    layout: IndexLayout,
    manifest: IndexManifest,
    models: RwLock<Option<Arc<Models>>>,
}

impl IvfPqIndex {
    /// Open the index generation under `root`.
    ///
    /// # Errors
    /// `IndexNotBuilt` if no build has completed under `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let manifest = IndexManifest::load(&IndexLayout::new(&root, DEFAULT_EXTENSION))?;
        manifest.config.validate()?;
        let layout = IndexLayout::new(root, manifest.config.file_extension.clone());
        debug!(
            root = %layout.root().display(),
            vectors = manifest.total_vectors,
            "opened index"
        );
        Ok(Self {
            layout,
            manifest,
            models: RwLock::new(None),
        })
    }

    /// Configuration the index was built with.
    pub fn config(&self) -> &IndexConfig {
        &self.manifest.config
    }

    /// The build manifest.
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Paths of the index tables.
    pub fn layout(&self) -> &IndexLayout {
        &self.layout
    }

    /// Return true once the centroid and codebook caches are loaded.
    pub fn is_loaded(&self) -> bool {
        self.models.read().is_some()
    }

    fn models(&self) -> Result<Arc<Models>> {
        if let Some(models) = self.models.read().as_ref() {
            return Ok(Arc::clone(models));
        }

        let mut slot = self.models.write();
        if let Some(models) = slot.as_ref() {
            return Ok(Arc::clone(models));
        }

        let config = &self.manifest.config;
        let coarse = CoarseQuantizer::load(&self.layout, config.dim)?;
        if coarse.n_clusters() != config.n_clusters {
            return Err(IvfPqError::invalid_format(format!(
                "centroid table has {} rows, manifest expects {}",
                coarse.n_clusters(),
                config.n_clusters
            )));
        }
        let pq = ProductQuantizer::load(&self.layout, config)?;
        info!(
            clusters = coarse.n_clusters(),
            segments = config.n_segments,
            "loaded centroid and codebook caches"
        );

        let models = Arc::new(Models { coarse, pq });
        *slot = Some(Arc::clone(&models));
        Ok(models)
    }

    /// Most similar coarse centroid to `query` and its similarity.
    pub fn route(&self, query: &[f32]) -> Result<(usize, f32)> {
        self.check_query(query)?;
        self.models()?.coarse.nearest(query)
    }

    fn check_query(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.manifest.config.dim {
            return Err(IvfPqError::dimension_mismatch(
                self.manifest.config.dim,
                query.len(),
            ));
        }
        Ok(())
    }

    /// Score the routed bucket and keep the `k` best rows, best first.
    fn scan(&self, query: &[f32], k: usize) -> Result<(Vec<SearchResult>, SearchStatistics)> {
        let start = Instant::now();
        self.check_query(query)?;

        let models = self.models()?;
        let centroids = models.coarse.centroids()?;
        let (bucket, coarse_similarity) = centroids.nearest(query)?;
        let table = models
            .pq
            .build_distance_table(query, Some(centroids.row(bucket)))?;

        let config = &self.manifest.config;
        let reader = self
            .layout
            .open_code_shard(bucket, config.n_segments, config.pq_num)?;

        let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);
        let mut rows_scanned = 0;
        for row in reader {
            let row = row?;
            let candidate = Candidate {
                score: table.score(&row.codes),
                seq: rows_scanned,
                id: row.id,
            };
            rows_scanned += 1;
            if k == 0 {
                continue;
            }
            if heap.len() < k {
                heap.push(Reverse(candidate));
            } else if heap.peek().is_some_and(|worst| candidate > worst.0) {
                heap.pop();
                heap.push(Reverse(candidate));
            }
        }

        let residual = config.residual;
        let results = heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(c)| SearchResult::new(c.id, c.score, coarse_similarity, residual))
            .collect();

        let stats = SearchStatistics {
            query_time: start.elapsed(),
            bucket,
            coarse_similarity,
            rows_scanned,
        };
        debug!(bucket, rows = rows_scanned, "scanned bucket");
        Ok((results, stats))
    }

    /// Best-scoring indexed vector for `query`.
    ///
    /// Returns `None` when the selected bucket is empty.
    ///
    /// # Errors
    /// `DimensionMismatch` for a query of the wrong length,
    /// `DegenerateVector` for a zero query, `BucketNotFound` if the selected
    /// code shard is missing.
    pub fn search(&self, query: &[f32]) -> Result<Option<SearchResult>> {
        Ok(self.scan(query, 1)?.0.into_iter().next())
    }

    /// Up to `k` best-scoring vectors of the selected bucket, best first.
    /// Equal scores keep shard order.
    pub fn search_top_k(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        Ok(self.scan(query, k)?.0)
    }

    /// Search and report how the query was served.
    pub fn search_with_stats(&self, query: &[f32]) -> Result<(Option<SearchResult>, SearchStatistics)> {
        let (results, stats) = self.scan(query, 1)?;
        Ok((results.into_iter().next(), stats))
    }
}

impl VectorIndex for IvfPqIndex {
    fn search(&self, query: &[f32]) -> Result<Option<SearchResult>> {
        IvfPqIndex::search(self, query)
    }

    fn search_top_k(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        IvfPqIndex::search_top_k(self, query, k)
    }

    fn len(&self) -> usize {
        self.manifest.total_vectors
    }

    fn dimension(&self) -> usize {
        self.manifest.config.dim
    }
}

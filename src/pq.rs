//! Product Quantization for vector compression.
//!
//! Product Quantization (PQ) compresses vectors by splitting them into
//! subvectors and quantizing each subspace independently.
//!
//! Key concepts:
//! - Split D-dimensional vectors into M contiguous segments of D/M dimensions
//! - Train `pq_num` centroids (codebook) for each segment using k-means
//! - Encode each vector as M codes (one codebook index per segment)
//! - Use asymmetric scoring: the query stays uncompressed, the database is
//!   compressed, and a per-segment table turns scoring into M lookups
//!
//! In residual mode every vector is shifted by its coarse centroid before it
//! is split, at training, encoding and query time alike.
//!
//! A segment with zero norm has no direction to compare. It is left out of
//! training, encodes as code 0 and contributes nothing to a query score.

use crate::concurrency::StagePool;
use crate::config::IndexConfig;
use crate::distance;
use crate::error::{IvfPqError, Result};
use crate::index::ivf::CoarseQuantizer;
use crate::kmeans::KMeans;
use crate::persistence::rows;
use crate::persistence::IndexLayout;
use crate::types::{CodeRow, Codes};
use crate::vector::VectorSet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tracing::{debug, info};

/// The M segment codebooks of a trained quantizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Codebook {
    segments: Vec<VectorSet>,
    pq_num: usize,
    segment_dim: usize,
}

impl Codebook {
    /// Wrap trained segment codebooks.
    ///
    /// # Errors
    /// `InvalidParameter` if there are no segments or the segments disagree
    /// on size or dimension.
    pub fn new(segments: Vec<VectorSet>) -> Result<Self> {
        let first = segments
            .first()
            .ok_or_else(|| IvfPqError::invalid_parameter("codebook needs at least one segment"))?;
        let pq_num = first.len();
        let segment_dim = first.dim();
        if pq_num == 0 || pq_num > crate::constants::pq::MAX_CODEBOOK_SIZE {
            return Err(IvfPqError::invalid_parameter(format!(
                "codebook size {} out of range",
                pq_num
            )));
        }
        for (m, segment) in segments.iter().enumerate() {
            if segment.len() != pq_num || segment.dim() != segment_dim {
                return Err(IvfPqError::invalid_parameter(format!(
                    "segment {} is {}x{}, expected {}x{}",
                    m,
                    segment.len(),
                    segment.dim(),
                    pq_num,
                    segment_dim
                )));
            }
        }
        Ok(Self {
            segments,
            pq_num,
            segment_dim,
        })
    }

    /// Number of segments (M).
    pub fn n_segments(&self) -> usize {
        self.segments.len()
    }

    /// Entries per segment.
    pub fn pq_num(&self) -> usize {
        self.pq_num
    }

    /// Width of one segment (D / M).
    pub fn segment_dim(&self) -> usize {
        self.segment_dim
    }

    /// Full vector dimension.
    pub fn dim(&self) -> usize {
        self.segment_dim * self.segments.len()
    }

    /// Codebook of segment `m`.
    pub fn segment(&self, m: usize) -> &VectorSet {
        &self.segments[m]
    }

    /// All segment codebooks in order.
    pub fn segments(&self) -> &[VectorSet] {
        &self.segments
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim() {
            return Err(IvfPqError::dimension_mismatch(self.dim(), vector.len()));
        }
        Ok(())
    }

    /// Encode a vector into M codes, each the most similar entry of its
    /// segment codebook (ties go to the lowest entry).
    pub fn encode(&self, vector: &[f32]) -> Result<Codes> {
        self.check_dim(vector)?;
        let mut codes = Codes::with_capacity(self.segments.len());
        for (segment, sub) in self.segments.iter().zip(vector.chunks_exact(self.segment_dim)) {
            let code = if distance::is_zero(sub) {
                0
            } else {
                segment.nearest(sub)?.0
            };
            codes.push(code as u16);
        }
        Ok(codes)
    }

    /// Concatenate the codebook entries selected by `codes`.
    pub fn decode(&self, codes: &[u16]) -> Result<Vec<f32>> {
        if codes.len() != self.segments.len() {
            return Err(IvfPqError::dimension_mismatch(self.segments.len(), codes.len()));
        }
        let mut out = Vec::with_capacity(self.dim());
        for (segment, &code) in self.segments.iter().zip(codes) {
            if code as usize >= self.pq_num {
                return Err(IvfPqError::invalid_parameter(format!(
                    "code {} out of range for codebook size {}",
                    code, self.pq_num
                )));
            }
            out.extend_from_slice(segment.row(code as usize));
        }
        Ok(out)
    }

    /// Per-segment similarity of `query` against every codebook entry.
    pub fn distance_table(&self, query: &[f32]) -> Result<DistanceTable> {
        self.check_dim(query)?;
        let mut scores = Vec::with_capacity(self.segments.len() * self.pq_num);
        for (segment, sub) in self.segments.iter().zip(query.chunks_exact(self.segment_dim)) {
            if distance::is_zero(sub) {
                scores.extend(std::iter::repeat(0.0).take(self.pq_num));
                continue;
            }
            for entry in segment.rows() {
                scores.push(distance::similarity(sub, entry)?);
            }
        }
        Ok(DistanceTable {
            n_segments: self.segments.len(),
            pq_num: self.pq_num,
            scores,
        })
    }
}

/// Precomputed M x `pq_num` similarity table for one query.
///
/// Layout: [segment0: pq_num floats][segment1: pq_num floats]...
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceTable {
    n_segments: usize,
    pq_num: usize,
    scores: Vec<f32>,
}

impl DistanceTable {
    /// Number of segments (M).
    pub fn n_segments(&self) -> usize {
        self.n_segments
    }

    /// Entries per segment.
    pub fn pq_num(&self) -> usize {
        self.pq_num
    }

    /// Similarity of the query's segment `m` to codebook entry `code`.
    #[inline]
    pub fn get(&self, m: usize, code: u16) -> f32 {
        self.scores[m * self.pq_num + code as usize]
    }

    /// Approximate similarity of a coded vector: the sum of its M lookups.
    ///
    /// # Panics
    /// Panics if a code is out of range; code rows are range-checked when
    /// they are parsed.
    #[inline]
    pub fn score(&self, codes: &[u16]) -> f32 {
        codes
            .iter()
            .enumerate()
            .map(|(m, &code)| self.get(m, code))
            .sum()
    }
}

/// Trains, applies, persists and loads the segment codebooks.
#[derive(Debug, Clone)]
pub struct ProductQuantizer {
    dim: usize,
    n_segments: usize,
    pq_num: usize,
    iterations: usize,
    samples_per_bucket: usize,
    residual: bool,
    seed: u64,
    codebook: Option<Codebook>,
}

impl ProductQuantizer {
    /// Create an untrained quantizer from the index configuration.
    ///
    /// # Errors
    /// `UnevenSegments` if the dimension does not split into `n_segments`
    /// equal segments.
    pub fn new(config: &IndexConfig) -> Result<Self> {
        if config.n_segments == 0 || config.dim % config.n_segments != 0 {
            return Err(IvfPqError::UnevenSegments {
                dim: config.dim,
                segments: config.n_segments,
            });
        }
        Ok(Self {
            dim: config.dim,
            n_segments: config.n_segments,
            pq_num: config.pq_num,
            iterations: config.pq_iterations,
            samples_per_bucket: config.pq_samples_per_bucket,
            residual: config.residual,
            seed: config.resolve_seed(),
            codebook: None,
        })
    }

    /// Wrap an existing codebook.
    pub fn with_codebook(codebook: Codebook, residual: bool) -> Self {
        Self {
            dim: codebook.dim(),
            n_segments: codebook.n_segments(),
            pq_num: codebook.pq_num(),
            iterations: 0,
            samples_per_bucket: 0,
            residual,
            seed: 0,
            codebook: Some(codebook),
        }
    }

    /// Load the persisted codebook table.
    ///
    /// # Errors
    /// `IndexNotBuilt` if the table has not been written yet.
    pub fn load(layout: &IndexLayout, config: &IndexConfig) -> Result<Self> {
        let mut quantizer = Self::new(config)?;
        let segments = match rows::read_codebook(
            &layout.codebook_path(),
            quantizer.n_segments,
            quantizer.pq_num,
            config.segment_dim(),
        ) {
            Err(IvfPqError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(IvfPqError::IndexNotBuilt)
            }
            other => other?,
        };
        quantizer.codebook = Some(Codebook::new(segments)?);
        Ok(quantizer)
    }

    /// Return true if vectors are shifted by their coarse centroid.
    pub fn residual(&self) -> bool {
        self.residual
    }

    /// Return true once the codebook is trained or loaded.
    pub fn is_trained(&self) -> bool {
        self.codebook.is_some()
    }

    /// The trained codebook.
    ///
    /// # Errors
    /// `UntrainedCodebook` before training or loading.
    pub fn codebook(&self) -> Result<&Codebook> {
        self.codebook.as_ref().ok_or(IvfPqError::UntrainedCodebook)
    }

    /// Shift `vector` by `centroid` in residual mode; pass it through otherwise.
    fn prepare<'a>(&self, vector: &'a [f32], centroid: Option<&[f32]>) -> Result<Cow<'a, [f32]>> {
        if vector.len() != self.dim {
            return Err(IvfPqError::dimension_mismatch(self.dim, vector.len()));
        }
        if !self.residual {
            return Ok(Cow::Borrowed(vector));
        }
        let centroid = centroid.ok_or_else(|| {
            IvfPqError::invalid_parameter("residual quantizer needs the coarse centroid")
        })?;
        if centroid.len() != self.dim {
            return Err(IvfPqError::dimension_mismatch(self.dim, centroid.len()));
        }
        Ok(Cow::Owned(
            vector.iter().zip(centroid).map(|(v, c)| v - c).collect(),
        ))
    }

    /// Encode a vector; `centroid` is its bucket's coarse centroid and is
    /// required in residual mode.
    ///
    /// # Errors
    /// `UntrainedCodebook` before training or loading.
    pub fn encode(&self, vector: &[f32], centroid: Option<&[f32]>) -> Result<Codes> {
        let codebook = self.codebook()?;
        codebook.encode(&self.prepare(vector, centroid)?)
    }

    /// Build the M x `pq_num` similarity table for a query routed to the
    /// bucket of `centroid`.
    ///
    /// # Errors
    /// `UntrainedCodebook` before training or loading.
    pub fn build_distance_table(
        &self,
        query: &[f32],
        centroid: Option<&[f32]>,
    ) -> Result<DistanceTable> {
        let codebook = self.codebook()?;
        codebook.distance_table(&self.prepare(query, centroid)?)
    }

    /// Train every segment codebook on a sample of the persisted buckets.
    ///
    /// The coarse stage must have finished: the centroid table and all bucket
    /// shards are read back from `layout`. Each bucket contributes up to
    /// `samples_per_bucket` rows. Segments train independently on `training`.
    pub fn train(
        &mut self,
        layout: &IndexLayout,
        sampling: &StagePool,
        training: &StagePool,
    ) -> Result<&Codebook> {
        let coarse = CoarseQuantizer::load(layout, self.dim)?;
        let centroids = coarse.centroids()?;

        let buckets: Vec<usize> = (0..centroids.len()).collect();
        let parts = sampling.run(buckets, |c| self.sample_bucket(layout, centroids, c))?;
        let mut sample = VectorSet::new(self.dim);
        for part in &parts {
            sample.extend(part)?;
        }
        info!(
            samples = sample.len(),
            segments = self.n_segments,
            pq_num = self.pq_num,
            residual = self.residual,
            "training PQ codebooks"
        );

        let segments = training.run((0..self.n_segments).collect(), |m| {
            self.train_segment(&sample, m)
        })?;
        Ok(&*self.codebook.insert(Codebook::new(segments)?))
    }

    fn sample_bucket(&self, layout: &IndexLayout, centroids: &VectorSet, c: usize) -> Result<VectorSet> {
        let bucket = layout.read_bucket(c, self.dim)?;
        let take = self.samples_per_bucket.min(bucket.len());
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(c as u64));
        let mut picks = rand::seq::index::sample(&mut rng, bucket.len(), take).into_vec();
        picks.sort_unstable();

        let mut sample = VectorSet::with_capacity(self.dim, take);
        for i in picks {
            sample.push(bucket.vectors.row(i))?;
        }
        if self.residual {
            sample.subtract_from_all(centroids.row(c))?;
        }
        debug!(bucket = c, sampled = sample.len(), "sampled bucket");
        Ok(sample)
    }

    fn train_segment(&self, sample: &VectorSet, m: usize) -> Result<VectorSet> {
        let seg_dim = self.dim / self.n_segments;
        let columns = sample.slice_columns(m * seg_dim, (m + 1) * seg_dim)?;
        let mut directional = VectorSet::with_capacity(seg_dim, columns.len());
        for row in columns.rows() {
            if !distance::is_zero(row) {
                directional.push(row)?;
            }
        }

        let mut kmeans = KMeans::new(self.pq_num, self.iterations)
            .with_seed(self.seed.wrapping_add(m as u64));
        kmeans.fit(&directional)?;
        debug!(
            segment = m,
            samples = directional.len(),
            iterations = kmeans.iterations_run(),
            reseeds = kmeans.reseeds(),
            "trained segment codebook"
        );
        Ok(kmeans.into_centroids())
    }

    /// Write the combined codebook table.
    pub fn persist_codebook(&self, layout: &IndexLayout) -> Result<()> {
        rows::write_codebook(&layout.codebook_path(), self.codebook()?.segments())
    }

    /// Encode every member of every bucket into that bucket's code shard,
    /// then persist the codebook table.
    ///
    /// Each code shard is written by exactly one task. Returns the row count
    /// of each code shard.
    pub fn encode_and_persist_all(
        &self,
        layout: &IndexLayout,
        centroids: &VectorSet,
        pool: &StagePool,
    ) -> Result<Vec<usize>> {
        self.codebook()?;
        layout.create_dirs()?;

        let buckets: Vec<usize> = (0..centroids.len()).collect();
        let code_rows = pool.run(buckets, |c| {
            let bucket = layout.read_bucket(c, self.dim)?;
            let centroid = centroids.row(c);
            let mut out = BufWriter::new(File::create(layout.code_path(c))?);
            for (id, vector) in bucket.ids.iter().zip(bucket.vectors.rows()) {
                let codes = self.encode(vector, Some(centroid))?;
                rows::write_code_row(&mut out, &CodeRow::new(*id, codes))?;
            }
            out.flush()?;
            debug!(bucket = c, rows = bucket.len(), "encoded bucket");
            Ok(bucket.len())
        })?;

        self.persist_codebook(layout)?;
        info!(
            rows = code_rows.iter().sum::<usize>(),
            buckets = code_rows.len(),
            "persisted PQ codes"
        );
        Ok(code_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_segment_codebook() -> Codebook {
        Codebook::new(vec![
            VectorSet::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap(),
            VectorSet::from_rows(&[vec![1.0, 1.0], vec![-1.0, 0.0]]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_codebook_shape_checked() {
        assert!(Codebook::new(vec![]).is_err());
        let err = Codebook::new(vec![
            VectorSet::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap(),
            VectorSet::from_rows(&[vec![1.0, 1.0]]).unwrap(),
        ]);
        assert!(matches!(err, Err(IvfPqError::InvalidParameter(_))));
    }

    #[test]
    fn test_encode_picks_most_similar() {
        let codebook = two_segment_codebook();
        let codes = codebook.encode(&[0.1, 2.0, -3.0, 0.5]).unwrap();
        assert_eq!(codes.as_slice(), &[1, 1]);
        let codes = codebook.encode(&[5.0, 0.0, 2.0, 2.5]).unwrap();
        assert_eq!(codes.as_slice(), &[0, 0]);
        assert!(codebook.encode(&[1.0, 0.0]).is_err());
    }

    #[test]
    fn test_zero_segment_encodes_as_zero() {
        let codebook = two_segment_codebook();
        let codes = codebook.encode(&[0.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(codes.as_slice(), &[1, 0]);

        let table = codebook.distance_table(&[0.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(table.get(1, 0), 0.0);
        assert_eq!(table.get(1, 1), 0.0);
    }

    #[test]
    fn test_decode() {
        let codebook = two_segment_codebook();
        assert_eq!(codebook.decode(&[1, 0]).unwrap(), vec![0.0, 1.0, 1.0, 1.0]);
        assert!(codebook.decode(&[2, 0]).is_err());
        assert!(codebook.decode(&[0]).is_err());
    }

    #[test]
    fn test_distance_table_scores() {
        let codebook = two_segment_codebook();
        let query = [1.0, 0.0, 1.0, 1.0];
        let table = codebook.distance_table(&query).unwrap();
        assert_eq!(table.n_segments(), 2);
        assert_eq!(table.pq_num(), 2);
        assert!((table.get(0, 0) - 1.0).abs() < 1e-6);
        assert!(table.get(0, 1).abs() < 1e-6);
        assert!((table.get(1, 0) - 1.0).abs() < 1e-6);

        let best = table.score(&[0, 0]);
        assert!((best - 2.0).abs() < 1e-6);
        assert!(table.score(&[1, 1]) < best);
    }

    #[test]
    fn test_uneven_segments() {
        let config = IndexConfig::new(6, 2, 4, 2);
        assert!(matches!(
            ProductQuantizer::new(&config),
            Err(IvfPqError::UnevenSegments { dim: 6, segments: 4 })
        ));
    }

    #[test]
    fn test_untrained_codebook() {
        let pq = ProductQuantizer::new(&IndexConfig::new(4, 2, 2, 2)).unwrap();
        assert!(!pq.is_trained());
        assert!(matches!(
            pq.encode(&[1.0, 0.0, 0.0, 1.0], None),
            Err(IvfPqError::UntrainedCodebook)
        ));
        assert!(matches!(
            pq.build_distance_table(&[1.0, 0.0, 0.0, 1.0], None),
            Err(IvfPqError::UntrainedCodebook)
        ));
    }

    #[test]
    fn test_residual_shift() {
        let pq = ProductQuantizer::with_codebook(two_segment_codebook(), true);
        let centroid = [1.0, 1.0, 1.0, 1.0];
        // residual of [1.0, 2.0, 0.0, 1.0] is [0, 1, -1, 0]
        let codes = pq.encode(&[1.0, 2.0, 0.0, 1.0], Some(&centroid)).unwrap();
        assert_eq!(codes.as_slice(), &[1, 1]);
        assert!(pq.encode(&[1.0, 2.0, 0.0, 1.0], None).is_err());

        let plain = ProductQuantizer::with_codebook(two_segment_codebook(), false);
        let codes = plain.encode(&[1.0, 2.0, 0.0, 1.0], Some(&centroid)).unwrap();
        assert_eq!(codes.as_slice(), &[1, 0]);
    }
}

//! On-disk layout of an index generation.
//!
//! An index root holds text tables for the coarse and PQ stages plus a
//! binary manifest written once every stage has finished:
//!
//! ```text
//! <root>/bucket/center.<ext>    coarse centroid table
//! <root>/bucket/<c>.<ext>       raw vectors of centroid c
//! <root>/pqCode/center.<ext>    M segment codebooks
//! <root>/pqCode/<c>.<ext>       code rows of centroid c
//! <root>/index.meta             [MAGIC "IVFPQMF\0"][VERSION u32][FLAGS u32][CHECKSUM u32][bincode body]
//! ```
//!
//! There is no journaling: a build interrupted mid-stage leaves partial
//! tables and no manifest.

mod format;
pub mod rows;

pub use format::{FileHeader, FormatFlags, FORMAT_VERSION, MAGIC};

use crate::config::IndexConfig;
use crate::constants::layout;
use crate::error::{IvfPqError, Result};
use crate::types::Bucket;
use rows::CodeShardReader;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Paths of every table under one index root.
#[derive(Debug, Clone)]
pub struct IndexLayout {
    root: PathBuf,
    extension: String,
}

impl IndexLayout {
    /// Layout rooted at `root`, naming shard files `<stem>.<extension>`.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    /// Index root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of raw bucket shards.
    pub fn bucket_dir(&self) -> PathBuf {
        self.root.join(layout::BUCKET_DIR)
    }

    /// Directory of code shards.
    pub fn code_dir(&self) -> PathBuf {
        self.root.join(layout::PQ_DIR)
    }

    fn file(&self, dir: PathBuf, stem: &str) -> PathBuf {
        dir.join(format!("{}.{}", stem, self.extension))
    }

    /// Coarse centroid table.
    pub fn centroids_path(&self) -> PathBuf {
        self.file(self.bucket_dir(), layout::CENTER_STEM)
    }

    /// Raw vectors assigned to `centroid`.
    pub fn bucket_path(&self, centroid: usize) -> PathBuf {
        self.file(self.bucket_dir(), &centroid.to_string())
    }

    /// Combined PQ codebook table.
    pub fn codebook_path(&self) -> PathBuf {
        self.file(self.code_dir(), layout::CENTER_STEM)
    }

    /// Code rows of the vectors assigned to `centroid`.
    pub fn code_path(&self, centroid: usize) -> PathBuf {
        self.file(self.code_dir(), &centroid.to_string())
    }

    /// Manifest marking a completed build.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(layout::MANIFEST_FILE)
    }

    /// Read the raw bucket shard of `centroid`.
    ///
    /// # Errors
    /// `BucketNotFound` if the shard does not exist.
    pub fn read_bucket(&self, centroid: usize, dim: usize) -> Result<Bucket> {
        rows::read_bucket(&self.bucket_path(centroid), dim)
            .map_err(|e| missing_as_bucket(e, centroid))
    }

    /// Open the code shard of `centroid` for streaming.
    ///
    /// # Errors
    /// `BucketNotFound` if the shard does not exist.
    pub fn open_code_shard(
        &self,
        centroid: usize,
        n_segments: usize,
        pq_num: usize,
    ) -> Result<CodeShardReader> {
        CodeShardReader::open(self.code_path(centroid), n_segments, pq_num)
            .map_err(|e| missing_as_bucket(e, centroid))
    }

    /// Create the bucket and code directories.
    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.bucket_dir())?;
        fs::create_dir_all(self.code_dir())?;
        Ok(())
    }
}

fn missing_as_bucket(err: IvfPqError, centroid: usize) -> IvfPqError {
    match err {
        IvfPqError::Io(e) if e.kind() == io::ErrorKind::NotFound => {
            IvfPqError::BucketNotFound(centroid)
        }
        other => other,
    }
}

/// Summary of a completed build, persisted as `index.meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Configuration the index was built with.
    pub config: IndexConfig,
    /// Number of indexed vectors.
    pub total_vectors: usize,
    /// Rows per bucket shard, indexed by centroid.
    pub bucket_sizes: Vec<usize>,
    /// Rows per code shard, indexed by centroid.
    pub code_rows: Vec<usize>,
}

impl IndexManifest {
    /// Write the manifest under the layout's root.
    pub fn save(&self, layout: &IndexLayout) -> Result<()> {
        let body = bincode::serialize(self)?;
        let mut flags = FormatFlags::default();
        if self.config.residual {
            flags.set(FormatFlags::RESIDUAL);
        }
        write_with_header(layout.manifest_path(), flags, &body)
    }

    /// Read the manifest of a completed build.
    ///
    /// # Errors
    /// `IndexNotBuilt` if no manifest exists, `ChecksumMismatch` if the body
    /// was altered.
    pub fn load(layout: &IndexLayout) -> Result<Self> {
        let data = match fs::read(layout.manifest_path()) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(IvfPqError::IndexNotBuilt),
            Err(e) => return Err(e.into()),
        };
        let (header, body) = verify_header(&data)?;
        let manifest: IndexManifest = bincode::deserialize(body)?;
        if header.flags.has(FormatFlags::RESIDUAL) != manifest.config.residual {
            return Err(IvfPqError::invalid_format(
                "residual flag disagrees with the manifest body",
            ));
        }
        Ok(manifest)
    }
}

/// Verify the header and return it with the body.
pub(crate) fn verify_header(data: &[u8]) -> Result<(FileHeader, &[u8])> {
    if data.len() < FileHeader::SIZE {
        return Err(IvfPqError::invalid_format("file too small for header"));
    }

    let header = FileHeader::from_bytes(&data[..FileHeader::SIZE])?;
    header.verify()?;

    let body = &data[FileHeader::SIZE..];
    if crc32fast::hash(body) != header.checksum {
        return Err(IvfPqError::ChecksumMismatch);
    }

    Ok((header, body))
}

/// Write header and body to file.
pub(crate) fn write_with_header(path: impl AsRef<Path>, flags: FormatFlags, body: &[u8]) -> Result<()> {
    let header = FileHeader::new(flags, crc32fast::hash(body));

    let mut file = fs::File::create(path)?;
    file.write_all(&header.to_bytes())?;
    file.write_all(body)?;
    file.sync_all()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(residual: bool) -> IndexManifest {
        IndexManifest {
            config: IndexConfig::new(4, 2, 2, 2).with_residual(residual),
            total_vectors: 8,
            bucket_sizes: vec![5, 3],
            code_rows: vec![5, 3],
        }
    }

    #[test]
    fn test_layout_paths() {
        let layout = IndexLayout::new("/data/idx", "csv");
        assert_eq!(layout.centroids_path(), PathBuf::from("/data/idx/bucket/center.csv"));
        assert_eq!(layout.bucket_path(3), PathBuf::from("/data/idx/bucket/3.csv"));
        assert_eq!(layout.codebook_path(), PathBuf::from("/data/idx/pqCode/center.csv"));
        assert_eq!(layout.code_path(0), PathBuf::from("/data/idx/pqCode/0.csv"));
        assert_eq!(layout.manifest_path(), PathBuf::from("/data/idx/index.meta"));
    }

    #[test]
    fn test_missing_shards_are_bucket_errors() {
        let dir = TempDir::new().unwrap();
        let layout = IndexLayout::new(dir.path(), "txt");
        layout.create_dirs().unwrap();
        assert!(matches!(
            layout.read_bucket(4, 2),
            Err(IvfPqError::BucketNotFound(4))
        ));
        assert!(matches!(
            layout.open_code_shard(1, 2, 2),
            Err(IvfPqError::BucketNotFound(1))
        ));
    }

    #[test]
    fn test_manifest_save_load() {
        let dir = TempDir::new().unwrap();
        let layout = IndexLayout::new(dir.path(), "txt");
        let m = manifest(true);
        m.save(&layout).unwrap();
        assert_eq!(IndexManifest::load(&layout).unwrap(), m);
    }

    #[test]
    fn test_missing_manifest_is_not_built() {
        let dir = TempDir::new().unwrap();
        let layout = IndexLayout::new(dir.path(), "txt");
        assert!(matches!(
            IndexManifest::load(&layout),
            Err(IvfPqError::IndexNotBuilt)
        ));
    }

    #[test]
    fn test_corrupted_manifest() {
        let dir = TempDir::new().unwrap();
        let layout = IndexLayout::new(dir.path(), "txt");
        manifest(false).save(&layout).unwrap();

        let mut bytes = fs::read(layout.manifest_path()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(layout.manifest_path(), bytes).unwrap();

        assert!(matches!(
            IndexManifest::load(&layout),
            Err(IvfPqError::ChecksumMismatch)
        ));
    }
}

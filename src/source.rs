//! Raw vector sources.
//!
//! The build pipeline only needs two things from its input: the list of
//! shards in a stable order, and the records of one shard. [`VectorSource`]
//! is that seam; [`DirSource`] reads a directory of text shards and
//! [`MemorySource`] serves shards held in memory.
//!
//! # Text shard format
//!
//! ```text
//! 0.12,0.5,-0.3,0.9          # implicit id
//! 4711:0.12,0.5,-0.3,0.9     # explicit id
//! ```
//!
//! One record per line, comma separated, a trailing comma is tolerated and
//! blank lines are skipped.

use crate::error::{IvfPqError, Result};
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One raw input record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Global id carried by the source, if any.
    pub id: Option<u64>,
    /// The raw vector.
    pub vector: Vec<f32>,
}

impl Record {
    /// A record without an explicit id.
    pub fn new(vector: Vec<f32>) -> Self {
        Self { id: None, vector }
    }

    /// A record carrying its own global id.
    pub fn with_id(id: u64, vector: Vec<f32>) -> Self {
        Self {
            id: Some(id),
            vector,
        }
    }

    /// Check the record is a usable `dim`-dimensional input vector.
    ///
    /// # Errors
    /// `DimensionMismatch` on a wrong length, `NonFiniteValue` on a NaN or
    /// infinite component, `DegenerateVector` on a zero-norm vector.
    pub fn validate(&self, dim: usize) -> Result<()> {
        if self.vector.len() != dim {
            return Err(IvfPqError::dimension_mismatch(dim, self.vector.len()));
        }
        if !crate::distance::is_finite(&self.vector) {
            return Err(IvfPqError::NonFiniteValue);
        }
        if crate::distance::is_zero(&self.vector) {
            return Err(IvfPqError::DegenerateVector);
        }
        Ok(())
    }
}

/// Identifies one shard of a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardId {
    /// Position of the shard in the source's stable order.
    pub ordinal: usize,
    /// Shard name (file name for directory sources).
    pub name: String,
}

impl ShardId {
    /// Create a shard id.
    pub fn new(ordinal: usize, name: impl Into<String>) -> Self {
        Self {
            ordinal,
            name: name.into(),
        }
    }
}

/// A producer of raw records, split into shards.
pub trait VectorSource: Send + Sync {
    /// Shards in a stable order. Global ids without an explicit value are
    /// assigned following this order.
    fn shards(&self) -> Result<Vec<ShardId>>;

    /// Every record of one shard, in file order.
    fn read_shard(&self, shard: &ShardId) -> Result<Vec<Record>>;

    /// Number of records in one shard.
    fn count_records(&self, shard: &ShardId) -> Result<usize> {
        Ok(self.read_shard(shard)?.len())
    }

    /// The explicit id of every record of one shard, `None` for implicit ids.
    fn record_ids(&self, shard: &ShardId) -> Result<Vec<Option<u64>>> {
        Ok(self.read_shard(shard)?.into_iter().map(|r| r.id).collect())
    }
}

/// Shards held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    shards: Vec<Vec<Record>>,
}

impl MemorySource {
    /// Create a source from pre-split shards.
    pub fn new(shards: Vec<Vec<Record>>) -> Self {
        Self { shards }
    }

    /// Split id-less vectors into `n_shards` contiguous shards.
    pub fn from_vectors(vectors: Vec<Vec<f32>>, n_shards: usize) -> Self {
        let n_shards = n_shards.max(1);
        let per_shard = vectors.len().div_ceil(n_shards).max(1);
        let mut shards: Vec<Vec<Record>> = Vec::with_capacity(n_shards);
        let mut current = Vec::with_capacity(per_shard);
        for v in vectors {
            current.push(Record::new(v));
            if current.len() == per_shard {
                shards.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            shards.push(current);
        }
        Self { shards }
    }

    /// Total number of records over all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    /// Return true if no shard holds a record.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VectorSource for MemorySource {
    fn shards(&self) -> Result<Vec<ShardId>> {
        Ok((0..self.shards.len())
            .map(|i| ShardId::new(i, i.to_string()))
            .collect())
    }

    fn read_shard(&self, shard: &ShardId) -> Result<Vec<Record>> {
        self.shards
            .get(shard.ordinal)
            .cloned()
            .ok_or_else(|| IvfPqError::invalid_parameter(format!("unknown shard {}", shard.name)))
    }

    fn count_records(&self, shard: &ShardId) -> Result<usize> {
        self.shards
            .get(shard.ordinal)
            .map(|s| s.len())
            .ok_or_else(|| IvfPqError::invalid_parameter(format!("unknown shard {}", shard.name)))
    }

    fn record_ids(&self, shard: &ShardId) -> Result<Vec<Option<u64>>> {
        self.shards
            .get(shard.ordinal)
            .map(|s| s.iter().map(|r| r.id).collect())
            .ok_or_else(|| IvfPqError::invalid_parameter(format!("unknown shard {}", shard.name)))
    }
}

/// A directory of text shards, one file per shard.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
    dim: usize,
}

impl DirSource {
    /// Read shards of `dim`-dimensional vectors from `root`.
    pub fn new(root: impl Into<PathBuf>, dim: usize) -> Self {
        Self {
            root: root.into(),
            dim,
        }
    }

    /// Directory being read.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl VectorSource for DirSource {
    fn shards(&self) -> Result<Vec<ShardId>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort_by(|a, b| shard_order(a, b));
        Ok(names
            .into_iter()
            .enumerate()
            .map(|(i, name)| ShardId::new(i, name))
            .collect())
    }

    fn read_shard(&self, shard: &ShardId) -> Result<Vec<Record>> {
        let path = self.root.join(&shard.name);
        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record = parse_record(line, self.dim).map_err(|err| at_line(err, &path, line_no))?;
            records.push(record);
        }
        Ok(records)
    }

    fn count_records(&self, shard: &ShardId) -> Result<usize> {
        let reader = BufReader::new(File::open(self.root.join(&shard.name))?);
        let mut count = 0;
        for line in reader.lines() {
            if !line?.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn record_ids(&self, shard: &ShardId) -> Result<Vec<Option<u64>>> {
        let path = self.root.join(&shard.name);
        let reader = BufReader::new(File::open(&path)?);
        let mut ids = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (id, _) = split_id(line).map_err(|err| at_line(err, &path, line_no))?;
            ids.push(id);
        }
        Ok(ids)
    }
}

/// Prefix a format error with the file and 1-based line it came from.
fn at_line(err: IvfPqError, path: &Path, line_no: usize) -> IvfPqError {
    match err {
        IvfPqError::InvalidFormat(msg) => {
            IvfPqError::invalid_format(format!("{}:{}: {}", path.display(), line_no + 1, msg))
        }
        other => other,
    }
}

/// Numeric file stems ascending, then everything else by name.
fn shard_order(a: &str, b: &str) -> Ordering {
    fn numeric_stem(name: &str) -> Option<u64> {
        name.split('.').next()?.parse().ok()
    }
    match (numeric_stem(a), numeric_stem(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Split an optional `id:` prefix off a record line.
fn split_id(line: &str) -> Result<(Option<u64>, &str)> {
    match line.split_once(':') {
        Some((id, body)) => {
            let id = id
                .trim()
                .parse::<u64>()
                .map_err(|e| IvfPqError::invalid_format(format!("bad id '{}': {}", id, e)))?;
            Ok((Some(id), body))
        }
        None => Ok((None, line)),
    }
}

/// Parse one `v1,...,vD` or `id:v1,...,vD` line.
///
/// Values must be finite; `NaN` and `inf` are rejected as malformed.
pub fn parse_record(line: &str, dim: usize) -> Result<Record> {
    let (id, body) = split_id(line)?;

    let body = body.trim().trim_end_matches(',');
    let mut vector = Vec::with_capacity(dim);
    for field in body.split(',') {
        let field = field.trim();
        let value = field
            .parse::<f32>()
            .map_err(|e| IvfPqError::invalid_format(format!("bad value '{}': {}", field, e)))?;
        if !value.is_finite() {
            return Err(IvfPqError::invalid_format(format!(
                "non-finite value '{}'",
                field
            )));
        }
        vector.push(value);
    }

    if vector.len() != dim {
        return Err(IvfPqError::dimension_mismatch(dim, vector.len()));
    }

    Ok(Record { id, vector })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_parse_plain_and_tagged() {
        let r = parse_record("1.5,-2,3,", 3).unwrap();
        assert_eq!(r.id, None);
        assert_eq!(r.vector, vec![1.5, -2.0, 3.0]);

        let r = parse_record("42:0.5,0.25,1", 3).unwrap();
        assert_eq!(r.id, Some(42));
        assert_eq!(r.vector, vec![0.5, 0.25, 1.0]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_record("1,2", 3),
            Err(IvfPqError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(matches!(
            parse_record("1,x,3", 3),
            Err(IvfPqError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_record("abc:1,2,3", 3),
            Err(IvfPqError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_finite() {
        for line in ["NaN,0,1", "inf,1,0", "1,-inf,0", "3:1,nan,0"] {
            let err = parse_record(line, 3).unwrap_err();
            assert!(
                matches!(&err, IvfPqError::InvalidFormat(msg) if msg.contains("non-finite")),
                "{}: {}",
                line,
                err
            );
        }
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let record = Record::new(vec![f32::INFINITY, 0.0, 1.0]);
        assert!(matches!(record.validate(3), Err(IvfPqError::NonFiniteValue)));
        let record = Record::with_id(5, vec![1.0, f32::NAN, 0.0]);
        assert!(matches!(record.validate(3), Err(IvfPqError::NonFiniteValue)));
        assert!(matches!(
            Record::new(vec![0.0, 0.0, 0.0]).validate(3),
            Err(IvfPqError::DegenerateVector)
        ));
        assert!(Record::new(vec![1e-30, 0.0, 0.0]).validate(3).is_ok());
    }

    #[test]
    fn test_shard_order_numeric() {
        let mut names = vec!["10.txt", "2.txt", "notes", "1.txt", "a.txt"];
        names.sort_by(|a, b| shard_order(a, b));
        assert_eq!(names, vec!["1.txt", "2.txt", "10.txt", "a.txt", "notes"]);
    }

    #[test]
    fn test_dir_source() {
        let dir = TempDir::new().unwrap();
        for (name, body) in [("10.txt", "7:1,0\n"), ("2.txt", "1,1\n\n0,1,\n")] {
            let mut f = File::create(dir.path().join(name)).unwrap();
            f.write_all(body.as_bytes()).unwrap();
        }

        let source = DirSource::new(dir.path(), 2);
        let shards = source.shards().unwrap();
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].name, "2.txt");
        assert_eq!(shards[1].name, "10.txt");

        assert_eq!(source.count_records(&shards[0]).unwrap(), 2);
        let records = source.read_shard(&shards[1]).unwrap();
        assert_eq!(records, vec![Record::with_id(7, vec![1.0, 0.0])]);
    }

    #[test]
    fn test_dir_source_reports_line() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("0.txt"), "1,2\n1,oops\n").unwrap();
        let source = DirSource::new(dir.path(), 2);
        let shards = source.shards().unwrap();
        let err = source.read_shard(&shards[0]).unwrap_err();
        assert!(err.to_string().contains("0.txt:2"));
    }

    #[test]
    fn test_dir_source_record_ids() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("0.txt"), "1,2

9:0,1
  4 :1,1
").unwrap();
        std::fs::write(dir.path().join("1.txt"), "1,2
x:0,1
").unwrap();
        let source = DirSource::new(dir.path(), 2);
        let shards = source.shards().unwrap();

        assert_eq!(
            source.record_ids(&shards[0]).unwrap(),
            vec![None, Some(9), Some(4)]
        );
        let err = source.record_ids(&shards[1]).unwrap_err();
        assert!(err.to_string().contains("1.txt:2"));
    }

    #[test]
    fn test_memory_source_split() {
        let vectors: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32, 1.0]).collect();
        let source = MemorySource::from_vectors(vectors, 3);
        let shards = source.shards().unwrap();
        assert_eq!(shards.len(), 3);
        assert_eq!(source.len(), 10);
        assert_eq!(source.count_records(&shards[0]).unwrap(), 4);
        assert_eq!(source.count_records(&shards[2]).unwrap(), 2);
        assert_eq!(source.record_ids(&shards[2]).unwrap(), vec![None, None]);
    }
}

//! Text row codec for shard and table files.
//!
//! Every table is plain comma separated text:
//!
//! ```text
//! bucket/center.txt     K rows      centroidId,v1,...,vD
//! bucket/<c>.txt        n_c rows    globalId,v1,...,vD
//! pqCode/center.txt     M blocks    v1,...,v(D/M)  (pq_num rows, then "||")
//! pqCode/<c>.txt        n_c rows    globalId,code1,...,codeM
//! ```
//!
//! Floats are written with `Display`, which prints the shortest string that
//! parses back to the same `f32`.

use crate::constants::layout::CODEBOOK_SENTINEL;
use crate::error::{IvfPqError, Result};
use crate::types::{Bucket, CodeRow, Codes, VectorId};
use crate::vector::VectorSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Write one `id,v1,...,vD` row.
pub fn write_vector_row<W: Write>(out: &mut W, id: u64, values: &[f32]) -> io::Result<()> {
    write!(out, "{}", id)?;
    for v in values {
        write!(out, ",{}", v)?;
    }
    writeln!(out)
}

/// Write one `id,c1,...,cM` row.
pub fn write_code_row<W: Write>(out: &mut W, row: &CodeRow) -> io::Result<()> {
    write!(out, "{}", row.id.as_u64())?;
    for c in &row.codes {
        write!(out, ",{}", c)?;
    }
    writeln!(out)
}

fn parse_field<T: FromStr>(field: &str) -> std::result::Result<T, String>
where
    T::Err: std::fmt::Display,
{
    let field = field.trim();
    field
        .parse::<T>()
        .map_err(|e| format!("bad field '{}': {}", field, e))
}

fn split_id(line: &str) -> std::result::Result<(u64, &str), String> {
    let (id, rest) = line
        .split_once(',')
        .ok_or_else(|| "row has no values".to_string())?;
    Ok((parse_field(id)?, rest))
}

/// Parse one `id,v1,...,vD` row.
pub fn parse_vector_row(line: &str, dim: usize) -> Result<(u64, Vec<f32>)> {
    let (id, rest) = split_id(line).map_err(IvfPqError::InvalidFormat)?;
    let values = parse_floats(rest, dim)?;
    Ok((id, values))
}

fn parse_floats(fields: &str, dim: usize) -> Result<Vec<f32>> {
    let mut values = Vec::with_capacity(dim);
    for field in fields.trim_end_matches(',').split(',') {
        let value = parse_field::<f32>(field).map_err(IvfPqError::InvalidFormat)?;
        if !value.is_finite() {
            return Err(IvfPqError::invalid_format(format!(
                "non-finite value '{}'",
                field.trim()
            )));
        }
        values.push(value);
    }
    if values.len() != dim {
        return Err(IvfPqError::dimension_mismatch(dim, values.len()));
    }
    Ok(values)
}

/// Parse one `id,c1,...,cM` row, checking every code is below `pq_num`.
pub fn parse_code_row(line: &str, n_segments: usize, pq_num: usize) -> Result<CodeRow> {
    let (id, rest) = split_id(line).map_err(IvfPqError::InvalidFormat)?;
    let mut codes = Codes::with_capacity(n_segments);
    for field in rest.trim_end_matches(',').split(',') {
        let code: u16 = parse_field(field).map_err(IvfPqError::InvalidFormat)?;
        if code as usize >= pq_num {
            return Err(IvfPqError::invalid_format(format!(
                "code {} out of range for codebook size {}",
                code, pq_num
            )));
        }
        codes.push(code);
    }
    if codes.len() != n_segments {
        return Err(IvfPqError::invalid_format(format!(
            "expected {} codes, found {}",
            n_segments,
            codes.len()
        )));
    }
    Ok(CodeRow::new(id, codes))
}

/// Attach `path:line` to format errors.
fn at_line(path: &Path, line_no: usize, err: IvfPqError) -> IvfPqError {
    match err {
        IvfPqError::InvalidFormat(msg) => {
            IvfPqError::invalid_format(format!("{}:{}: {}", path.display(), line_no + 1, msg))
        }
        other => other,
    }
}

/// Non-blank lines of a file with their zero-based line numbers.
fn data_lines(path: &Path) -> Result<impl Iterator<Item = (usize, io::Result<String>)>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(reader
        .lines()
        .enumerate()
        .filter(|(_, line)| !matches!(line, Ok(l) if l.trim().is_empty())))
}

/// Write a centroid table, one `centroidId,v1,...,vD` row per member.
pub fn write_centroids(path: &Path, centroids: &VectorSet) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (i, row) in centroids.rows().enumerate() {
        write_vector_row(&mut out, i as u64, row)?;
    }
    out.flush()?;
    Ok(())
}

/// Read a centroid table. Row `i` must carry centroid id `i`.
pub fn read_centroids(path: &Path, dim: usize) -> Result<VectorSet> {
    let mut centroids = VectorSet::new(dim);
    for (line_no, line) in data_lines(path)? {
        let line = line?;
        let (id, values) = parse_vector_row(&line, dim).map_err(|e| at_line(path, line_no, e))?;
        if id as usize != centroids.len() {
            return Err(at_line(
                path,
                line_no,
                IvfPqError::invalid_format(format!(
                    "centroid id {} out of order, expected {}",
                    id,
                    centroids.len()
                )),
            ));
        }
        centroids.push(&values)?;
    }
    Ok(centroids)
}

/// Read every row of one bucket shard.
pub fn read_bucket(path: &Path, dim: usize) -> Result<Bucket> {
    let mut bucket = Bucket::new(dim);
    for (line_no, line) in data_lines(path)? {
        let line = line?;
        let (id, values) = parse_vector_row(&line, dim).map_err(|e| at_line(path, line_no, e))?;
        bucket.push(VectorId(id), &values)?;
    }
    Ok(bucket)
}

/// Write the M segment codebooks, each block closed by the sentinel row.
pub fn write_codebook(path: &Path, segments: &[VectorSet]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for segment in segments {
        for row in segment.rows() {
            let mut first = true;
            for v in row {
                if first {
                    write!(out, "{}", v)?;
                    first = false;
                } else {
                    write!(out, ",{}", v)?;
                }
            }
            writeln!(out)?;
        }
        writeln!(out, "{}", CODEBOOK_SENTINEL)?;
    }
    out.flush()?;
    Ok(())
}

/// Read a codebook table of `n_segments` blocks, each `pq_num` rows wide
/// `segment_dim`.
pub fn read_codebook(
    path: &Path,
    n_segments: usize,
    pq_num: usize,
    segment_dim: usize,
) -> Result<Vec<VectorSet>> {
    let mut segments = Vec::with_capacity(n_segments);
    let mut current = VectorSet::with_capacity(segment_dim, pq_num);

    for (line_no, line) in data_lines(path)? {
        let line = line?;
        let line = line.trim();
        if line == CODEBOOK_SENTINEL {
            if current.len() != pq_num {
                return Err(at_line(
                    path,
                    line_no,
                    IvfPqError::invalid_format(format!(
                        "segment {} has {} entries, expected {}",
                        segments.len(),
                        current.len(),
                        pq_num
                    )),
                ));
            }
            segments.push(std::mem::replace(
                &mut current,
                VectorSet::with_capacity(segment_dim, pq_num),
            ));
            continue;
        }
        let values = parse_floats(line, segment_dim).map_err(|e| at_line(path, line_no, e))?;
        current.push(&values)?;
    }

    if !current.is_empty() || segments.len() != n_segments {
        return Err(IvfPqError::invalid_format(format!(
            "{}: expected {} complete codebook segments, found {}",
            path.display(),
            n_segments,
            segments.len()
        )));
    }
    Ok(segments)
}

/// Streams the rows of one code shard without loading it whole.
pub struct CodeShardReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    n_segments: usize,
    pq_num: usize,
}

impl CodeShardReader {
    /// Open a code shard.
    pub fn open(path: impl Into<PathBuf>, n_segments: usize, pq_num: usize) -> Result<Self> {
        let path = path.into();
        let lines = BufReader::new(File::open(&path)?).lines();
        Ok(Self {
            path,
            lines,
            line_no: 0,
            n_segments,
            pq_num,
        })
    }
}

impl Iterator for CodeShardReader {
    type Item = Result<CodeRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            let line_no = self.line_no;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(
                parse_code_row(&line, self.n_segments, self.pq_num)
                    .map_err(|e| at_line(&self.path, line_no, e)),
            );
        }
    }
}

/// Read every row of one code shard.
pub fn read_code_rows(path: &Path, n_segments: usize, pq_num: usize) -> Result<Vec<CodeRow>> {
    CodeShardReader::open(path, n_segments, pq_num)?.collect()
}

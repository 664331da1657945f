// src/memory/persistence.rs — On-disk format for a stream's vector index
//
// Layout (little-endian):
//   magic    b"TIPX"
//   version  u32
//   dim      u32
//   count    u64
//   data     count * dim f32, in id order
//
// Writes go to a sibling `.tmp` file which is fsynced and renamed over the
// target, so a crash leaves either the old or the new file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::infra::errors::IndexError;

const MAGIC: &[u8; 4] = b"TIPX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Contents of an index file.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    pub dim: usize,
    /// Flattened vectors, `dim` values per entry.
    pub data: Vec<f32>,
}

impl IndexSnapshot {
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read `(dim, count)` from a file header without loading the vectors.
pub fn read_header(path: &Path) -> Result<(usize, u64), IndexError> {
    let mut header = [0u8; HEADER_LEN];
    File::open(path)?
        .read_exact(&mut header)
        .map_err(|e| IndexError::Corrupt(format!("short header: {e}")))?;
    parse_header(&header)
}

fn parse_header(header: &[u8]) -> Result<(usize, u64), IndexError> {
    if header.len() < HEADER_LEN {
        return Err(IndexError::Corrupt(format!(
            "file is {} bytes, header needs {HEADER_LEN}",
            header.len()
        )));
    }
    if &header[0..4] != MAGIC {
        return Err(IndexError::Corrupt("bad magic".into()));
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != FORMAT_VERSION {
        return Err(IndexError::Corrupt(format!(
            "unsupported format version {version}"
        )));
    }
    let dim = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header[12..20]);
    let count = u64::from_le_bytes(count_bytes);
    if dim == 0 {
        return Err(IndexError::Corrupt("zero dimension".into()));
    }
    Ok((dim, count))
}

/// Read and validate a whole index file.
pub fn read_index(path: &Path) -> Result<IndexSnapshot, IndexError> {
    let bytes = fs::read(path)?;
    let (dim, count) = parse_header(&bytes)?;

    let body = &bytes[HEADER_LEN..];
    let expected_len = (count as usize)
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
        .ok_or_else(|| IndexError::Corrupt("entry count overflows".into()))?;
    if body.len() != expected_len {
        return Err(IndexError::Corrupt(format!(
            "expected {expected_len} data bytes for {count} x {dim}, found {}",
            body.len()
        )));
    }

    let mut data = Vec::with_capacity(count as usize * dim);
    for chunk in body.chunks_exact(4) {
        let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if !value.is_finite() {
            return Err(IndexError::Corrupt("non-finite value".into()));
        }
        data.push(value);
    }

    Ok(IndexSnapshot { dim, data })
}

/// Overwrite `path` with the given vectors via temp file + rename.
pub fn write_index(path: &Path, dim: usize, data: &[f32]) -> Result<(), IndexError> {
    if dim == 0 || data.len() % dim != 0 {
        return Err(IndexError::Corrupt(format!(
            "refusing to write {} values with dimension {dim}",
            data.len()
        )));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = tmp_path_for(path);
    let result = write_file(&tmp_path, dim, data).and_then(|()| {
        fs::rename(&tmp_path, path)?;
        Ok(())
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_file(tmp_path: &Path, dim: usize, data: &[f32]) -> Result<(), IndexError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(tmp_path)?;
    let mut out = BufWriter::new(file);

    let dim_u32 = u32::try_from(dim)
        .map_err(|_| IndexError::Corrupt(format!("dimension {dim} too large")))?;
    let count = (data.len() / dim) as u64;

    out.write_all(MAGIC)?;
    out.write_all(&FORMAT_VERSION.to_le_bytes())?;
    out.write_all(&dim_u32.to_le_bytes())?;
    out.write_all(&count.to_le_bytes())?;
    for value in data {
        out.write_all(&value.to_le_bytes())?;
    }

    let file = out.into_inner().map_err(|e| IndexError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}

pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

//! Key-value persistence contract for shared checkpoints.

use crate::core::constants::MATRIX_FILE_EXTENSION;
use crate::core::error::{GridError, Result};
use crate::core::types::PersistKind;
use bincode::Options;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Store that checkpoint protocols write to and read from.
///
/// Entries live in a namespace ([`PersistKind`]) under a string key. Matrix
/// entries are stored as `<name>.bin`: the extension is added on write when
/// missing and must be part of the name on read. `rank()` is the caller's
/// rank within its model and gates which rank writes.
pub trait PersistStore: Send {
    /// Rank of the caller within its model.
    fn rank(&self) -> usize;

    fn write_u64(&mut self, kind: PersistKind, key: &str, value: u64) -> Result<()>;

    fn read_u64(&self, kind: PersistKind, key: &str) -> Result<u64>;

    fn write_f32(&mut self, kind: PersistKind, key: &str, value: f32) -> Result<()>;

    fn read_f32(&self, kind: PersistKind, key: &str) -> Result<f32>;

    /// Write a matrix held identically by every rank of the model.
    fn write_matrix(&mut self, kind: PersistKind, name: &str, matrix: &Array2<f32>) -> Result<()>;

    /// Read a matrix; every rank of the model receives the full matrix.
    fn read_matrix(&self, kind: PersistKind, name: &str) -> Result<Array2<f32>>;

    /// True if an entry exists under `key`.
    fn contains(&self, kind: PersistKind, key: &str) -> bool;

    /// Keys of all entries in a namespace, sorted.
    fn list(&self, kind: PersistKind) -> Result<Vec<String>>;
}

/// On-disk form of a matrix entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixBlob {
    pub rows: u64,
    pub cols: u64,
    /// Row-major values
    pub data: Vec<f32>,
}

impl MatrixBlob {
    pub fn from_matrix(matrix: &Array2<f32>) -> Self {
        Self {
            rows: matrix.nrows() as u64,
            cols: matrix.ncols() as u64,
            data: matrix.iter().copied().collect(),
        }
    }

    pub fn into_matrix(self) -> Result<Array2<f32>> {
        let shape = (self.rows as usize, self.cols as usize);
        Array2::from_shape_vec(shape, self.data).map_err(|e| {
            GridError::checkpoint(format!(
                "matrix blob of {}x{} is malformed: {}",
                shape.0, shape.1, e
            ))
        })
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

/// Encode a value with the fixed-width little-endian checkpoint codec.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(codec().serialize(value)?)
}

/// Decode a value written by [`encode`]; trailing bytes are rejected.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    Ok(codec().reject_trailing_bytes().deserialize(bytes)?)
}

/// Matrix entry name with the `.bin` extension.
pub fn matrix_file_name(name: &str) -> String {
    let suffix = format!(".{}", MATRIX_FILE_EXTENSION);
    if name.ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{}{}", name, suffix)
    }
}

pub(crate) fn decode_u64(kind: PersistKind, key: &str, bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        GridError::checkpoint(format!(
            "{}/{} holds {} bytes, expected 8 for a u64",
            kind,
            key,
            bytes.len()
        ))
    })?;
    Ok(u64::from_le_bytes(raw))
}

pub(crate) fn decode_f32(kind: PersistKind, key: &str, bytes: &[u8]) -> Result<f32> {
    let raw: [u8; 4] = bytes.try_into().map_err(|_| {
        GridError::checkpoint(format!(
            "{}/{} holds {} bytes, expected 4 for an f32",
            kind,
            key,
            bytes.len()
        ))
    })?;
    Ok(f32::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_file_name() {
        assert_eq!(matrix_file_name("L0_rmsprop_2x3"), "L0_rmsprop_2x3.bin");
        assert_eq!(matrix_file_name("L0_rmsprop_2x3.bin"), "L0_rmsprop_2x3.bin");
    }

    #[test]
    fn test_matrix_blob_shape() {
        let matrix = Array2::from_shape_fn((2, 3), |(r, c)| (r * 3 + c) as f32);
        let blob = MatrixBlob::from_matrix(&matrix);
        assert_eq!((blob.rows, blob.cols), (2, 3));
        assert_eq!(blob.data, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

        let bad = MatrixBlob {
            rows: 2,
            cols: 2,
            data: vec![1.0],
        };
        assert!(bad.into_matrix().is_err());
    }

    #[test]
    fn test_scalar_decoding_checks_width() {
        assert_eq!(decode_u64(PersistKind::Train, "k", &7u64.to_le_bytes()).unwrap(), 7);
        assert!(decode_u64(PersistKind::Train, "k", &[0; 4]).is_err());
        assert!(decode_f32(PersistKind::Train, "k", &[0; 8]).is_err());
    }
}

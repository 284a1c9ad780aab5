use std::collections::VecDeque;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{sha256_hex, HmError, Series};

/// Fixed-capacity stack of equal-width rows. Appending past `data_groups`
/// evicts the oldest rows first; surviving rows keep insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct HeatmapBuffer {
    length: usize,
    data_groups: usize,
    rows: VecDeque<Series>,
}

impl HeatmapBuffer {
    pub fn new(length: usize, data_groups: usize) -> Result<Self, HmError> {
        if length == 0 {
            return Err(HmError::InvalidParameter(
                "row length must be greater than 0".into(),
            ));
        }
        if data_groups == 0 {
            return Err(HmError::InvalidParameter(
                "data groups must be greater than 0".into(),
            ));
        }
        Ok(Self {
            length,
            data_groups,
            rows: VecDeque::with_capacity(data_groups + 1),
        })
    }

    /// Append `row` at the bottom and return the updated buffer.
    ///
    /// Rows shorter than the buffer width are zero padded, longer rows are
    /// truncated.
    pub fn append(mut self, mut row: Series) -> Self {
        row.resize(self.length, 0.0);
        self.rows.push_back(row);
        while self.rows.len() > self.data_groups {
            self.rows.pop_front();
        }
        self
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn capacity(&self) -> usize {
        self.data_groups
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows from oldest to newest.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn into_matrix(self) -> HeatmapMatrix {
        HeatmapMatrix {
            length: self.length,
            rows: self.rows.into(),
        }
    }
}

/// Finished grid handed to a renderer, one row per reduced series.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HeatmapMatrix {
    length: usize,
    rows: Vec<Series>,
}

impl HeatmapMatrix {
    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.length)
    }

    pub fn rows(&self) -> &[Series] {
        &self.rows
    }

    pub fn to_array2(&self) -> Result<Array2<f64>, HmError> {
        let flat: Vec<f64> = self.rows.iter().flatten().copied().collect();
        Array2::from_shape_vec(self.shape(), flat)
            .map_err(|e| HmError::InvalidParameter(format!("ragged heatmap matrix: {e}")))
    }

    /// SHA-256 over the shape and the bit pattern of every cell. Two matrices
    /// share a fingerprint only if they are bit-identical.
    pub fn fingerprint(&self) -> String {
        let (n_rows, n_cols) = self.shape();
        let mut bytes = Vec::with_capacity(16 + n_rows * n_cols * 8);
        bytes.extend_from_slice(&(n_rows as u64).to_le_bytes());
        bytes.extend_from_slice(&(n_cols as u64).to_le_bytes());
        for value in self.rows.iter().flatten() {
            bytes.extend_from_slice(&value.to_bits().to_le_bytes());
        }
        sha256_hex(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions() {
        assert!(HeatmapBuffer::new(0, 3).is_err());
        assert!(HeatmapBuffer::new(3, 0).is_err());
    }

    #[test]
    fn pads_with_zeros_and_truncates() {
        let buffer = HeatmapBuffer::new(3, 4)
            .unwrap()
            .append(vec![1.0])
            .append(vec![1.0, 2.0, 3.0, 4.0, 5.0])
            .append(vec![-1.0, -1.0, -1.0]);
        let rows: Vec<&[f64]> = buffer.rows().collect();
        assert_eq!(rows[0], &[1.0, 0.0, 0.0]);
        assert_eq!(rows[1], &[1.0, 2.0, 3.0]);
        assert_eq!(rows[2], &[-1.0, -1.0, -1.0]);
    }

    #[test]
    fn evicts_oldest_rows_first() {
        let mut buffer = HeatmapBuffer::new(2, 3).unwrap();
        for i in 0..7 {
            buffer = buffer.append(vec![i as f64, i as f64]);
            assert!(buffer.len() <= 3);
        }
        let firsts: Vec<f64> = buffer.rows().map(|r| r[0]).collect();
        assert_eq!(firsts, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn append_leaves_prior_clone_untouched() {
        let before = HeatmapBuffer::new(2, 1).unwrap().append(vec![1.0, 1.0]);
        let after = before.clone().append(vec![2.0, 2.0]);
        assert_eq!(before.rows().next().unwrap(), &[1.0, 1.0]);
        assert_eq!(after.rows().next().unwrap(), &[2.0, 2.0]);
        assert_eq!(after.len(), 1);
    }

    #[test]
    fn matrix_shape_and_array() {
        let matrix = HeatmapBuffer::new(3, 2)
            .unwrap()
            .append(vec![1.0, 2.0, 3.0])
            .append(vec![4.0, 5.0, 6.0])
            .into_matrix();
        assert_eq!(matrix.shape(), (2, 3));
        let array = matrix.to_array2().unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[1, 0]], 4.0);
        assert_eq!(array[[0, 2]], 3.0);
    }

    #[test]
    fn fingerprint_tracks_bit_patterns() {
        let a = HeatmapBuffer::new(1, 1).unwrap().append(vec![0.0]).into_matrix();
        let b = HeatmapBuffer::new(1, 1).unwrap().append(vec![-0.0]).into_matrix();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        let empty = HeatmapBuffer::new(1, 1).unwrap().into_matrix();
        assert_eq!(empty.shape(), (0, 1));
        assert_ne!(empty.fingerprint(), a.fingerprint());
    }
}

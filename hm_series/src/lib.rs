//! Series reduction pipeline feeding a rolling heatmap matrix.
//!
//! Raw per-source series are trimmed to a common length, min-max normalized,
//! reduced to a fixed width with one of several strategies and stacked into a
//! bounded, FIFO-evicting matrix.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod downsample;
pub mod heatmap;
pub mod normalize;
pub mod pipeline;
pub mod trim;

pub use downsample::{
    list_strategies, reduce, reduce_groups, rms_downsample, standard_reduce, triangle_sample,
    Aggregation, Strategy, StrategyInfo, NO_DATA_SENTINEL,
};
pub use heatmap::{HeatmapBuffer, HeatmapMatrix};
pub use normalize::{normalize_series, normalize_set, NORMALIZE_EXPONENT};
pub use pipeline::{run_pipeline, PipelineConfig, Session};
pub use trim::trim_series;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HmError {
    #[error("no series to process")]
    EmptyInput,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("need {required} series but only {available} available")]
    InsufficientData { required: usize, available: usize },
}

/// One numeric sequence per input source.
pub type Series = Vec<f64>;

/// Half-open, 0-based window of rows handed to the column reader.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn new(start: usize, end: usize) -> Result<Self, HmError> {
        if start >= end {
            return Err(HmError::InvalidParameter(
                "start row must be less than end row".into(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Clip the end of the window to `n_rows`. The result may be empty when
    /// the source has fewer than `start` rows.
    pub fn clamp(&self, n_rows: usize) -> std::ops::Range<usize> {
        let end = self.end.min(n_rows);
        self.start.min(end)..end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_range_rejects_inverted_bounds() {
        assert!(matches!(
            RowRange::new(5, 5),
            Err(HmError::InvalidParameter(_))
        ));
        assert!(matches!(
            RowRange::new(6, 2),
            Err(HmError::InvalidParameter(_))
        ));
        let range = RowRange::new(1, 4).unwrap();
        assert_eq!(range.len(), 3);
        assert!(!range.is_empty());
    }

    #[test]
    fn row_range_clamps_to_available_rows() {
        let range = RowRange::new(1, 100).unwrap();
        assert_eq!(range.clamp(10), 1..10);
        assert_eq!(range.clamp(0), 0..0);
        assert_eq!(RowRange::new(3, 5).unwrap().clamp(2), 2..2);
    }

    #[test]
    fn insufficient_data_message_names_counts() {
        let err = HmError::InsufficientData {
            required: 5,
            available: 3,
        };
        assert_eq!(err.to_string(), "need 5 series but only 3 available");
    }
}

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::downsample::{reduce, Strategy};
use crate::heatmap::{HeatmapBuffer, HeatmapMatrix};
use crate::normalize::normalize_set;
use crate::trim::trim_series;
use crate::{HmError, Series};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Samples per reduced series (heatmap columns).
    pub target_length: usize,
    /// Matrix row capacity.
    pub data_groups: usize,
    pub strategy: Strategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_length: 100,
            data_groups: 10,
            strategy: Strategy::Standard,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), HmError> {
        if self.target_length == 0 {
            return Err(HmError::InvalidParameter(
                "target length must be greater than 0".into(),
            ));
        }
        if self.data_groups == 0 {
            return Err(HmError::InvalidParameter(
                "data groups must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Trim, normalize and reduce `series_set`, then stack the first
/// `data_groups` rows into a fresh heatmap matrix.
pub fn run_pipeline(
    series_set: Vec<Series>,
    config: &PipelineConfig,
) -> Result<HeatmapMatrix, HmError> {
    config.validate()?;

    let n_sources = series_set.len();
    let trimmed = trim_series(series_set)?;
    debug!(
        "trimmed {} series to {} samples",
        n_sources,
        trimmed.first().map(Vec::len).unwrap_or(0)
    );

    let normalized = normalize_set(&trimmed)?;
    if normalized.len() < config.data_groups {
        return Err(HmError::InsufficientData {
            required: config.data_groups,
            available: normalized.len(),
        });
    }

    debug!(
        "reducing {} series to {} samples with {}",
        config.data_groups,
        config.target_length,
        config.strategy.id()
    );
    let mut buffer = HeatmapBuffer::new(config.target_length, config.data_groups)?;
    for series in normalized.iter().take(config.data_groups) {
        let row = reduce(series, config.target_length, &config.strategy)?;
        buffer = buffer.append(row);
    }
    Ok(buffer.into_matrix())
}

/// Per-session state: the last successfully built matrix and the
/// configuration that produced it.
#[derive(Clone, Debug, Default)]
pub struct Session {
    current: Option<(PipelineConfig, HeatmapMatrix)>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a plotting request. On success the session's matrix is replaced
    /// wholesale; on failure the previous state is kept.
    pub fn plot(
        &mut self,
        series_set: Vec<Series>,
        config: &PipelineConfig,
    ) -> Result<&HeatmapMatrix, HmError> {
        let matrix = run_pipeline(series_set, config)?;
        let (_, matrix) = self.current.insert((config.clone(), matrix));
        Ok(matrix)
    }

    pub fn current(&self) -> Option<&HeatmapMatrix> {
        self.current.as_ref().map(|(_, m)| m)
    }

    pub fn config(&self) -> Option<&PipelineConfig> {
        self.current.as_ref().map(|(c, _)| c)
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

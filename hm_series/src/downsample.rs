use std::fmt;
use std::str::FromStr;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{sha256_hex, HmError, Series};

/// Padding value used by [`standard_reduce`] to mark missing samples.
pub const NO_DATA_SENTINEL: f64 = -1.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Mean,
    Max,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Mean => "mean",
            Aggregation::Max => "max",
        }
    }

    fn apply(&self, group: &[f64]) -> f64 {
        match self {
            Aggregation::Mean => mean(group),
            Aggregation::Max => group
                .iter()
                .copied()
                .map(OrderedFloat)
                .max()
                .map(OrderedFloat::into_inner)
                .unwrap_or(f64::NAN),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = HmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mean" => Ok(Aggregation::Mean),
            "max" => Ok(Aggregation::Max),
            other => Err(HmError::InvalidParameter(format!(
                "aggregation must be 'max' or 'mean', got '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub exact_length: bool,
    pub default_params: JsonValue,
}

/// Reduction applied to every normalized series before it becomes a heatmap row.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "id", content = "params")]
pub enum Strategy {
    #[default]
    #[serde(rename = "hm.standard.chunk_mean.v1")]
    Standard,
    #[serde(rename = "hm.lttb.triangle_area.v1")]
    TriangleArea,
    #[serde(rename = "hm.rms.balanced.v1")]
    Rms,
    #[serde(rename = "hm.grouped.reduce.v1")]
    MeanReduction { aggregation: Aggregation },
}

impl Strategy {
    pub fn id(&self) -> &'static str {
        match self {
            Strategy::Standard => "hm.standard.chunk_mean.v1",
            Strategy::TriangleArea => "hm.lttb.triangle_area.v1",
            Strategy::Rms => "hm.rms.balanced.v1",
            Strategy::MeanReduction { .. } => "hm.grouped.reduce.v1",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Standard => "Standard chunk mean",
            Strategy::TriangleArea => "Largest triangle sampling",
            Strategy::Rms => "RMS downsampling",
            Strategy::MeanReduction { .. } => "Grouped reduction",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Strategy::Standard => {
                "Mean of equal integer chunks; trailing remainder dropped, short series padded with -1."
            }
            Strategy::TriangleArea => {
                "Shape-preserving bucket sampling keeping first and last points (LTTB-style)."
            }
            Strategy::Rms => {
                "Root-mean-square of balanced contiguous groups; target must be shorter than the series."
            }
            Strategy::MeanReduction { .. } => {
                "Mean or max of contiguous groups; the first n mod k groups take one extra sample."
            }
        }
    }

    /// Whether the strategy always yields exactly the requested length.
    /// Triangle sampling returns short inputs unchanged.
    pub fn exact_length(&self) -> bool {
        !matches!(self, Strategy::TriangleArea)
    }

    pub fn default_for_id(id: &str) -> Option<Self> {
        match id.trim() {
            "hm.standard.chunk_mean.v1" => Some(Strategy::Standard),
            "hm.lttb.triangle_area.v1" => Some(Strategy::TriangleArea),
            "hm.rms.balanced.v1" => Some(Strategy::Rms),
            "hm.grouped.reduce.v1" => Some(Strategy::MeanReduction {
                aggregation: Aggregation::Mean,
            }),
            _ => None,
        }
    }

    pub fn params_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    pub fn params_hash_sha256(&self) -> Result<String, HmError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| HmError::InvalidParameter(e.to_string()))?;
        Ok(sha256_hex(&bytes))
    }
}

pub fn list_strategies() -> Vec<StrategyInfo> {
    let defaults = [
        Strategy::Standard,
        Strategy::TriangleArea,
        Strategy::Rms,
        Strategy::MeanReduction {
            aggregation: Aggregation::Mean,
        },
    ];

    defaults
        .iter()
        .map(|cfg| StrategyInfo {
            id: cfg.id().to_string(),
            name: cfg.name().to_string(),
            description: cfg.description().to_string(),
            exact_length: cfg.exact_length(),
            default_params: cfg.params_json(),
        })
        .collect()
}

/// Reduce `series` to `target_length` samples with the selected strategy.
pub fn reduce(
    series: &[f64],
    target_length: usize,
    strategy: &Strategy,
) -> Result<Series, HmError> {
    if target_length == 0 {
        return Err(HmError::InvalidParameter(
            "target length must be greater than 0".into(),
        ));
    }
    match strategy {
        Strategy::Standard => standard_reduce(series, target_length),
        Strategy::TriangleArea => Ok(triangle_sample(series, target_length)),
        Strategy::Rms => rms_downsample(series, target_length),
        Strategy::MeanReduction { aggregation } => {
            reduce_groups(series, target_length, *aggregation)
        }
    }
}

/// Chunk-mean reduction. Longer series are split into `n / target_length`
/// sized chunks and any remainder past `target_length` chunks is dropped;
/// shorter series are padded with [`NO_DATA_SENTINEL`].
pub fn standard_reduce(series: &[f64], target_length: usize) -> Result<Series, HmError> {
    if target_length == 0 {
        return Err(HmError::InvalidParameter(
            "target length must be greater than 0".into(),
        ));
    }
    let n = series.len();
    if n > target_length {
        let chunk_size = n / target_length;
        Ok(series
            .chunks_exact(chunk_size)
            .take(target_length)
            .map(mean)
            .collect())
    } else {
        let mut out = series.to_vec();
        out.resize(target_length, NO_DATA_SENTINEL);
        Ok(out)
    }
}

/// Largest-triangle bucket sampling over `(index, value)` points.
///
/// The first and last samples are always kept. The interior is split into
/// `target_length - 2` buckets of width `(n - 2) / (target_length - 2)`;
/// bucket `i` spans indices `floor(1 + i * w) ..= floor(1 + (i + 1) * w)`
/// (the final bucket ends at `n - 1`). Each bucket contributes the candidate
/// whose triangle with the previously selected point and the first point of
/// the following bucket has the largest area, first candidate winning ties.
pub fn triangle_sample(series: &[f64], target_length: usize) -> Series {
    let n = series.len();
    if target_length >= n {
        return series.to_vec();
    }
    if target_length <= 2 {
        return series[..target_length].to_vec();
    }

    let n_buckets = target_length - 2;
    let bucket_size = (n - 2) as f64 / n_buckets as f64;
    let mut sampled = Vec::with_capacity(target_length);
    sampled.push(series[0]);
    let mut prev = 0usize;

    for i in 0..n_buckets {
        let start = (1.0 + i as f64 * bucket_size) as usize;
        let end = if i == n_buckets - 1 {
            n - 1
        } else {
            ((1.0 + (i + 1) as f64 * bucket_size) as usize).min(n - 1)
        };
        let next = end;

        let mut max_area = -1.0;
        let mut selected = start;
        for candidate in start..=end {
            let area = triangle_area(
                (prev as f64, series[prev]),
                (candidate as f64, series[candidate]),
                (next as f64, series[next]),
            );
            if area > max_area {
                max_area = area;
                selected = candidate;
            }
        }
        sampled.push(series[selected]);
        prev = selected;
    }

    sampled.push(series[n - 1]);
    sampled
}

fn triangle_area(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    ((a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1)) / 2.0).abs()
}

/// Root-mean-square of `target_length` balanced contiguous groups.
/// Requires `0 < target_length < series.len()`.
pub fn rms_downsample(series: &[f64], target_length: usize) -> Result<Series, HmError> {
    if target_length == 0 {
        return Err(HmError::InvalidParameter(
            "target length must be greater than 0".into(),
        ));
    }
    if target_length >= series.len() {
        return Err(HmError::InvalidParameter(format!(
            "RMS target length {} must be less than series length {}",
            target_length,
            series.len()
        )));
    }
    Ok(balanced_groups(series, target_length)
        .map(|group| (group.iter().map(|x| x * x).sum::<f64>() / group.len() as f64).sqrt())
        .collect())
}

/// Mean or max over `k` contiguous groups; the first `n % k` groups hold
/// `n / k + 1` samples and the rest `n / k`.
pub fn reduce_groups(
    series: &[f64],
    k: usize,
    aggregation: Aggregation,
) -> Result<Series, HmError> {
    if k == 0 {
        return Err(HmError::InvalidParameter(
            "target length must be greater than 0".into(),
        ));
    }
    let n = series.len();
    if k > n {
        return Err(HmError::InvalidParameter(format!(
            "cannot reduce {n} samples into {k} groups"
        )));
    }
    let (base, remainder) = (n / k, n % k);
    let sizes = std::iter::repeat(base + 1)
        .take(remainder)
        .chain(std::iter::repeat(base).take(k - remainder));

    let mut out = Vec::with_capacity(k);
    let mut offset = 0;
    for size in sizes {
        out.push(aggregation.apply(&series[offset..offset + size]));
        offset += size;
    }
    Ok(out)
}

/// Split into `k` contiguous groups whose lengths differ by at most one,
/// longer groups first.
fn balanced_groups(series: &[f64], k: usize) -> impl Iterator<Item = &[f64]> {
    let n = series.len();
    let (base, extra) = (n / k, n % k);
    (0..k).map(move |i| {
        let start = i * base + i.min(extra);
        let len = base + usize::from(i < extra);
        &series[start..start + len]
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

use ordered_float::OrderedFloat;

use crate::{HmError, Series};

/// Contrast exponent applied after min-max rescaling.
pub const NORMALIZE_EXPONENT: f64 = 1.5;

/// Min-max rescale `series` into `[0, 1]` and raise every value to
/// [`NORMALIZE_EXPONENT`]. A constant series maps to all zeros.
pub fn normalize_series(series: &[f64]) -> Result<Series, HmError> {
    let min_v = series
        .iter()
        .copied()
        .map(OrderedFloat)
        .min()
        .ok_or(HmError::EmptyInput)?
        .into_inner();
    let max_v = series
        .iter()
        .copied()
        .map(OrderedFloat)
        .max()
        .ok_or(HmError::EmptyInput)?
        .into_inner();

    // Halved operands keep the span finite for any pair of finite extremes.
    let half_span = max_v / 2.0 - min_v / 2.0;
    if half_span <= 0.0 {
        return Ok(vec![0.0; series.len()]);
    }
    Ok(series
        .iter()
        .map(|&x| {
            ((x / 2.0 - min_v / 2.0) / half_span)
                .clamp(0.0, 1.0)
                .powf(NORMALIZE_EXPONENT)
        })
        .collect())
}

/// Normalize every member of a set independently, preserving order.
pub fn normalize_set(set: &[Series]) -> Result<Vec<Series>, HmError> {
    set.iter().map(|s| normalize_series(s)).collect()
}

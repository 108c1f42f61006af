//! Scalar summaries of derived series.
//!
//! Aggregates run over defined cells only and return `None` when there are
//! none, so an empty window or a missing stream reads as "undefined" rather
//! than as a zero total.

use ndarray::Array1;
use ordered_float::OrderedFloat;

use crate::derive::FloorRule;
use crate::series::DerivedSeries;
use crate::{Timestamp, TsError};

fn defined_array(series: &DerivedSeries) -> Option<Array1<f64>> {
    let values: Array1<f64> = series.defined().collect();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

pub fn count_defined(series: &DerivedSeries) -> usize {
    series.defined().count()
}

pub fn sum(series: &DerivedSeries) -> Option<f64> {
    defined_array(series).map(|v| v.sum())
}

pub fn mean(series: &DerivedSeries) -> Option<f64> {
    defined_array(series).and_then(|v| v.mean())
}

pub fn min(series: &DerivedSeries) -> Option<f64> {
    series.defined().map(OrderedFloat).min().map(|v| v.0)
}

pub fn max(series: &DerivedSeries) -> Option<f64> {
    series.defined().map(OrderedFloat).max().map(|v| v.0)
}

/// Largest defined value and when it occurred; the earliest row wins a tie.
pub fn peak(series: &DerivedSeries) -> Option<(Timestamp, f64)> {
    let mut best: Option<(Timestamp, f64)> = None;
    for (t, cell) in series.times().iter().zip(series.values()) {
        if let Some(v) = cell {
            match best {
                Some((_, b)) if *v <= b => {}
                _ => best = Some((*t, *v)),
            }
        }
    }
    best
}

/// Last defined value, i.e. the total of a cumulative series.
pub fn last(series: &DerivedSeries) -> Option<f64> {
    series.values().iter().rev().find_map(|v| *v)
}

/// Linear-interpolated quantile of the defined cells, `q` in `[0, 1]`.
pub fn quantile(series: &DerivedSeries, q: f64) -> Result<Option<f64>, TsError> {
    if !(0.0..=1.0).contains(&q) {
        return Err(TsError::InvalidParameter(format!(
            "quantile must lie in [0, 1], got {}",
            q
        )));
    }
    let values: Vec<f64> = series.defined().collect();
    Ok(quantile_of(&values, q))
}

pub(crate) fn quantile_of(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by_key(|v| OrderedFloat(*v));
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Hours a capacity lasts at `mean_rate` (capacity units per hour).
///
/// Returns `None` when the rate is undefined or guarded by `rule` against
/// `floor`, the same policy as [`crate::derive::ratio_with_floor`].
pub fn endurance_hours(
    capacity: f64,
    mean_rate: Option<f64>,
    floor: f64,
    rule: FloorRule,
) -> Option<f64> {
    let rate = mean_rate?;
    if rule.guards(rate, floor) {
        return None;
    }
    Some(capacity / rate)
}

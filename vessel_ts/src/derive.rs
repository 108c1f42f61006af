//! Derived quantities over aligned frames: integration of rates, guarded
//! ratios, smoothing and outlier rejection.
//!
//! Every function here is pure. Inputs are borrowed and a fresh
//! [`DerivedSeries`] is returned; undefined cells are carried as `None`.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::align::{delta_seconds, AlignedFrame};
use crate::series::DerivedSeries;
use crate::stats::quantile_of;
use crate::TsError;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Integrate a per-hour rate over the frame timeline into a running total.
///
/// Row `i` contributes `rate_i * dt_i / 3600 * unit_scale`, where `dt_i` is the
/// gap to the previous row. Row 0 is always 0. An undefined rate cell leaves
/// that row's total undefined and adds nothing. Signs are not checked.
pub fn integrate(
    rate: &DerivedSeries,
    frame: &AlignedFrame,
    unit_scale: f64,
) -> Result<DerivedSeries, TsError> {
    rate.ensure_timeline(frame.times())?;
    let deltas = delta_seconds(frame);
    let mut values = Vec::with_capacity(rate.len());
    let mut total = 0.0;
    for (i, (cell, dt)) in rate.values().iter().zip(deltas.iter()).enumerate() {
        if i == 0 {
            values.push(Some(0.0));
            continue;
        }
        match cell {
            Some(r) => {
                total += r * (dt / SECONDS_PER_HOUR) * unit_scale;
                values.push(Some(total));
            }
            None => values.push(None),
        }
    }
    DerivedSeries::new(
        format!("{}_cumulative", rate.name()),
        frame.times().to_vec(),
        values,
    )
}

/// Which denominators count as too small to divide by.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FloorRule {
    /// Guard when `value < floor`.
    Below,
    /// Guard when `value <= floor`.
    AtOrBelow,
}

impl Default for FloorRule {
    fn default() -> Self {
        FloorRule::AtOrBelow
    }
}

impl FloorRule {
    pub fn guards(self, value: f64, floor: f64) -> bool {
        match self {
            FloorRule::Below => value < floor,
            FloorRule::AtOrBelow => value <= floor,
        }
    }
}

/// Elementwise `numerator / denominator`, substituting `fallback` where the
/// denominator is guarded by `rule` against `floor` or either operand is
/// undefined.
pub fn ratio_with_floor(
    numerator: &DerivedSeries,
    denominator: &DerivedSeries,
    floor: f64,
    rule: FloorRule,
    fallback: Option<f64>,
) -> Result<DerivedSeries, TsError> {
    denominator.ensure_timeline(numerator.times())?;
    let mut substituted = 0usize;
    let values = numerator
        .values()
        .iter()
        .zip(denominator.values())
        .map(|(num, den)| match (num, den) {
            (Some(n), Some(d)) if !rule.guards(*d, floor) => Some(n / d),
            _ => {
                substituted += 1;
                fallback
            }
        })
        .collect();
    if substituted > 0 {
        debug!(
            "{} of {} ratio cells substituted ({} / {})",
            substituted,
            numerator.len(),
            numerator.name(),
            denominator.name()
        );
    }
    DerivedSeries::new(
        format!("{}_per_{}", numerator.name(), denominator.name()),
        numerator.times().to_vec(),
        values,
    )
}

/// Keep `series` only where `gate` clears `threshold`; other cells become
/// `fallback`. Used for "efficiency only while delivering power" cuts.
pub fn threshold_gate(
    series: &DerivedSeries,
    gate: &DerivedSeries,
    threshold: f64,
    rule: FloorRule,
    fallback: Option<f64>,
) -> Result<DerivedSeries, TsError> {
    gate.ensure_timeline(series.times())?;
    let values = series
        .values()
        .iter()
        .zip(gate.values())
        .map(|(value, g)| match g {
            Some(g) if !rule.guards(*g, threshold) => *value,
            _ => fallback,
        })
        .collect();
    DerivedSeries::new(series.name(), series.times().to_vec(), values)
}

/// Trailing moving average over the last `window` cells.
///
/// The window grows from one cell at the start of the series. Only defined
/// cells are averaged; a window with none stays undefined.
pub fn smooth(series: &DerivedSeries, window: usize) -> Result<DerivedSeries, TsError> {
    if window == 0 {
        return Err(TsError::InvalidParameter(
            "smoothing window must be at least 1".into(),
        ));
    }
    let mut out = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        let start = (i + 1).saturating_sub(window);
        let (sum, count) = series.values()[start..=i]
            .iter()
            .flatten()
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        out.push(if count > 0 { Some(sum / count as f64) } else { None });
    }
    DerivedSeries::new(series.name(), series.times().to_vec(), out)
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    /// `|x - mean| / std > threshold`, population standard deviation.
    Zscore,
    /// Outside `[Q1 - k*IQR, Q3 + k*IQR]` with `k = threshold`.
    Iqr,
}

impl Default for OutlierMethod {
    fn default() -> Self {
        OutlierMethod::Zscore
    }
}

/// Replace out-of-band cells with `fallback`. The timeline and the order of
/// cells are untouched; statistics use defined cells only.
pub fn filter_outliers(
    series: &DerivedSeries,
    method: OutlierMethod,
    threshold: f64,
    fallback: Option<f64>,
) -> Result<DerivedSeries, TsError> {
    if threshold.is_nan() || threshold < 0.0 {
        return Err(TsError::InvalidParameter(format!(
            "outlier threshold must be non-negative, got {}",
            threshold
        )));
    }
    let defined: Array1<f64> = series.defined().collect();
    let Some((lo, hi)) = acceptance_band(&defined, method, threshold) else {
        return Ok(series.clone());
    };

    let mut dropped = 0usize;
    let values = series
        .values()
        .iter()
        .map(|cell| match cell {
            Some(v) if *v < lo || *v > hi => {
                dropped += 1;
                fallback
            }
            other => *other,
        })
        .collect();
    if dropped > 0 {
        debug!("{}: {} outlier cells replaced ({:?})", series.name(), dropped, method);
    }
    DerivedSeries::new(series.name(), series.times().to_vec(), values)
}

/// Inclusive band of accepted values, or `None` when nothing can be flagged.
fn acceptance_band(values: &Array1<f64>, method: OutlierMethod, threshold: f64) -> Option<(f64, f64)> {
    match method {
        OutlierMethod::Zscore => {
            if values.len() < 2 {
                return None;
            }
            let mean = values.mean()?;
            let std = values.std(0.0);
            if std <= 0.0 {
                return None;
            }
            Some((mean - threshold * std, mean + threshold * std))
        }
        OutlierMethod::Iqr => {
            let sample = values.to_vec();
            let q1 = quantile_of(&sample, 0.25)?;
            let q3 = quantile_of(&sample, 0.75)?;
            let iqr = q3 - q1;
            Some((q1 - threshold * iqr, q3 + threshold * iqr))
        }
    }
}

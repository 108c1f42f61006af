//! Merging named series onto one timeline and slicing it by time window.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::series::{DerivedSeries, Series};
use crate::{Timestamp, TsError};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Union of all timestamps, gaps filled per [`FillPolicy`].
    Outer,
    /// Timestamps present in every input, exact readings only.
    Inner,
}

impl Default for JoinMode {
    fn default() -> Self {
        JoinMode::Outer
    }
}

/// What an outer join writes into a cell whose series has no sample at that row.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    Undefined,
    Zero,
    ForwardFill,
}

impl Default for FillPolicy {
    fn default() -> Self {
        FillPolicy::ForwardFill
    }
}

/// Several series merged onto one strictly ascending timeline.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AlignedFrame {
    times: Vec<Timestamp>,
    names: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
}

impl AlignedFrame {
    fn empty_with(names: Vec<String>) -> Self {
        let columns = vec![Vec::new(); names.len()];
        Self {
            times: Vec::new(),
            names,
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[Timestamp] {
        &self.times
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.times.first().copied()
    }

    pub fn stop(&self) -> Option<Timestamp> {
        self.times.last().copied()
    }

    fn column_index(&self, name: &str) -> Result<usize, TsError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| TsError::UnknownColumn(name.to_string()))
    }

    pub fn column_values(&self, name: &str) -> Result<&[Option<f64>], TsError> {
        let idx = self.column_index(name)?;
        Ok(&self.columns[idx])
    }

    /// Copy one column out as a derived series stamped with the frame timeline.
    pub fn column(&self, name: &str) -> Result<DerivedSeries, TsError> {
        let values = self.column_values(name)?.to_vec();
        DerivedSeries::new(name, self.times.clone(), values)
    }

    pub fn row(&self, index: usize) -> Option<Vec<Option<f64>>> {
        if index >= self.len() {
            return None;
        }
        Some(self.columns.iter().map(|c| c[index]).collect())
    }

    /// Sum the named columns row by row.
    ///
    /// With `skip_undefined` an undefined cell is left out of the sum and a row
    /// stays undefined only when every named cell is. Without it any undefined
    /// cell makes the row undefined.
    pub fn row_sum(
        &self,
        names: &[&str],
        skip_undefined: bool,
        out_name: impl Into<String>,
    ) -> Result<DerivedSeries, TsError> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<Vec<_>, _>>()?;
        let mut values = Vec::with_capacity(self.len());
        for row in 0..self.len() {
            let mut total: Option<f64> = None;
            let mut poisoned = false;
            for &col in &indices {
                match self.columns[col][row] {
                    Some(v) => total = Some(total.unwrap_or(0.0) + v),
                    None if !skip_undefined => {
                        poisoned = true;
                        break;
                    }
                    None => {}
                }
            }
            values.push(if poisoned { None } else { total });
        }
        DerivedSeries::new(out_name, self.times.clone(), values)
    }

    fn slice_rows(&self, lo: usize, hi: usize) -> AlignedFrame {
        AlignedFrame {
            times: self.times[lo..hi].to_vec(),
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c[lo..hi].to_vec()).collect(),
        }
    }
}

/// Merge the given series onto a single timeline.
///
/// Outer joins never fail on an empty input: that series contributes only
/// undefined cells whatever the fill policy, so a missing stream never reads
/// as zero. Inner joins with an empty input return an empty frame.
pub fn align(series: &[Series], mode: JoinMode, fill: FillPolicy) -> Result<AlignedFrame, TsError> {
    let mut seen = HashSet::new();
    for s in series {
        if !seen.insert(s.name()) {
            return Err(TsError::DuplicateSeries(s.name().to_string()));
        }
        if s.is_empty() {
            warn!("stream {} has no samples", s.name());
        }
    }
    let names: Vec<String> = series.iter().map(|s| s.name().to_string()).collect();

    match mode {
        JoinMode::Outer => Ok(align_outer(series, names, fill)),
        JoinMode::Inner => Ok(align_inner(series, names)),
    }
}

fn align_outer(series: &[Series], names: Vec<String>, fill: FillPolicy) -> AlignedFrame {
    let timeline: Vec<Timestamp> = series
        .iter()
        .flat_map(|s| s.timestamps())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut columns = Vec::with_capacity(series.len());
    for s in series {
        if s.is_empty() {
            columns.push(vec![None; timeline.len()]);
            continue;
        }
        let samples = s.samples();
        let mut column = Vec::with_capacity(timeline.len());
        let mut cursor = 0usize;
        let mut last: Option<usize> = None;
        for &t in &timeline {
            while cursor < samples.len() && samples[cursor].t <= t {
                last = Some(cursor);
                cursor += 1;
            }
            let exact = last.map(|i| samples[i]).filter(|sample| sample.t == t);
            let cell = match fill {
                FillPolicy::ForwardFill => last.map(|i| samples[i].value),
                FillPolicy::Zero => Some(exact.map(|sample| sample.value).unwrap_or(0.0)),
                FillPolicy::Undefined => exact.map(|sample| sample.value),
            };
            column.push(cell);
        }
        columns.push(column);
    }

    AlignedFrame {
        times: timeline,
        names,
        columns,
    }
}

fn align_inner(series: &[Series], names: Vec<String>) -> AlignedFrame {
    let Some(first) = series.first() else {
        return AlignedFrame::empty_with(names);
    };
    if series.iter().any(|s| s.is_empty()) {
        return AlignedFrame::empty_with(names);
    }

    let mut timeline: Vec<Timestamp> = first.timestamps().collect();
    timeline.dedup();
    timeline.retain(|&t| series[1..].iter().all(|s| s.exact(t).is_some()));

    let columns = series
        .iter()
        .map(|s| timeline.iter().map(|&t| s.exact(t)).collect())
        .collect();

    AlignedFrame {
        times: timeline,
        names,
        columns,
    }
}

/// Seconds elapsed since the previous row; the first row is always 0.
pub fn delta_seconds(frame: &AlignedFrame) -> Vec<f64> {
    elapsed_seconds(frame.times())
}

fn elapsed_seconds(times: &[Timestamp]) -> Vec<f64> {
    let mut out = Vec::with_capacity(times.len());
    if times.is_empty() {
        return out;
    }
    out.push(0.0);
    for w in times.windows(2) {
        let delta = w[1] - w[0];
        let secs = match delta.num_nanoseconds() {
            Some(ns) => ns as f64 / 1e9,
            None => delta.num_milliseconds() as f64 / 1000.0,
        };
        out.push(secs);
    }
    out
}

/// A closed interval `[start, stop]`, usually a named route leg.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Window {
    pub name: String,
    pub start: Timestamp,
    pub stop: Timestamp,
}

impl Window {
    pub fn new(name: impl Into<String>, start: Timestamp, stop: Timestamp) -> Result<Self, TsError> {
        let window = Self {
            name: name.into(),
            start,
            stop,
        };
        window.validate()?;
        Ok(window)
    }

    /// The window covering every row of `frame`, or `None` for an empty frame.
    pub fn spanning(name: impl Into<String>, frame: &AlignedFrame) -> Option<Self> {
        Some(Self {
            name: name.into(),
            start: frame.start()?,
            stop: frame.stop()?,
        })
    }

    pub fn validate(&self) -> Result<(), TsError> {
        if self.start > self.stop {
            return Err(TsError::InvalidParameter(format!(
                "window {} starts after it stops",
                self.name
            )));
        }
        Ok(())
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.stop
    }

    fn bounds(&self, times: &[Timestamp]) -> (usize, usize) {
        let lo = times.partition_point(|&t| t < self.start);
        let hi = times.partition_point(|&t| t <= self.stop).max(lo);
        (lo, hi)
    }
}

/// Rows of `frame` stamped inside `window`, inclusive on both ends.
///
/// Cumulative quantities for the slice must be re-integrated from the slice
/// itself so they restart at zero.
pub fn window_slice(frame: &AlignedFrame, window: &Window) -> AlignedFrame {
    let (lo, hi) = window.bounds(frame.times());
    if lo == hi {
        debug!("window {} selects no rows", window.name);
    }
    frame.slice_rows(lo, hi)
}

/// Cells of a derived series stamped inside `window`.
pub fn window_slice_series(series: &DerivedSeries, window: &Window) -> DerivedSeries {
    let (lo, hi) = window.bounds(series.times());
    series.slice(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_725_949_826 + secs, 0).unwrap()
    }

    fn series(name: &str, pts: &[(i64, f64)]) -> Series {
        Series::from_pairs(name, pts.iter().map(|&(t, v)| (ts(t), v))).unwrap()
    }

    #[test]
    fn single_series_timeline_is_its_timestamps() {
        let s = series("engine1_load", &[(0, 1.0), (5, 2.0), (5, 2.5), (9, 3.0)]);
        let frame = align(&[s], JoinMode::Outer, FillPolicy::ForwardFill).unwrap();
        assert_eq!(frame.times(), &[ts(0), ts(5), ts(9)]);
        assert_eq!(
            frame.column_values("engine1_load").unwrap(),
            &[Some(1.0), Some(2.5), Some(3.0)]
        );
    }

    #[test]
    fn disjoint_series_have_one_defined_cell_per_row() {
        let a = series("a", &[(0, 1.0), (10, 2.0)]);
        let b = series("b", &[(5, 7.0), (15, 8.0), (20, 9.0)]);
        let frame = align(&[a, b], JoinMode::Outer, FillPolicy::Undefined).unwrap();
        assert_eq!(frame.len(), 5);
        for i in 0..frame.len() {
            let row = frame.row(i).unwrap();
            assert_eq!(row.iter().filter(|c| c.is_some()).count(), 1);
        }
    }

    #[test]
    fn forward_fill_never_precedes_first_sample() {
        let fuel = series("fuel", &[(0, 10.0), (10, 20.0)]);
        let speed = series("speed", &[(5, 4.0)]);
        let frame = align(&[fuel, speed], JoinMode::Outer, FillPolicy::ForwardFill).unwrap();
        assert_eq!(frame.times(), &[ts(0), ts(5), ts(10)]);
        assert_eq!(
            frame.column_values("fuel").unwrap(),
            &[Some(10.0), Some(10.0), Some(20.0)]
        );
        assert_eq!(
            frame.column_values("speed").unwrap(),
            &[None, Some(4.0), Some(4.0)]
        );
    }

    #[test]
    fn zero_fill_writes_zero_into_gaps() {
        let e1 = series("engine1", &[(0, 10.0), (10, 20.0)]);
        let e3 = series("engine3", &[(5, 4.0)]);
        let frame = align(&[e1, e3], JoinMode::Outer, FillPolicy::Zero).unwrap();
        assert_eq!(
            frame.column_values("engine3").unwrap(),
            &[Some(0.0), Some(4.0), Some(0.0)]
        );
    }

    #[test]
    fn empty_stream_in_outer_join_is_all_undefined() {
        let a = series("a", &[(0, 1.0), (1, 2.0)]);
        let missing = Series::empty("missing");
        let frame = align(&[a, missing], JoinMode::Outer, FillPolicy::ForwardFill).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.column_values("missing").unwrap(), &[None, None]);
    }

    #[test]
    fn missing_stream_stays_undefined_under_zero_fill() {
        let engine1 = series("engine1", &[(0, 30.0), (900, 40.0)]);
        let frame = align(
            &[engine1, Series::empty("engine3")],
            JoinMode::Outer,
            FillPolicy::Zero,
        )
        .unwrap();
        assert_eq!(frame.column_values("engine3").unwrap(), &[None, None]);
        assert_eq!(frame.column_values("engine1").unwrap(), &[Some(30.0), Some(40.0)]);
        let engine3 = frame.column("engine3").unwrap();
        assert_eq!(crate::stats::mean(&engine3), None);
        assert_eq!(crate::stats::sum(&engine3), None);
    }

    #[test]
    fn inner_join_keeps_common_timestamps_only() {
        let port = series("port", &[(0, 10.0), (1, 11.0), (3, 13.0)]);
        let stbd = series("stbd", &[(1, 21.0), (2, 22.0), (3, 23.0)]);
        let frame = align(&[port, stbd], JoinMode::Inner, FillPolicy::ForwardFill).unwrap();
        assert_eq!(frame.times(), &[ts(1), ts(3)]);
        assert_eq!(frame.column_values("port").unwrap(), &[Some(11.0), Some(13.0)]);
        assert_eq!(frame.column_values("stbd").unwrap(), &[Some(21.0), Some(23.0)]);
    }

    #[test]
    fn inner_join_with_empty_input_is_empty() {
        let port = series("port", &[(0, 10.0)]);
        let frame = align(&[port, Series::empty("stbd")], JoinMode::Inner, FillPolicy::ForwardFill)
            .unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.names(), &["port".to_string(), "stbd".to_string()]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let a = series("a", &[(0, 1.0)]);
        let err = align(&[a.clone(), a], JoinMode::Outer, FillPolicy::ForwardFill).unwrap_err();
        assert!(matches!(err, TsError::DuplicateSeries(ref n) if n == "a"));
    }

    #[test]
    fn first_delta_is_zero() {
        let s = series("s", &[(100, 1.0), (160, 1.0), (3700, 1.0)]);
        let frame = align(&[s], JoinMode::Outer, FillPolicy::ForwardFill).unwrap();
        assert_eq!(delta_seconds(&frame), vec![0.0, 60.0, 3540.0]);
        assert!(delta_seconds(&AlignedFrame::empty_with(vec![])).is_empty());
    }

    #[test]
    fn row_sum_skip_and_poison() {
        let a = series("a", &[(0, 1.0), (2, 3.0)]);
        let b = series("b", &[(1, 10.0)]);
        let frame = align(&[a, b], JoinMode::Outer, FillPolicy::Undefined).unwrap();
        let skipped = frame.row_sum(&["a", "b"], true, "total").unwrap();
        assert_eq!(skipped.values(), vec![Some(1.0), Some(10.0), Some(3.0)]);
        let strict = frame.row_sum(&["a", "b"], false, "total").unwrap();
        assert_eq!(strict.values(), vec![None, None, None]);
        assert!(matches!(
            frame.row_sum(&["nope"], true, "x").unwrap_err(),
            TsError::UnknownColumn(_)
        ));
    }

    #[test]
    fn window_slice_is_inclusive() {
        let s = series("s", &[(0, 1.0), (10, 2.0), (20, 3.0), (30, 4.0)]);
        let frame = align(&[s], JoinMode::Outer, FillPolicy::ForwardFill).unwrap();
        let route = Window::new("Route 1", ts(10), ts(20)).unwrap();
        let sliced = window_slice(&frame, &route);
        assert_eq!(sliced.times(), &[ts(10), ts(20)]);
        assert_eq!(sliced.column_values("s").unwrap(), &[Some(2.0), Some(3.0)]);
    }

    #[test]
    fn window_outside_frame_is_empty() {
        let s = series("s", &[(0, 1.0), (10, 2.0)]);
        let frame = align(&[s], JoinMode::Outer, FillPolicy::ForwardFill).unwrap();
        let late = Window::new("late", ts(100), ts(200)).unwrap();
        assert!(window_slice(&frame, &late).is_empty());
    }

    #[test]
    fn reversed_window_is_invalid() {
        assert!(matches!(
            Window::new("bad", ts(10), ts(0)).unwrap_err(),
            TsError::InvalidParameter(_)
        ));
    }

    #[test]
    fn spanning_window_covers_frame() {
        let s = series("s", &[(3, 1.0), (8, 2.0)]);
        let frame = align(&[s], JoinMode::Outer, FillPolicy::ForwardFill).unwrap();
        let whole = Window::spanning("whole trip", &frame).unwrap();
        assert_eq!((whole.start, whole.stop), (ts(3), ts(8)));
        assert_eq!(window_slice(&frame, &whole).len(), 2);
    }
}

//! Per-window integration summaries for presentation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::align::{window_slice, window_slice_series, AlignedFrame, Window};
use crate::config::AnalysisConfig;
use crate::derive::integrate;
use crate::series::DerivedSeries;
use crate::stats;
use crate::{Timestamp, TsError};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WindowReport {
    pub name: String,
    pub start: Timestamp,
    pub stop: Timestamp,
    pub rows: usize,
    /// Integrated amount over the window; `None` when the window is empty.
    pub total: Option<f64>,
    pub mean_rate: Option<f64>,
    pub cumulative: DerivedSeries,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IntegrationReport {
    pub rate_name: String,
    pub unit_scale: f64,
    pub config_hash: String,
    pub windows: Vec<WindowReport>,
}

impl IntegrationReport {
    pub fn window(&self, name: &str) -> Result<&WindowReport, TsError> {
        self.windows
            .iter()
            .find(|w| w.name == name)
            .ok_or_else(|| TsError::UnknownWindow(name.to_string()))
    }
}

/// Integrate `rate` separately over every configured window.
///
/// Each window is sliced out of the frame and integrated on its own, so its
/// running total starts at zero on the first row inside the window.
pub fn integrate_windows(
    frame: &AlignedFrame,
    rate: &DerivedSeries,
    config: &AnalysisConfig,
    unit_scale: f64,
) -> Result<IntegrationReport, TsError> {
    rate.ensure_timeline(frame.times())?;
    let windows = config
        .windows
        .iter()
        .map(|window| integrate_window(frame, rate, window, unit_scale))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IntegrationReport {
        rate_name: rate.name().to_string(),
        unit_scale,
        config_hash: config.fingerprint()?,
        windows,
    })
}

fn integrate_window(
    frame: &AlignedFrame,
    rate: &DerivedSeries,
    window: &Window,
    unit_scale: f64,
) -> Result<WindowReport, TsError> {
    window.validate()?;
    let slice = window_slice(frame, window);
    let slice_rate = window_slice_series(rate, window);
    let cumulative = integrate(&slice_rate, &slice, unit_scale)?;
    let total = stats::last(&cumulative);
    debug!(
        "window {}: {} rows, total {:?}",
        window.name,
        slice.len(),
        total
    );
    Ok(WindowReport {
        name: window.name.clone(),
        start: window.start,
        stop: window.stop,
        rows: slice.len(),
        total,
        mean_rate: stats::mean(&slice_rate),
        cumulative,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{align, FillPolicy, JoinMode};
    use crate::ingest::{StreamRecord, StreamTable};
    use chrono::{Duration, TimeZone, Utc};

    fn at(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 9, 10, 6, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn record(var: &str, secs: i64, value: f64) -> StreamRecord {
        StreamRecord {
            var: var.to_string(),
            timestamp: at(secs),
            value,
        }
    }

    fn trip() -> (AlignedFrame, DerivedSeries) {
        let table = StreamTable::from_records(vec![
            record("Engine1/fuel_consumption", 0, 0.0),
            record("Engine1/fuel_consumption", 3600, 100.0),
            record("Engine1/fuel_consumption", 7200, 50.0),
            record("Engine1/fuel_consumption", 10800, 40.0),
            record("Engine3/fuel_consumption", 5400, 20.0),
        ]);
        let engines = table.matching("fuel_consumption").unwrap();
        let frame = align(&engines, JoinMode::Outer, FillPolicy::Zero).unwrap();
        let names: Vec<&str> = frame.names().iter().map(String::as_str).collect();
        let total = frame.row_sum(&names, true, "total_fuel_l_h").unwrap();
        (frame, total)
    }

    fn config(windows: Vec<Window>) -> AnalysisConfig {
        AnalysisConfig {
            windows,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn routes_restart_from_zero() {
        let (frame, rate) = trip();
        // rows: 0s, 3600s, 5400s, 7200s, 10800s
        assert_eq!(
            rate.values(),
            vec![Some(0.0), Some(100.0), Some(20.0), Some(50.0), Some(40.0)]
        );
        let whole = Window::spanning("whole trip", &frame).unwrap();
        let route2 = Window::new("Route 2", at(7200), at(10800)).unwrap();
        let report = integrate_windows(&frame, &rate, &config(vec![whole, route2]), 1.0).unwrap();

        let whole = report.window("whole trip").unwrap();
        assert_eq!(whole.rows, 5);
        // 100*1h + 20*0.5h + 50*0.5h + 40*1h
        assert_eq!(whole.total, Some(175.0));

        let route2 = report.window("Route 2").unwrap();
        assert_eq!(route2.rows, 2);
        assert_eq!(route2.cumulative.get(0), Some(0.0));
        assert_eq!(route2.total, Some(40.0));
        assert_eq!(route2.mean_rate, Some(45.0));
    }

    #[test]
    fn empty_window_total_is_undefined() {
        let (frame, rate) = trip();
        let ashore = Window::new("ashore", at(-7200), at(-3600)).unwrap();
        let report = integrate_windows(&frame, &rate, &config(vec![ashore]), 0.82).unwrap();
        let ashore = &report.windows[0];
        assert_eq!(ashore.rows, 0);
        assert_eq!(ashore.total, None);
        assert_eq!(ashore.mean_rate, None);
    }

    #[test]
    fn report_carries_config_hash_and_serializes() {
        let (frame, rate) = trip();
        let cfg = config(vec![Window::spanning("whole trip", &frame).unwrap()]);
        let report = integrate_windows(&frame, &rate, &cfg, 1.0).unwrap();
        assert_eq!(report.config_hash, cfg.fingerprint().unwrap());
        let json = serde_json::to_string(&report).unwrap();
        let back: IntegrationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn misaligned_rate_is_rejected() {
        let (frame, rate) = trip();
        let short = window_slice_series(&rate, &Window::new("head", at(0), at(0)).unwrap());
        assert!(integrate_windows(&frame, &short, &config(Vec::new()), 1.0).is_err());
    }

    #[test]
    fn rate_from_another_trip_is_rejected() {
        let (frame, rate) = trip();
        let shifted = DerivedSeries::new(
            rate.name(),
            rate.times().iter().map(|&t| t + Duration::seconds(1)).collect(),
            rate.values().to_vec(),
        )
        .unwrap();
        let whole = Window::spanning("whole trip", &frame).unwrap();
        let err = integrate_windows(&frame, &shifted, &config(vec![whole]), 1.0).unwrap_err();
        assert!(matches!(err, TsError::MisalignedTimeline { row: 0, .. }));
    }
}

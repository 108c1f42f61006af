//! Time-aligned resampling and integration of vessel sensor logs.
//!
//! Irregularly sampled streams (engine load, fuel flow, motor load, speed)
//! are merged onto one timeline with [`align`], turned into derived
//! quantities (ratios, smoothed and filtered series) and integrated from
//! per-hour rates into running totals over the whole trip or named windows.

use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod align;
pub mod config;
pub mod derive;
pub mod ingest;
pub mod report;
pub mod series;
pub mod stats;

pub use align::{
    align, delta_seconds, window_slice, window_slice_series, AlignedFrame, FillPolicy, JoinMode,
    Window,
};
pub use config::AnalysisConfig;
pub use derive::{
    filter_outliers, integrate, ratio_with_floor, smooth, threshold_gate, FloorRule,
    OutlierMethod,
};
pub use ingest::{StreamRecord, StreamTable};
pub use report::{integrate_windows, IntegrationReport, WindowReport};
pub use series::{DerivedSeries, Sample, Series};

/// Instants are UTC throughout.
pub type Timestamp = DateTime<Utc>;

#[derive(Error, Debug)]
pub enum TsError {
    #[error("series {series}: timestamp at index {index} precedes its predecessor")]
    UnsortedTimestamps { series: String, index: usize },
    #[error("series {series}: non-finite value at index {index}")]
    NonFiniteValue { series: String, index: usize },
    #[error("series {0} supplied more than once")]
    DuplicateSeries(String),
    #[error("length mismatch: expected {expected} rows, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("series {series}: row {row} is stamped off the shared timeline")]
    MisalignedTimeline { series: String, row: usize },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("unknown window: {0}")]
    UnknownWindow(String),
    #[error("unknown constant: {0}")]
    UnknownConstant(String),
    #[error("configuration error: {0}")]
    Config(String),
}

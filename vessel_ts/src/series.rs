use serde::{Deserialize, Serialize};

use crate::{Timestamp, TsError};

/// One reading of a measured quantity.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub t: Timestamp,
    pub value: f64,
}

impl Sample {
    pub fn new(t: Timestamp, value: f64) -> Self {
        Self { t, value }
    }
}

/// A named, time-ordered stream of samples as delivered by ingestion.
///
/// Construction rejects descending timestamps and non-finite values. Equal
/// timestamps are kept; alignment takes the last reading at a shared instant.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Series {
    name: String,
    samples: Vec<Sample>,
}

impl Series {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Result<Self, TsError> {
        let name = name.into();
        for (index, sample) in samples.iter().enumerate() {
            if !sample.value.is_finite() {
                return Err(TsError::NonFiniteValue {
                    series: name,
                    index,
                });
            }
            if index > 0 && sample.t < samples[index - 1].t {
                return Err(TsError::UnsortedTimestamps {
                    series: name,
                    index,
                });
            }
        }
        Ok(Self { name, samples })
    }

    pub fn from_pairs<I>(name: impl Into<String>, pairs: I) -> Result<Self, TsError>
    where
        I: IntoIterator<Item = (Timestamp, f64)>,
    {
        let samples = pairs
            .into_iter()
            .map(|(t, value)| Sample::new(t, value))
            .collect();
        Self::new(name, samples)
    }

    /// A series with no samples, the ingestion answer for an absent stream.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.samples.iter().map(|s| s.t)
    }

    /// Index of the last sample at or before `t`.
    pub(crate) fn last_at_or_before(&self, t: Timestamp) -> Option<usize> {
        let upper = self.samples.partition_point(|s| s.t <= t);
        upper.checked_sub(1)
    }

    /// Value of the last sample stamped exactly at `t`.
    pub(crate) fn exact(&self, t: Timestamp) -> Option<f64> {
        self.last_at_or_before(t)
            .map(|idx| self.samples[idx])
            .filter(|s| s.t == t)
            .map(|s| s.value)
    }

    /// View the raw samples as a derived series with every cell defined.
    pub fn to_derived(&self) -> DerivedSeries {
        DerivedSeries {
            name: self.name.clone(),
            times: self.samples.iter().map(|s| s.t).collect(),
            values: self.samples.iter().map(|s| Some(s.value)).collect(),
        }
    }
}

/// A per-row quantity computed from series or frame columns.
///
/// `None` marks an undefined cell (no data yet, guarded division, filtered
/// outlier). It is never conflated with zero. Times are non-decreasing and
/// there is exactly one cell per time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "DerivedSeriesParts")]
pub struct DerivedSeries {
    name: String,
    times: Vec<Timestamp>,
    values: Vec<Option<f64>>,
}

#[derive(Deserialize)]
struct DerivedSeriesParts {
    name: String,
    times: Vec<Timestamp>,
    values: Vec<Option<f64>>,
}

impl TryFrom<DerivedSeriesParts> for DerivedSeries {
    type Error = TsError;

    fn try_from(parts: DerivedSeriesParts) -> Result<Self, TsError> {
        DerivedSeries::new(parts.name, parts.times, parts.values)
    }
}

impl DerivedSeries {
    pub fn new(
        name: impl Into<String>,
        times: Vec<Timestamp>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, TsError> {
        let name = name.into();
        if times.len() != values.len() {
            return Err(TsError::LengthMismatch {
                expected: times.len(),
                found: values.len(),
            });
        }
        if let Some(index) = times.windows(2).position(|w| w[1] < w[0]) {
            return Err(TsError::UnsortedTimestamps {
                series: name,
                index: index + 1,
            });
        }
        Ok(Self {
            name,
            times,
            values,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn times(&self) -> &[Timestamp] {
        &self.times
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    /// Iterate the defined cells only.
    pub fn defined(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().filter_map(|v| *v)
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fail unless this series is stamped row for row on `times`.
    pub fn ensure_timeline(&self, times: &[Timestamp]) -> Result<(), TsError> {
        if self.len() != times.len() {
            return Err(TsError::LengthMismatch {
                expected: times.len(),
                found: self.len(),
            });
        }
        if let Some(row) = self.times.iter().zip(times).position(|(a, b)| a != b) {
            return Err(TsError::MisalignedTimeline {
                series: self.name.clone(),
                row,
            });
        }
        Ok(())
    }

    /// Rows `lo..hi`, keeping the name.
    pub(crate) fn slice(&self, lo: usize, hi: usize) -> DerivedSeries {
        DerivedSeries {
            name: self.name.clone(),
            times: self.times[lo..hi].to_vec(),
            values: self.values[lo..hi].to_vec(),
        }
    }

    /// Apply `f` to every defined cell; undefined cells stay undefined.
    pub fn map<F>(&self, f: F) -> DerivedSeries
    where
        F: Fn(f64) -> f64,
    {
        DerivedSeries {
            name: self.name.clone(),
            times: self.times.clone(),
            values: self.values.iter().map(|v| v.map(&f)).collect(),
        }
    }

    pub fn scale(&self, factor: f64) -> DerivedSeries {
        self.map(|v| v * factor)
    }

    pub fn offset(&self, delta: f64) -> DerivedSeries {
        self.map(|v| v + delta)
    }

    /// Combine two series stamped on the same timeline cell by cell. A cell
    /// is defined only when both operands are.
    pub fn zip_with<F>(
        &self,
        other: &DerivedSeries,
        name: impl Into<String>,
        f: F,
    ) -> Result<DerivedSeries, TsError>
    where
        F: Fn(f64, f64) -> f64,
    {
        other.ensure_timeline(&self.times)?;
        let values = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => Some(f(*a, *b)),
                _ => None,
            })
            .collect();
        Ok(DerivedSeries {
            name: name.into(),
            times: self.times.clone(),
            values,
        })
    }
}

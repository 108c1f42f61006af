//! In-memory stream table fed by long-format `var`/`timestamp`/`value` rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::series::{Sample, Series};
use crate::{Timestamp, TsError};

/// One logged reading, keyed by the name of the stream it belongs to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamRecord {
    pub var: String,
    pub timestamp: Timestamp,
    pub value: f64,
}

/// Readings grouped by stream name, each stream sorted by time.
#[derive(Clone, Debug, Default)]
pub struct StreamTable {
    streams: BTreeMap<String, Vec<Sample>>,
}

impl StreamTable {
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = StreamRecord>,
    {
        let mut streams: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
        for record in records {
            streams
                .entry(record.var)
                .or_default()
                .push(Sample::new(record.timestamp, record.value));
        }
        for samples in streams.values_mut() {
            // Stable sort: readings sharing a timestamp keep log order.
            samples.sort_by_key(|s| s.t);
        }
        Self { streams }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// The named stream, or an empty series when the log never mentions it.
    pub fn series(&self, name: &str) -> Result<Series, TsError> {
        match self.streams.get(name) {
            Some(samples) => Series::new(name, samples.clone()),
            None => {
                warn!("stream {} not present in log", name);
                Ok(Series::empty(name))
            }
        }
    }

    /// Every stream whose name contains `fragment`, in name order.
    pub fn matching(&self, fragment: &str) -> Result<Vec<Series>, TsError> {
        self.streams
            .iter()
            .filter(|(name, _)| name.contains(fragment))
            .map(|(name, samples)| Series::new(name.as_str(), samples.clone()))
            .collect()
    }
}

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::error::LogError;

/// A time series of double values recorded by the DAQ (chopper speeds, phases,
/// source frequency, ...). Times are in seconds relative to the run start.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeSeries {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Self {
        Self { times, values }
    }

    /// A series holding a single value at t = 0
    pub fn constant(value: f64) -> Self {
        Self {
            times: vec![0.0],
            values: vec![value],
        }
    }

    /// Check that the series has entries and as many times as values
    pub fn validate(&self, name: &str) -> Result<(), LogError> {
        if self.times.len() != self.values.len() {
            return Err(LogError::MismatchedLengths {
                name: name.to_string(),
                times: self.times.len(),
                values: self.values.len(),
            });
        }
        if self.values.is_empty() {
            return Err(LogError::Empty(name.to_string()));
        }
        Ok(())
    }

    /// Most recent value of the series
    pub fn last_value(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Mean of the series, each value weighted by how long it was held.
    ///
    /// A value is held until the next entry; the final value is held for the average
    /// spacing of the series. If the series has no duration at all, the plain
    /// arithmetic mean is returned. Returns None for an empty series.
    pub fn time_weighted_mean(&self) -> Option<f64> {
        let n = self.values.len().min(self.times.len());
        match n {
            0 => return None,
            1 => return Some(self.values[0]),
            _ => (),
        }

        let span = self.times[n - 1] - self.times[0];
        let last_hold = span / (n - 1) as f64;
        let mut weighted_sum = 0.0;
        let mut total_time = 0.0;
        for idx in 0..n {
            let hold = if idx + 1 < n {
                self.times[idx + 1] - self.times[idx]
            } else {
                last_hold
            };
            weighted_sum += self.values[idx] * hold;
            total_time += hold;
        }

        if total_time > 0.0 {
            Some(weighted_sum / total_time)
        } else {
            Some(self.values[..n].iter().sum::<f64>() / n as f64)
        }
    }
}

/// Typed access to the double time-series sample logs of a run
pub trait RunLogs {
    /// Get the named series, failing with [LogError::NotFound] if it is absent
    fn double_time_series(&self, name: &str) -> Result<&TimeSeries, LogError>;

    /// Time-weighted mean of the named series
    fn mean_value(&self, name: &str) -> Result<f64, LogError> {
        self.double_time_series(name)?
            .time_weighted_mean()
            .ok_or_else(|| LogError::Empty(name.to_string()))
    }

    /// Latest value of the named series
    fn latest_value(&self, name: &str) -> Result<f64, LogError> {
        self.double_time_series(name)?
            .last_value()
            .ok_or_else(|| LogError::Empty(name.to_string()))
    }
}

/// In-memory store of the sample logs of a run, keyed by log name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleLogs {
    logs: FxHashMap<String, TimeSeries>,
}

impl SampleLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a log
    pub fn insert(&mut self, name: &str, series: TimeSeries) {
        self.logs.insert(name.to_string(), series);
    }

    /// Builder-style helper for a log holding a single value
    pub fn with_value(mut self, name: &str, value: f64) -> Self {
        self.insert(name, TimeSeries::constant(value));
        self
    }

    /// Validate every log in the store
    pub fn validate(&self) -> Result<(), LogError> {
        for (name, series) in self.logs.iter() {
            series.validate(name)?;
        }
        Ok(())
    }
}

impl RunLogs for SampleLogs {
    fn double_time_series(&self, name: &str) -> Result<&TimeSeries, LogError> {
        self.logs
            .get(name)
            .ok_or_else(|| LogError::NotFound(name.to_string()))
    }
}

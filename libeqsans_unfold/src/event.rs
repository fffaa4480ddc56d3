use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::RunDescriptionError;
use super::instrument::DetectorGeometry;
use super::sample_logs::SampleLogs;

/// A single detected neutron
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NeutronEvent {
    /// Time of flight in microseconds
    pub tof: f64,
    /// Time of the source pulse, nanoseconds since the epoch
    pub pulse_time: i64,
}

impl NeutronEvent {
    pub fn new(tof: f64, pulse_time: i64) -> Self {
        Self { tof, pulse_time }
    }
}

/// Events recorded by one pixel, in acquisition order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventList {
    events: Vec<NeutronEvent>,
}

impl EventList {
    pub fn new(events: Vec<NeutronEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[NeutronEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Swap in a new list of events, returning the old one
    pub fn replace(&mut self, events: Vec<NeutronEvent>) -> Vec<NeutronEvent> {
        std::mem::replace(&mut self.events, events)
    }
}

impl From<Vec<NeutronEvent>> for EventList {
    fn from(events: Vec<NeutronEvent>) -> Self {
        Self { events }
    }
}

/// Sample logs and geometry of a run, as stored in the run description YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunDescription {
    pub logs: SampleLogs,
    pub geometry: DetectorGeometry,
}

impl RunDescription {
    /// Read the run description from a YAML file
    pub fn read_file(path: &Path) -> Result<Self, RunDescriptionError> {
        if !path.exists() {
            return Err(RunDescriptionError::BadFilePath(path.to_path_buf()));
        }
        let yaml_str = std::fs::read_to_string(path)?;
        let run = serde_yaml::from_str::<Self>(&yaml_str)?;
        run.logs.validate()?;
        Ok(run)
    }
}

/// Per-pixel event lists together with the logs and geometry of the run
#[derive(Debug, Clone, Default)]
pub struct EventWorkspace {
    pub pixels: Vec<EventList>,
    pub logs: SampleLogs,
    pub geometry: DetectorGeometry,
}

impl EventWorkspace {
    pub fn new(run: RunDescription, pixels: Vec<EventList>) -> Self {
        Self {
            pixels,
            logs: run.logs,
            geometry: run.geometry,
        }
    }

    pub fn n_pixels(&self) -> usize {
        self.pixels.len()
    }

    pub fn total_events(&self) -> usize {
        self.pixels.iter().map(|p| p.len()).sum()
    }
}

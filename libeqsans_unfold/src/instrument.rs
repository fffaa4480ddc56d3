use serde::{Deserialize, Serialize};

use super::constants::{
    EQSANS_CHOPPER_APERTURE, EQSANS_CHOPPER_LOCATION, EQSANS_CHOPPER_PHASE_OFFSET,
    NUMBER_OF_CHOPPERS,
};

/// Fixed mechanical parameters of one chopper disk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChopperGeometry {
    /// Distance from the moderator, in metres
    pub location: f64,
    /// Opening angle of the disk window, in degrees
    pub aperture: f64,
}

/// Chopper calibration tables for an instrument.
///
/// These are passed explicitly to the chopper system so that tests can use synthetic
/// instruments. The default is the EQSANS configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub choppers: [ChopperGeometry; NUMBER_OF_CHOPPERS],
    /// Phase offsets in microseconds, indexed by [frame_skipping as usize][chopper]
    pub phase_offsets: [[f64; NUMBER_OF_CHOPPERS]; 2],
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self::eqsans()
    }
}

impl InstrumentConfig {
    pub fn eqsans() -> Self {
        let mut choppers = [ChopperGeometry {
            location: 0.0,
            aperture: 0.0,
        }; NUMBER_OF_CHOPPERS];
        for (idx, chopper) in choppers.iter_mut().enumerate() {
            chopper.location = EQSANS_CHOPPER_LOCATION[idx];
            chopper.aperture = EQSANS_CHOPPER_APERTURE[idx];
        }
        Self {
            choppers,
            phase_offsets: EQSANS_CHOPPER_PHASE_OFFSET,
        }
    }

    /// Phase calibration offset for a chopper in the given accelerator mode
    pub fn phase_offset(&self, frame_skipping: bool, chopper_index: usize) -> f64 {
        self.phase_offsets[frame_skipping as usize][chopper_index]
    }
}

/// Source of the flight paths needed to retime events
pub trait Geometry {
    /// Source to sample distance, in metres
    fn l1(&self) -> f64;
    /// Sample to pixel distance in metres, or None if the pixel has no detector
    fn l2(&self, pixel: usize) -> Option<f64>;
    /// Source to detector-bank distance, in metres
    fn source_to_detector(&self) -> f64;
    fn n_pixels(&self) -> usize;
}

/// Geometry of a run as described in the run description file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectorGeometry {
    pub l1: f64,
    pub source_to_detector: f64,
    /// Per-pixel sample to pixel distance; null for pixels without a detector
    pub l2: Vec<Option<f64>>,
}

impl Geometry for DetectorGeometry {
    fn l1(&self) -> f64 {
        self.l1
    }

    fn l2(&self, pixel: usize) -> Option<f64> {
        self.l2.get(pixel).copied().flatten()
    }

    fn source_to_detector(&self) -> f64 {
        self.source_to_detector
    }

    fn n_pixels(&self) -> usize {
        self.l2.len()
    }
}

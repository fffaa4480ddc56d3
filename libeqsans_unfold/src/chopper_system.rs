use super::band::TransmissionBandSet;
use super::constants::{
    FRAME_SKIPPING_TOLERANCE, FREQUENCY_LOG, MICROSECONDS_PER_SECOND, NUMBER_OF_CHOPPERS,
};
use super::disk_chopper::DiskChopper;
use super::error::{FrameResolutionError, LogError};
use super::instrument::InstrumentConfig;
use super::sample_logs::RunLogs;

/// The accelerator skips every other pulse when the first chopper spins at half the
/// source frequency
pub fn is_frame_skipping(source_frequency: f64, chopper_speed: f64) -> bool {
    (chopper_speed - 0.5 * source_frequency).abs() < FRAME_SKIPPING_TOLERANCE
}

/// The four choppers of the beam line together with the source timing.
///
/// Built once per run, single threaded, and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ChopperSystem {
    choppers: Vec<DiskChopper>,
    frequency: f64,
    frame_skipping: bool,
}

impl ChopperSystem {
    /// Load the source frequency and the chopper speeds and phases from the run logs.
    ///
    /// The phase calibration table is selected by the accelerator mode, which is
    /// detected from the speed of the first chopper. Any missing log is fatal.
    pub fn from_logs(
        logs: &impl RunLogs,
        instrument: &InstrumentConfig,
    ) -> Result<Self, FrameResolutionError> {
        let frequency = match logs.mean_value(FREQUENCY_LOG) {
            Ok(f) => f,
            Err(LogError::NotFound(_)) => return Err(FrameResolutionError::FrequencyNotFound),
            Err(e) => return Err(FrameResolutionError::Chopper(e.into())),
        };
        if frequency <= 0.0 {
            return Err(FrameResolutionError::InvalidFrequency(frequency));
        }

        let mut choppers = Vec::with_capacity(NUMBER_OF_CHOPPERS);
        for (idx, geometry) in instrument.choppers.iter().enumerate() {
            let mut chopper = DiskChopper::new(idx, geometry)?;
            chopper.set_speed(logs)?;
            choppers.push(chopper);
        }

        let frame_skipping = is_frame_skipping(frequency, choppers[0].speed());
        for chopper in choppers.iter_mut() {
            let offset = instrument.phase_offset(frame_skipping, chopper.index());
            chopper.set_phase(logs, offset)?;
        }

        for chopper in choppers.iter().filter(|c| !c.is_active()) {
            log::warn!(
                "Chopper {} is not spinning (speed {} Hz) and will be ignored",
                chopper.index() + 1,
                chopper.speed()
            );
        }

        Ok(Self {
            choppers,
            frequency,
            frame_skipping,
        })
    }

    /// Build a system from choppers whose state is already known
    pub fn from_choppers(
        frequency: f64,
        choppers: Vec<DiskChopper>,
    ) -> Result<Self, FrameResolutionError> {
        if frequency <= 0.0 {
            return Err(FrameResolutionError::InvalidFrequency(frequency));
        }
        let frame_skipping = choppers
            .first()
            .map(|c| is_frame_skipping(frequency, c.speed()))
            .unwrap_or(false);
        Ok(Self {
            choppers,
            frequency,
            frame_skipping,
        })
    }

    pub fn choppers(&self) -> &[DiskChopper] {
        &self.choppers
    }

    /// Choppers that are spinning, in beam-line order
    pub fn active_choppers(&self) -> impl Iterator<Item = &DiskChopper> {
        self.choppers.iter().filter(|c| c.is_active())
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn frame_skipping(&self) -> bool {
        self.frame_skipping
    }

    /// Time between two source pulses
    pub fn pulse_period(&self) -> f64 {
        MICROSECONDS_PER_SECOND / self.frequency
    }

    /// Width of a frame; two pulse periods when skipping frames
    pub fn frame_width(&self) -> f64 {
        if self.frame_skipping {
            2.0 * self.pulse_period()
        } else {
            self.pulse_period()
        }
    }

    /// Intersect the transmission bands of all active choppers in beam-line order.
    ///
    /// Returns None if no chopper is spinning.
    pub fn transmitted_bands(
        &self,
        max_wavelength: f64,
        delay: f64,
    ) -> Result<Option<TransmissionBandSet>, FrameResolutionError> {
        let mut combined: Option<TransmissionBandSet> = None;
        for chopper in self.active_choppers() {
            let bands = chopper.transmission_bands(max_wavelength, delay, true)?;
            log::debug!(
                "Chopper {} transmits {} band(s): {:?}",
                chopper.index() + 1,
                bands.len(),
                bands.bands()
            );
            combined = Some(match combined {
                Some(previous) => previous.intersect(&bands),
                None => bands,
            });
        }
        Ok(combined)
    }
}

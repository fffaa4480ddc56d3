use super::band::{TransmissionBandSet, WavelengthBand};
use super::constants::{
    MICROSECONDS_PER_SECOND, NUMBER_OF_CHOPPERS, PHASE_LOG_PREFIX, PULSE_WIDTH, SIGMA,
    SPEED_LOG_PREFIX,
};
use super::error::{BandError, ChopperError};
use super::instrument::ChopperGeometry;
use super::sample_logs::RunLogs;

/// DiskChopper models one of the rotating disks selecting the wavelength band.
///
/// Location and aperture come from the instrument tables, speed and phase from the
/// time-averaged sample logs of the run. All times are in microseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskChopper {
    index: usize,
    location: f64,
    aperture: f64,
    phase: f64,
    speed: f64,
}

impl DiskChopper {
    /// Create a stopped chopper at the given position in the beam line
    pub fn new(index: usize, geometry: &ChopperGeometry) -> Result<Self, ChopperError> {
        Self::with_state(index, geometry.location, geometry.aperture, 0.0, 0.0)
    }

    /// Create a chopper with a fully known state.
    ///
    /// The location must be a positive distance from the moderator and the aperture
    /// within [0, 360] degrees.
    pub fn with_state(
        index: usize,
        location: f64,
        aperture: f64,
        phase: f64,
        speed: f64,
    ) -> Result<Self, ChopperError> {
        if index >= NUMBER_OF_CHOPPERS {
            return Err(ChopperError::InvalidIndex(index));
        }
        if !(location.is_finite() && location > 0.0) || !(0.0..=360.0).contains(&aperture) {
            return Err(ChopperError::InvalidGeometry {
                index,
                location,
                aperture,
            });
        }
        Ok(Self {
            index,
            location,
            aperture,
            phase,
            speed,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn location(&self) -> f64 {
        self.location
    }

    pub fn aperture(&self) -> f64 {
        self.aperture
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// A chopper only takes part in band selection if it is spinning
    pub fn is_active(&self) -> bool {
        self.speed > 0.0
    }

    /// Name of the speed log, `Speed1` to `Speed4`
    pub fn speed_log_name(&self) -> String {
        format!("{SPEED_LOG_PREFIX}{}", self.index + 1)
    }

    /// Name of the phase log, `Phase1` to `Phase4`
    pub fn phase_log_name(&self) -> String {
        format!("{PHASE_LOG_PREFIX}{}", self.index + 1)
    }

    /// Read the speed (Hz) as the time average of the speed log
    pub fn set_speed(&mut self, logs: &impl RunLogs) -> Result<(), ChopperError> {
        self.speed = logs.mean_value(&self.speed_log_name())?;
        Ok(())
    }

    /// Read the phase as the time average of the phase log minus the calibration offset
    pub fn set_phase(&mut self, logs: &impl RunLogs, offset: f64) -> Result<(), ChopperError> {
        self.phase = logs.mean_value(&self.phase_log_name())? - offset;
        Ok(())
    }

    /// Rotation period. Only meaningful for an active chopper.
    pub fn period(&self) -> f64 {
        MICROSECONDS_PER_SECOND / self.speed
    }

    /// Time the window stays open during one rotation
    pub fn transmission_duration(&self) -> f64 {
        self.period() * self.aperture / 360.0
    }

    pub fn opening_phase(&self) -> f64 {
        self.phase - 0.5 * self.transmission_duration()
    }

    pub fn closing_phase(&self) -> f64 {
        self.phase + 0.5 * self.transmission_duration()
    }

    /// Opening time of the first window whose closing edge falls in (0, period].
    ///
    /// The result may be negative when the window is open at the time of the pulse.
    pub fn rewind(&self) -> f64 {
        let period = self.period();
        let mut closing = self.closing_phase().rem_euclid(period);
        if closing <= 0.0 {
            closing += period;
        }
        closing - self.transmission_duration()
    }

    /// Wavelength of a neutron crossing this chopper at `tof + delay` after the pulse.
    ///
    /// With `pulsed`, the emission time spread of the moderator (PULSE_WIDTH per
    /// Angstrom) is taken into account. Never negative.
    pub fn tof_to_wavelength(&self, tof: f64, delay: f64, pulsed: bool) -> f64 {
        let time = tof + delay;
        if time < 0.0 {
            return 0.0;
        }
        let effective_location = if pulsed {
            self.location + SIGMA * PULSE_WIDTH
        } else {
            self.location
        };
        SIGMA * time / effective_location
    }

    /// The bands this chopper lets through, over all frames up to `max_wavelength`.
    ///
    /// Opening edges use the pulsed conversion (fastest neutrons emitted at the end of
    /// the pulse), closing edges the prompt one. The last band is clipped to
    /// `max_wavelength`. A stopped chopper transmits nothing.
    pub fn transmission_bands(
        &self,
        max_wavelength: f64,
        delay: f64,
        pulsed: bool,
    ) -> Result<TransmissionBandSet, BandError> {
        if !(max_wavelength.is_finite() && max_wavelength > 0.0) {
            return Err(BandError::InvalidLimit(max_wavelength));
        }
        let mut bands = TransmissionBandSet::new();
        if !self.is_active() {
            return Ok(bands);
        }

        let period = self.period();
        let duration = self.transmission_duration();
        let mut opening_time = self.rewind();
        let mut opening_wl = self.tof_to_wavelength(opening_time, delay, pulsed);
        while opening_wl < max_wavelength {
            let closing_wl = self
                .tof_to_wavelength(opening_time + duration, delay, false)
                .min(max_wavelength);
            if closing_wl > opening_wl {
                bands.push(WavelengthBand::new(opening_wl, closing_wl)?);
            }
            opening_time += period;
            opening_wl = self.tof_to_wavelength(opening_time, delay, pulsed);
        }
        Ok(bands)
    }
}

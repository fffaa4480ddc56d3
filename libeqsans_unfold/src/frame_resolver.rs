use serde::{Deserialize, Serialize};

use super::band::WavelengthBand;
use super::chopper_system::ChopperSystem;
use super::constants::{
    DEFAULT_MAX_FIRST_CHOPPER_FRAMES, DEFAULT_MAX_FRAME_STEPS, DEFAULT_MAX_WAVELENGTH,
    PULSE_WIDTH, SIGMA,
};
use super::disk_chopper::DiskChopper;
use super::error::FrameResolutionError;

/// How the common band of the choppers is found.
///
/// `Strict` intersects the full multi-frame band sets of every chopper and requires a
/// single band to remain. `PermissiveSearch` works from the window of each chopper in
/// its first frame and, when these windows disagree, searches for the whole-frame
/// offsets that make them overlap. The two can give slightly different answers; both
/// are kept so their outputs can be compared on the same run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameResolutionStrategy {
    Strict,
    #[default]
    PermissiveSearch,
}

/// Bounds on the frame alignment search of the permissive strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchLimits {
    /// Number of whole-frame offsets tried for the first chopper
    pub max_first_chopper_frames: u32,
    /// Frame steps tried for each following chopper, relative to the previous one
    pub max_frame_steps: u32,
    /// Return an error instead of a best-effort band when the search does not converge
    pub fail_on_exhaustion: bool,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_first_chopper_frames: DEFAULT_MAX_FIRST_CHOPPER_FRAMES,
            max_frame_steps: DEFAULT_MAX_FRAME_STEPS,
            fail_on_exhaustion: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverSettings {
    pub strategy: FrameResolutionStrategy,
    /// Upper wavelength limit of the chopper band sets (strict strategy)
    pub max_wavelength: f64,
    /// Delay added to chopper times before converting to wavelength (strict strategy)
    pub detector_delay: f64,
    pub search: SearchLimits,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            strategy: FrameResolutionStrategy::default(),
            max_wavelength: DEFAULT_MAX_WAVELENGTH,
            detector_delay: 0.0,
            search: SearchLimits::default(),
        }
    }
}

/// Steps the resolver goes through; recorded in the result for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionStage {
    ChoppersLoaded,
    BandsIntersected,
    AmbiguousWrap,
    Resolved,
    FrameOriginComputed,
}

/// Frame timing derived from the choppers, shared read-only by the event correction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChopperSystemState {
    pub pulse_period: f64,
    pub frame_width: f64,
    pub frame_offset: f64,
    pub frame_skipping: bool,
    pub frame_tof0: f64,
}

impl ChopperSystemState {
    /// Derive the frame width and offset for a TOF origin
    pub fn new(pulse_period: f64, frame_skipping: bool, frame_tof0: f64) -> Self {
        let frame_width = if frame_skipping {
            2.0 * pulse_period
        } else {
            pulse_period
        };
        Self {
            pulse_period,
            frame_width,
            frame_offset: frame_offset(frame_tof0, frame_width),
            frame_skipping,
            frame_tof0,
        }
    }
}

/// Whole number of frames the DAQ wrapped away before the fastest neutron arrives
pub fn frame_offset(frame_tof0: f64, frame_width: f64) -> f64 {
    if frame_tof0 >= frame_width {
        frame_width * (frame_tof0 / frame_width).floor()
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameResolution {
    pub strategy: FrameResolutionStrategy,
    pub state: ChopperSystemState,
    /// Band transmitted by all choppers
    pub band: WavelengthBand,
    /// Band of the second frame, only when skipping frames
    pub frame2_band: Option<WavelengthBand>,
    /// Start wavelength corrected for the source pulse width, which defines frame_tof0
    pub source_pulse_wavelength: f64,
    /// False if the frame alignment search gave up
    pub search_converged: bool,
    pub stages: Vec<ResolutionStage>,
}

/// Resolves the frame origin of a run from its chopper system
#[derive(Debug, Clone)]
pub struct FrameResolver<'a> {
    system: &'a ChopperSystem,
    settings: ResolverSettings,
}

impl<'a> FrameResolver<'a> {
    pub fn new(system: &'a ChopperSystem, settings: ResolverSettings) -> Self {
        Self { system, settings }
    }

    /// Resolve with the configured strategy.
    ///
    /// `source_to_detector` is the moderator to detector distance in metres.
    pub fn resolve(&self, source_to_detector: f64) -> Result<FrameResolution, FrameResolutionError> {
        let resolution = match self.settings.strategy {
            FrameResolutionStrategy::Strict => self.resolve_strict(source_to_detector)?,
            FrameResolutionStrategy::PermissiveSearch => {
                self.resolve_permissive(source_to_detector)?
            }
        };
        log_resolution(&resolution);
        Ok(resolution)
    }

    /// Run both strategies on the same chopper system
    pub fn resolve_both(
        &self,
        source_to_detector: f64,
    ) -> (
        Result<FrameResolution, FrameResolutionError>,
        Result<FrameResolution, FrameResolutionError>,
    ) {
        (
            self.resolve_strict(source_to_detector),
            self.resolve_permissive(source_to_detector),
        )
    }

    /// Intersect the multi-frame band sets of all active choppers; exactly one band must
    /// survive.
    pub fn resolve_strict(
        &self,
        source_to_detector: f64,
    ) -> Result<FrameResolution, FrameResolutionError> {
        check_distance(source_to_detector)?;
        let mut stages = vec![ResolutionStage::ChoppersLoaded];
        let band = self.single_transmitted_band(self.settings.detector_delay)?;
        stages.push(ResolutionStage::BandsIntersected);

        // Neutrons of the second frame left the moderator one pulse earlier
        let frame2_band = if self.system.frame_skipping() {
            Some(self.single_transmitted_band(
                self.settings.detector_delay + self.system.pulse_period(),
            )?)
        } else {
            None
        };

        let frame_tof0 = band.min() / SIGMA * source_to_detector;
        stages.push(ResolutionStage::FrameOriginComputed);
        Ok(FrameResolution {
            strategy: FrameResolutionStrategy::Strict,
            state: ChopperSystemState::new(
                self.system.pulse_period(),
                self.system.frame_skipping(),
                frame_tof0,
            ),
            band,
            frame2_band,
            source_pulse_wavelength: band.min(),
            search_converged: true,
            stages,
        })
    }

    fn single_transmitted_band(&self, delay: f64) -> Result<WavelengthBand, FrameResolutionError> {
        let bands = self
            .system
            .transmitted_bands(self.settings.max_wavelength, delay)?
            .ok_or(FrameResolutionError::NoActiveChoppers)?;
        if bands.len() != 1 {
            return Err(FrameResolutionError::IncorrectTransmittedBand(bands.len()));
        }
        Ok(bands.bands()[0])
    }

    /// Combine the first-frame window of each chopper and, if they do not overlap,
    /// search for the frame each chopper's window actually belongs to.
    pub fn resolve_permissive(
        &self,
        source_to_detector: f64,
    ) -> Result<FrameResolution, FrameResolutionError> {
        check_distance(source_to_detector)?;
        let mut stages = vec![ResolutionStage::ChoppersLoaded];
        let pulse_period = self.system.pulse_period();
        let frame_width = self.system.frame_width();
        let frame_skipping = self.system.frame_skipping();

        let mut windows: Vec<ChopperWindow> = self
            .system
            .active_choppers()
            .map(|c| ChopperWindow::new(c, frame_width, frame_skipping))
            .collect();
        if windows.is_empty() {
            return Err(FrameResolutionError::NoActiveChoppers);
        }

        let mut frame_wl_1 = f64::MIN;
        let mut frame_wl_2 = f64::MAX;
        let mut source_pulse_wl = f64::MIN;
        for window in windows.iter() {
            frame_wl_1 = frame_wl_1.max(window.wl_1);
            frame_wl_2 = frame_wl_2.min(window.wl_2);
            source_pulse_wl = source_pulse_wl.max(window.source_pulse_wl_1);
        }
        stages.push(ResolutionStage::BandsIntersected);

        let mut search_converged = true;
        if frame_wl_1 >= frame_wl_2 {
            stages.push(ResolutionStage::AmbiguousWrap);
            let outcome = self.search_frame_alignment(&windows, pulse_period);
            if outcome.converged {
                stages.push(ResolutionStage::Resolved);
                frame_wl_1 = outcome.wl_1;
                frame_wl_2 = outcome.wl_2;
                for (window, shift) in windows.iter_mut().zip(outcome.frames.iter()) {
                    window.shift_frames(*shift, pulse_period);
                }
                source_pulse_wl = source_pulse_wavelength(&windows);
            } else {
                search_converged = false;
                log::warn!(
                    "Chopper frame alignment did not converge after {} frame offsets of the first chopper; the wavelength band and TOF offset are unreliable",
                    outcome.attempts
                );
                if self.settings.search.fail_on_exhaustion {
                    return Err(FrameResolutionError::SearchExhausted {
                        attempts: outcome.attempts,
                    });
                }
                frame_wl_1 = 0.0;
                frame_wl_2 = 0.0;
                source_pulse_wl = 0.0;
            }
        }

        let band = band_or_empty(frame_wl_1, frame_wl_2);
        let frame2_band = match (frame_skipping, search_converged) {
            (false, _) => None,
            (true, true) => Some(self.second_frame_band(&windows, pulse_period)),
            (true, false) => Some(WavelengthBand::empty()),
        };

        let frame_tof0 = source_pulse_wl / SIGMA * source_to_detector;
        stages.push(ResolutionStage::FrameOriginComputed);
        Ok(FrameResolution {
            strategy: FrameResolutionStrategy::PermissiveSearch,
            state: ChopperSystemState::new(pulse_period, frame_skipping, frame_tof0),
            band,
            frame2_band,
            source_pulse_wavelength: source_pulse_wl,
            search_converged,
            stages,
        })
    }

    /// Band of the neutrons emitted one pulse before the aligned windows.
    ///
    /// Each chopper's aligned window is moved by one pulse period. The choppers move by
    /// different wavelengths, so the moved windows may no longer overlap; they are then
    /// aligned again with the same bounded search. If that fails the band is empty.
    fn second_frame_band(&self, windows: &[ChopperWindow], pulse_period: f64) -> WavelengthBand {
        let second: Vec<ChopperWindow> = windows
            .iter()
            .map(|w| w.shifted_window(1, pulse_period))
            .collect();
        let (mut wl_1, mut wl_2) = intersect_windows(&second);
        if wl_1 >= wl_2 {
            let outcome = self.search_frame_alignment(&second, pulse_period);
            if !outcome.converged {
                log::warn!(
                    "Second frame windows could not be aligned after {} frame offsets of the first chopper; the second frame band is empty",
                    outcome.attempts
                );
                return WavelengthBand::empty();
            }
            wl_1 = outcome.wl_1;
            wl_2 = outcome.wl_2;
        }
        band_or_empty(wl_1, wl_2)
    }

    /// Bounded integer search for the frame index of every chopper window.
    ///
    /// For each offset of the first chopper, every following chopper is stepped forward
    /// one frame at a time, starting at the frame of the chopper before it, until its
    /// window overlaps the running intersection. If any chopper runs out of steps, the
    /// first chopper moves on to its next frame.
    fn search_frame_alignment(&self, windows: &[ChopperWindow], pulse_period: f64) -> SearchOutcome {
        let limits = self.settings.search;
        let mut frames = vec![0u32; windows.len()];
        let mut wl_1 = windows[0].wl_1;
        let mut wl_2 = windows[0].wl_2;
        let mut attempts = 0;

        while frames[0] < limits.max_first_chopper_frames {
            attempts += 1;
            let (first_1, first_2) = windows[0].shifted(frames[0], pulse_period);
            wl_1 = first_1;
            wl_2 = first_2;

            let mut aligned = true;
            for idx in 1..windows.len() {
                let previous = frames[idx - 1];
                let mut frame = previous;
                let mut overlap = None;
                loop {
                    let (c_wl_1, c_wl_2) = windows[idx].shifted(frame, pulse_period);
                    if wl_1 < c_wl_2 && wl_2 > c_wl_1 {
                        overlap = Some((c_wl_1, c_wl_2));
                        break;
                    }
                    // Overshot: later frames only move further away
                    if wl_2 < c_wl_1 || frame - previous >= limits.max_frame_steps {
                        break;
                    }
                    frame += 1;
                }

                match overlap {
                    Some((c_wl_1, c_wl_2)) => {
                        frames[idx] = frame;
                        wl_1 = wl_1.max(c_wl_1);
                        wl_2 = wl_2.min(c_wl_2);
                    }
                    None => {
                        aligned = false;
                        break;
                    }
                }
            }

            if aligned {
                log::debug!("Chopper windows aligned with frame offsets {:?}", frames);
                return SearchOutcome {
                    converged: true,
                    frames,
                    wl_1,
                    wl_2,
                    attempts,
                };
            }
            frames[0] += 1;
        }

        SearchOutcome {
            converged: false,
            frames,
            wl_1,
            wl_2,
            attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SearchOutcome {
    converged: bool,
    frames: Vec<u32>,
    wl_1: f64,
    wl_2: f64,
    attempts: u32,
}

/// Wavelength window of one chopper, computed directly from its phase
#[derive(Debug, Clone, PartialEq)]
struct ChopperWindow {
    location: f64,
    wl_1: f64,
    wl_2: f64,
    source_pulse_wl_1: f64,
}

impl ChopperWindow {
    fn new(chopper: &DiskChopper, frame_width: f64, frame_skipping: bool) -> Self {
        let location = chopper.location();
        let mut phase = chopper.phase();
        if phase < 0.0 {
            phase = phase.rem_euclid(frame_width);
        }

        let half_opening = frame_width * 0.5 * chopper.aperture() / 360.0;
        let mut x1 = phase - half_opening;
        let mut x2 = phase + half_opening;
        if !frame_skipping && x1 < 0.0 {
            let frames = (-x1 / frame_width).ceil();
            x1 += frames * frame_width;
            x2 += frames * frame_width;
        }

        let (wl_1, source_pulse_wl_1) = if x1 > 0.0 {
            let wl = SIGMA * x1 / location;
            (wl, SIGMA * (x1 - wl * PULSE_WIDTH) / location)
        } else {
            (0.0, 0.0)
        };
        let wl_2 = if x2 > 0.0 { SIGMA * x2 / location } else { 0.0 };

        Self {
            location,
            wl_1,
            wl_2,
            source_pulse_wl_1,
        }
    }

    /// Wavelength change of this window when moved by whole pulse periods
    fn frame_shift(&self, frames: u32, pulse_period: f64) -> f64 {
        SIGMA * frames as f64 * pulse_period / self.location
    }

    fn shifted(&self, frames: u32, pulse_period: f64) -> (f64, f64) {
        let shift = self.frame_shift(frames, pulse_period);
        (self.wl_1 + shift, self.wl_2 + shift)
    }

    fn shift_frames(&mut self, frames: u32, pulse_period: f64) {
        let (wl_1, wl_2) = self.shifted(frames, pulse_period);
        self.wl_1 = wl_1;
        self.wl_2 = wl_2;
    }

    fn shifted_window(&self, frames: u32, pulse_period: f64) -> Self {
        let mut window = self.clone();
        window.shift_frames(frames, pulse_period);
        window
    }
}

/// Common range of the windows; inverted when they do not overlap
fn intersect_windows(windows: &[ChopperWindow]) -> (f64, f64) {
    windows
        .iter()
        .fold((f64::MIN, f64::MAX), |(wl_1, wl_2), w| {
            (wl_1.max(w.wl_1), wl_2.min(w.wl_2))
        })
}

fn check_distance(source_to_detector: f64) -> Result<(), FrameResolutionError> {
    if source_to_detector.is_finite() && source_to_detector > 0.0 {
        Ok(())
    } else {
        Err(FrameResolutionError::InvalidDistance(source_to_detector))
    }
}

/// Pulse-corrected start of the band after alignment, taken from whichever of the two
/// choppers furthest down the beam opens later
fn source_pulse_wavelength(windows: &[ChopperWindow]) -> f64 {
    let tail = &windows[windows.len().saturating_sub(2)..];
    let limiting = tail
        .iter()
        .fold(&tail[0], |best, w| if w.wl_1 > best.wl_1 { w } else { best });
    limiting.wl_1 - SIGMA * limiting.wl_1 * PULSE_WIDTH / limiting.location
}

fn band_or_empty(wl_1: f64, wl_2: f64) -> WavelengthBand {
    WavelengthBand::new(wl_1, wl_2).unwrap_or_else(|_| {
        log::warn!("Choppers do not define a valid band [{wl_1}, {wl_2}]; using an empty band");
        WavelengthBand::empty()
    })
}

fn log_resolution(resolution: &FrameResolution) {
    let state = &resolution.state;
    log::info!("Frame resolution strategy: {:?}", resolution.strategy);
    log::info!("Frame width {} microseconds", state.frame_width);
    log::info!("TOF offset = {} microseconds", state.frame_tof0);
    log::info!(
        "Band defined by the choppers: {} - {} Angstrom : {} ... source pulse correction",
        resolution.band.min(),
        resolution.band.max(),
        resolution.source_pulse_wavelength
    );
    log::info!("Frame skipping: {}", state.frame_skipping);
    if let Some(band) = resolution.frame2_band {
        log::info!(
            "Second frame: {} - {} Angstrom",
            band.min(),
            band.max()
        );
    }
}

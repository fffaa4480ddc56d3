use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::DEFAULT_MAX_WAVELENGTH;
use super::error::ConfigError;
use super::frame_corrector::CorrectionSettings;
use super::frame_resolver::{FrameResolutionStrategy, ResolverSettings, SearchLimits};
use super::instrument::InstrumentConfig;

/// Structure representing the application configuration. Contains pathing and correction options.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml.
/// Fields missing from a file take their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run description YAML (sample logs and geometry)
    pub run_path: PathBuf,
    /// Binary event file of the run
    pub event_path: PathBuf,
    /// Corrected event file; the summary is written next to it
    pub output_path: PathBuf,
    pub low_tof_cut: f64,
    pub high_tof_cut: f64,
    pub flight_path_correction: bool,
    pub discard_overlap: bool,
    pub strategy: FrameResolutionStrategy,
    pub max_wavelength: f64,
    pub detector_delay: f64,
    pub search: SearchLimits,
    pub n_threads: usize,
    pub instrument: InstrumentConfig,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            run_path: PathBuf::from("None"),
            event_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            low_tof_cut: 0.0,
            high_tof_cut: 0.0,
            flight_path_correction: false,
            discard_overlap: true,
            strategy: FrameResolutionStrategy::default(),
            max_wavelength: DEFAULT_MAX_WAVELENGTH,
            detector_delay: 0.0,
            search: SearchLimits::default(),
            n_threads: 1,
            instrument: InstrumentConfig::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Check the value ranges of the numeric options
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.low_tof_cut >= 0.0) || !(self.high_tof_cut >= 0.0) {
            return Err(ConfigError::InvalidValue(format!(
                "TOF cuts must be non-negative, found low {} high {}",
                self.low_tof_cut, self.high_tof_cut
            )));
        }
        if !self.is_n_threads_valid() {
            return Err(ConfigError::InvalidValue(String::from(
                "n_threads must be at least 1",
            )));
        }
        if !(self.max_wavelength > 0.0) {
            return Err(ConfigError::InvalidValue(format!(
                "max_wavelength must be positive, found {}",
                self.max_wavelength
            )));
        }
        if !self.detector_delay.is_finite() {
            return Err(ConfigError::InvalidValue(String::from(
                "detector_delay must be finite",
            )));
        }
        if self.search.max_first_chopper_frames == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "search.max_first_chopper_frames must be at least 1",
            )));
        }
        if self
            .instrument
            .choppers
            .iter()
            .any(|c| !(c.location > 0.0) || !(c.aperture > 0.0 && c.aperture <= 360.0))
        {
            return Err(ConfigError::InvalidValue(String::from(
                "chopper locations must be positive and apertures within (0, 360] degrees",
            )));
        }
        Ok(())
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            strategy: self.strategy,
            max_wavelength: self.max_wavelength,
            detector_delay: self.detector_delay,
            search: self.search,
        }
    }

    pub fn correction_settings(&self) -> CorrectionSettings {
        CorrectionSettings {
            low_tof_cut: self.low_tof_cut,
            high_tof_cut: self.high_tof_cut,
            flight_path_correction: self.flight_path_correction,
            discard_overlap: self.discard_overlap,
        }
    }

    /// Path of the YAML summary written beside the output event file
    pub fn summary_path(&self) -> PathBuf {
        self.output_path.with_extension("yml")
    }
}

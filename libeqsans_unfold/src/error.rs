use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BandError {
    #[error("Invalid wavelength band [{0}, {1}]; bounds must be non-negative with min <= max")]
    InvalidBand(f64, f64),
    #[error("Invalid wavelength limit {0}; must be finite and positive")]
    InvalidLimit(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LogError {
    #[error("{0} log not found.")]
    NotFound(String),
    #[error("Log {0} is an empty time series")]
    Empty(String),
    #[error("Log {name} has {times} times but {values} values")]
    MismatchedLengths {
        name: String,
        times: usize,
        values: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChopperError {
    #[error("DiskChopper failed to read its state from the sample logs: {0}")]
    Log(#[from] LogError),
    #[error("Invalid chopper index {0}; EQSANS has choppers 0 to 3")]
    InvalidIndex(usize),
    #[error("Chopper {index} has invalid geometry: location {location} m, aperture {aperture} degrees")]
    InvalidGeometry {
        index: usize,
        location: f64,
        aperture: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameResolutionError {
    #[error("Frequency log not found.")]
    FrequencyNotFound,
    #[error("Invalid source frequency {0} Hz")]
    InvalidFrequency(f64),
    #[error("Frame resolution failed due to chopper error: {0}")]
    Chopper(#[from] ChopperError),
    #[error("None of the choppers are spinning; cannot define a transmitted band")]
    NoActiveChoppers,
    #[error("Incorrect calculation of transmitted band: found {0} bands, expected exactly one")]
    IncorrectTransmittedBand(usize),
    #[error("Frame alignment search did not converge after {attempts} frame offsets of the first chopper")]
    SearchExhausted { attempts: u32 },
    #[error("Frame resolution failed due to band error: {0}")]
    Band(#[from] BandError),
    #[error("Invalid source to detector distance {0} m")]
    InvalidDistance(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorrectionError {
    #[error("EventFrameCorrector failed due to missing log: {0}")]
    Log(#[from] LogError),
    #[error("EventFrameCorrector was interrupted")]
    Interrupted,
    #[error("EventFrameCorrector found invalid geometry: {0}")]
    Geometry(String),
}

#[derive(Debug, Error)]
pub enum EventFileError {
    #[error("EventFile failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not open EventFile because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("EventFile has bad magic bytes {0:?}")]
    BadMagic([u8; 4]),
    #[error("EventFile has unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("EventFile ended in the middle of pixel {0}")]
    TruncatedRecord(usize),
    #[error("EventFile describes {found} pixels but the run geometry has {expected}")]
    PixelOutOfRange { found: usize, expected: usize },
    #[error("EventFile cannot store {0} pixels; the header holds at most u32::MAX")]
    TooManyPixels(usize),
}

#[derive(Debug, Error)]
pub enum RunDescriptionError {
    #[error("Could not load run description as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Run description failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Run description failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Run description has invalid sample log: {0}")]
    LogError(#[from] LogError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config has an invalid value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to run description error: {0}")]
    RunError(#[from] RunDescriptionError),
    #[error("Processor failed due to EventFile error: {0}")]
    EventFileError(#[from] EventFileError),
    #[error("Processor failed due to frame resolution error: {0}")]
    FrameError(#[from] FrameResolutionError),
    #[error("Processor failed due to correction error: {0}")]
    CorrectionError(#[from] CorrectionError),
    #[error("Processor failed to build the thread pool: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed to write the summary YAML: {0}")]
    SummaryError(#[from] serde_yaml::Error),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}

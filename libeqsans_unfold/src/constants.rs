// Neutron constants. Wavelengths are in Angstrom, times in microseconds and
// distances in metres throughout the crate.

/// Planck constant over neutron mass, in Angstrom * metre / microsecond
pub const SIGMA: f64 = 3.9560346e-3;
/// Moderator emission time per unit wavelength, in microseconds / Angstrom
pub const PULSE_WIDTH: f64 = 20.0;

pub const NUMBER_OF_CHOPPERS: usize = 4;

/// Microseconds in one second, used to turn frequencies (Hz) into periods
pub const MICROSECONDS_PER_SECOND: f64 = 1.0e6;

/// A chopper running within this many Hz of half the source frequency
/// means the accelerator is in frame-skipping mode
pub const FRAME_SKIPPING_TOLERANCE: f64 = 1.0;

// Sample log names
pub const FREQUENCY_LOG: &str = "frequency";
pub const SAMPLE_DETECTOR_DISTANCE_LOG: &str = "sample_detector_distance";
pub const SPEED_LOG_PREFIX: &str = "Speed";
pub const PHASE_LOG_PREFIX: &str = "Phase";

// Bounds of the frame alignment search
pub const DEFAULT_MAX_FIRST_CHOPPER_FRAMES: u32 = 99;
pub const DEFAULT_MAX_FRAME_STEPS: u32 = 10;

/// Default upper wavelength limit when generating chopper transmission bands
pub const DEFAULT_MAX_WAVELENGTH: f64 = 35.0;

// EQSANS chopper tables. Locations are distances from the moderator.
pub const EQSANS_CHOPPER_LOCATION: [f64; NUMBER_OF_CHOPPERS] = [5.700, 7.800, 9.497, 9.507];
pub const EQSANS_CHOPPER_APERTURE: [f64; NUMBER_OF_CHOPPERS] = [129.605, 179.989, 230.010, 230.007];
/// Indexed by [frame_skipping as usize][chopper]
pub const EQSANS_CHOPPER_PHASE_OFFSET: [[f64; NUMBER_OF_CHOPPERS]; 2] = [
    [9507.0, 9471.0, 9829.7, 9584.3],
    [19024.0, 18820.0, 19714.0, 19360.0],
];

// Event file format
pub const EVENT_FILE_MAGIC: &[u8; 4] = b"EQEV";
pub const EVENT_FILE_VERSION: u16 = 1;

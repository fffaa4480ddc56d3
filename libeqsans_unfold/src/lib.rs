//! # eqsans_unfold
//!
//! eqsans_unfold restores the true time of flight of neutron events recorded on the
//! EQSANS small-angle scattering instrument. The data acquisition stores every event
//! time modulo the width of a source frame, so slow neutrons appear to arrive early.
//! eqsans_unfold reads the four chopper disks' speeds and phases from the run logs,
//! works out which wavelength band the choppers transmit and when its fastest neutron
//! reaches the detector, and then retimes every event so that it lands in the correct
//! frame. Events that fall into the margins of the frame, or into the region where two
//! frames overlap for long flight paths, are discarded.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust before, see the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installing the tool chain.
//!
//! To build and install the CLI use `cargo install --path ./eqsans_unfold_cli` from the
//! top level repository. The binary will be installed to your cargo install location
//! (typically `~/.cargo/bin/`).
//!
//! ## Frame resolution
//!
//! Two strategies are available to find the transmitted band:
//!
//! - `Strict`: every spinning chopper produces the set of wavelength bands it opens for
//! up to `max_wavelength`. The sets are intersected in beam-line order and exactly one
//! band must survive; anything else is an error.
//! - `PermissiveSearch` (default): each chopper's window in the first frame is turned
//! into a wavelength range. If the ranges do not overlap, the window of some chopper
//! belongs to a later frame, and a bounded search steps the choppers forward by whole
//! pulse periods until they agree. If the search gives up, a warning is logged and the
//! band is left empty, unless `search.fail_on_exhaustion` is set.
//!
//! When the first chopper spins at half the source frequency the instrument is in frame
//! skipping mode: a frame spans two pulses and a second wavelength band is reported.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows. Any field may be left out to
//! use its default value.
//!
//! ```yml
//! run_path: /data/EQSANS_1234.yml
//! event_path: /data/EQSANS_1234.eqev
//! output_path: /data/corrected/EQSANS_1234.eqev
//! low_tof_cut: 500.0
//! high_tof_cut: 2000.0
//! flight_path_correction: false
//! discard_overlap: true
//! strategy: PermissiveSearch
//! max_wavelength: 35.0
//! detector_delay: 0.0
//! search:
//!   max_first_chopper_frames: 99
//!   max_frame_steps: 10
//!   fail_on_exhaustion: false
//! n_threads: 4
//! ```
//!
//! The `instrument` field holds the chopper locations (m), apertures (degrees) and phase
//! offsets (microseconds) and defaults to the EQSANS values.
//!
//! ## Input
//!
//! The run description is a YAML file holding the sample logs and the geometry:
//!
//! ```yml
//! logs:
//!   frequency: {times: [0.0], values: [60.0]}
//!   Speed1: {times: [0.0], values: [60.0]}
//!   Phase1: {times: [0.0], values: [9601.2]}
//!   # ... Speed2-4, Phase2-4 ...
//!   sample_detector_distance: {times: [0.0], values: [4000.0]}
//! geometry:
//!   l1: 14.122
//!   source_to_detector: 18.122
//!   l2: [4.0, 4.01, null]
//! ```
//!
//! Log times are in seconds, `sample_detector_distance` in millimetres. `l2` lists the
//! sample to pixel distance of every pixel in metres, `null` for a pixel without a
//! detector. Such pixels are reported and left as they are.
//!
//! Events are read from a little-endian binary file, see [`event_file`].
//!
//! ## Output
//!
//! eqsans_unfold writes the corrected events in the same binary format, and a YAML
//! summary with the same stem holding the frame skipping flag, the TOF offset, the
//! transmitted wavelength band(s) and the number of events kept and dropped.
pub mod band;
pub mod chopper_system;
pub mod config;
pub mod constants;
pub mod disk_chopper;
pub mod error;
pub mod event;
pub mod event_file;
pub mod frame_corrector;
pub mod frame_resolver;
pub mod instrument;
pub mod process;
pub mod sample_logs;
pub mod worker_status;

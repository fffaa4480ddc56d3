use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Sender;

use super::chopper_system::ChopperSystem;
use super::config::Config;
use super::error::ProcessorError;
use super::event::{EventWorkspace, RunDescription};
use super::event_file::{read_event_file_for, write_event_file};
use super::frame_corrector::{CorrectionReport, EventFrameCorrector};
use super::frame_resolver::{FrameResolution, FrameResolutionStrategy, FrameResolver};
use super::instrument::Geometry;
use super::worker_status::{ProgressReporter, Stage, WorkerStatus};

/// Scalar outputs of a corrected run, written as YAML beside the event file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionSummary {
    pub strategy: FrameResolutionStrategy,
    pub frame_skipping: bool,
    /// Time of flight of the fastest neutron in the frame (microseconds)
    pub tof_offset: f64,
    pub frame_width: f64,
    pub frame_offset: f64,
    pub wavelength_min: f64,
    pub wavelength_max: f64,
    pub wavelength_min_frame2: Option<f64>,
    pub wavelength_max_frame2: Option<f64>,
    pub source_pulse_wavelength: f64,
    pub search_converged: bool,
    pub pixels_corrected: usize,
    pub pixels_skipped: usize,
    pub events_kept: usize,
    pub events_dropped: usize,
}

impl CorrectionSummary {
    pub fn new(resolution: &FrameResolution, report: &CorrectionReport) -> Self {
        Self {
            strategy: resolution.strategy,
            frame_skipping: resolution.state.frame_skipping,
            tof_offset: resolution.state.frame_tof0,
            frame_width: resolution.state.frame_width,
            frame_offset: resolution.state.frame_offset,
            wavelength_min: resolution.band.min(),
            wavelength_max: resolution.band.max(),
            wavelength_min_frame2: resolution.frame2_band.map(|b| b.min()),
            wavelength_max_frame2: resolution.frame2_band.map(|b| b.max()),
            source_pulse_wavelength: resolution.source_pulse_wavelength,
            search_converged: resolution.search_converged,
            pixels_corrected: report.pixels_corrected,
            pixels_skipped: report.pixels_skipped,
            events_kept: report.events_kept,
            events_dropped: report.events_dropped,
        }
    }
}

/// Load the run and its events from the paths in the config
fn load_workspace(config: &Config) -> Result<EventWorkspace, ProcessorError> {
    let run = RunDescription::read_file(&config.run_path)?;
    let pixels = read_event_file_for(&config.event_path, run.geometry.n_pixels())?;
    let file_size = std::fs::metadata(&config.event_path)?.len();
    let workspace = EventWorkspace::new(run, pixels);
    log::info!(
        "Loaded {} events in {} pixels from {} ({})",
        workspace.total_events(),
        workspace.n_pixels(),
        config.event_path.to_string_lossy(),
        human_bytes::human_bytes(file_size as f64)
    );
    Ok(workspace)
}

/// The main routine of eqsans_unfold.
///
/// Resolves the frame of the run from its chopper logs, then retimes the events of every
/// pixel on a pool of `n_threads` workers. Progress is sent over `tx`; raising
/// `interrupt` stops the correction between pixels and nothing is written.
pub fn process_run(
    config: &Config,
    tx: &Sender<WorkerStatus>,
    interrupt: Option<&AtomicBool>,
) -> Result<CorrectionSummary, ProcessorError> {
    config.validate()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.n_threads)
        .build()?;

    tx.send(WorkerStatus::new(0.0, Stage::Loading))?;
    let mut workspace = load_workspace(config)?;

    tx.send(WorkerStatus::new(0.0, Stage::Resolving))?;
    let system = ChopperSystem::from_logs(&workspace.logs, &config.instrument)?;
    let resolution = FrameResolver::new(&system, config.resolver_settings())
        .resolve(workspace.geometry.source_to_detector())?;
    let corrector = EventFrameCorrector::new(
        resolution.state,
        config.correction_settings(),
        &workspace.logs,
        &workspace.geometry,
    )?;
    log::info!(
        "Nominal flight path {} m",
        corrector.nominal_flight_path()
    );

    tx.send(WorkerStatus::new(0.0, Stage::Correcting))?;
    let progress = ProgressReporter::new(workspace.n_pixels(), Some(tx), interrupt);
    let report = pool.install(|| {
        corrector.correct_pixels(&mut workspace.pixels, &workspace.geometry, &progress)
    })?;

    tx.send(WorkerStatus::new(0.0, Stage::Writing))?;
    write_event_file(&config.output_path, &workspace.pixels)?;
    let summary = CorrectionSummary::new(&resolution, &report);
    let summary_path = config.summary_path();
    std::fs::write(&summary_path, serde_yaml::to_string(&summary)?)?;
    log::info!(
        "Wrote corrected events to {} and summary to {}",
        config.output_path.to_string_lossy(),
        summary_path.to_string_lossy()
    );
    tx.send(WorkerStatus::new(1.0, Stage::Writing))?;
    Ok(summary)
}

/// The function to be called by a separate thread (typically the UI).
/// Takes ownership of the sender so the receiving side sees the channel close when
/// processing ends.
pub fn process(config: Config, tx: Sender<WorkerStatus>) -> Result<CorrectionSummary, ProcessorError> {
    log::info!("Processing run {}...", config.run_path.to_string_lossy());
    let summary = process_run(&config, &tx, None)?;
    log::info!("Finished processing run {}.", config.run_path.to_string_lossy());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CorrectionError;
    use crate::event::{EventList, NeutronEvent};
    use crate::event_file::{read_event_file, write_event_file};
    use crate::instrument::{ChopperGeometry, InstrumentConfig};
    use approx::assert_abs_diff_eq;
    use std::path::Path;
    use std::sync::mpsc;

    const RUN_YAML: &str = "\
logs:
  frequency:
    times: [0.0, 60.0]
    values: [60.0, 60.0]
  sample_detector_distance:
    times: [0.0]
    values: [4000.0]
  Speed1: {times: [0.0], values: [60.0]}
  Speed2: {times: [0.0], values: [0.0]}
  Speed3: {times: [0.0], values: [0.0]}
  Speed4: {times: [0.0], values: [0.0]}
  Phase1: {times: [0.0], values: [5500.0]}
  Phase2: {times: [0.0], values: [0.0]}
  Phase3: {times: [0.0], values: [0.0]}
  Phase4: {times: [0.0], values: [0.0]}
geometry:
  l1: 14.0
  source_to_detector: 18.0
  l2: [4.0, 4.0, null]
";

    /// One spinning chopper at 5.7 m, open from 3000 to 8000 microseconds
    fn instrument() -> InstrumentConfig {
        let mut instrument = InstrumentConfig::eqsans();
        instrument.choppers[0] = ChopperGeometry {
            location: 5.7,
            aperture: 5000.0 * 60.0 / 1.0e6 * 360.0,
        };
        instrument.phase_offsets = [[0.0; 4]; 2];
        instrument
    }

    fn setup(dir: &Path) -> Config {
        let run_path = dir.join("run.yml");
        let event_path = dir.join("run.eqev");
        std::fs::write(&run_path, RUN_YAML).unwrap();
        let pixels = vec![
            EventList::new(vec![
                NeutronEvent::new(12000.0, 10),
                NeutronEvent::new(500.0, 11),
            ]),
            EventList::new(vec![NeutronEvent::new(9000.0, 12)]),
            EventList::new(vec![NeutronEvent::new(9000.0, 13)]),
        ];
        write_event_file(&event_path, &pixels).unwrap();
        Config {
            run_path,
            event_path,
            output_path: dir.join("corrected.eqev"),
            high_tof_cut: 1000.0,
            n_threads: 2,
            instrument: instrument(),
            ..Default::default()
        }
    }

    #[test]
    fn test_process_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path());
        let (tx, rx) = mpsc::channel();
        let summary = process_run(&config, &tx, None).unwrap();
        drop(tx);

        let pulse = 1.0e6 / 60.0;
        assert!(!summary.frame_skipping);
        assert!(summary.search_converged);
        assert_abs_diff_eq!(summary.frame_width, pulse);
        assert_eq!(summary.frame_offset, 0.0);
        assert_abs_diff_eq!(
            summary.wavelength_min,
            crate::constants::SIGMA * 3000.0 / 5.7,
            epsilon = 1e-9
        );
        assert_eq!(summary.wavelength_min_frame2, None);
        assert!(summary.tof_offset > 9000.0 && summary.tof_offset < 12000.0);
        assert_eq!(summary.pixels_corrected, 2);
        assert_eq!(summary.pixels_skipped, 1);
        assert_eq!(summary.events_kept, 2);
        assert_eq!(summary.events_dropped, 1);

        let corrected = read_event_file(&config.output_path).unwrap();
        assert_eq!(corrected[0].len(), 2);
        assert_eq!(corrected[0].events()[0], NeutronEvent::new(12000.0, 10));
        assert_abs_diff_eq!(corrected[0].events()[1].tof, 500.0 + pulse, epsilon = 1e-9);
        assert!(corrected[1].is_empty());
        // No detector, so untouched
        assert_eq!(corrected[2].events(), &[NeutronEvent::new(9000.0, 13)]);

        let written: CorrectionSummary =
            serde_yaml::from_str(&std::fs::read_to_string(config.summary_path()).unwrap())
                .unwrap();
        assert_eq!(written, summary);

        let statuses: Vec<WorkerStatus> = rx.iter().collect();
        assert_eq!(statuses.first().unwrap().stage, Stage::Loading);
        assert_eq!(statuses.last().unwrap(), &WorkerStatus::new(1.0, Stage::Writing));
    }

    #[test]
    fn test_interrupted_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path());
        let (tx, _rx) = mpsc::channel();
        let flag = AtomicBool::new(true);
        let result = process_run(&config, &tx, Some(&flag));
        assert!(matches!(
            result,
            Err(ProcessorError::CorrectionError(CorrectionError::Interrupted))
        ));
        assert!(!config.output_path.exists());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            n_threads: 0,
            ..setup(dir.path())
        };
        let (tx, _rx) = mpsc::channel();
        assert!(matches!(
            process_run(&config, &tx, None),
            Err(ProcessorError::ConfigError(_))
        ));
    }

    #[test]
    fn test_non_positive_source_to_detector_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path());
        let bad_distance = RUN_YAML.replace("source_to_detector: 18.0", "source_to_detector: 0.0");
        std::fs::write(&config.run_path, bad_distance).unwrap();
        let (tx, _rx) = mpsc::channel();
        assert!(matches!(
            process_run(&config, &tx, None),
            Err(ProcessorError::FrameError(
                crate::error::FrameResolutionError::InvalidDistance(d)
            )) if d == 0.0
        ));
        assert!(!config.output_path.exists());
    }

    #[test]
    fn test_missing_chopper_log_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(dir.path());
        let without_frequency = RUN_YAML.replace("  frequency:", "  source_frequency:");
        std::fs::write(&config.run_path, without_frequency).unwrap();
        let (tx, _rx) = mpsc::channel();
        assert!(matches!(
            process(config, tx),
            Err(ProcessorError::FrameError(
                crate::error::FrameResolutionError::FrequencyNotFound
            ))
        ));
    }
}

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::constants::SAMPLE_DETECTOR_DISTANCE_LOG;
use super::error::CorrectionError;
use super::event::{EventList, NeutronEvent};
use super::frame_resolver::ChopperSystemState;
use super::instrument::Geometry;
use super::sample_logs::RunLogs;
use super::worker_status::ProgressReporter;

/// User-tunable options of the event correction
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrectionSettings {
    /// Events closer than this to the start of the frame are dropped (microseconds)
    pub low_tof_cut: f64,
    /// Events closer than this to the end of the frame are dropped (microseconds)
    pub high_tof_cut: f64,
    /// Scale times of flight to the nominal source-sample-detector path
    pub flight_path_correction: bool,
    /// Drop events in the region where neighbouring frames overlap
    pub discard_overlap: bool,
}

/// Flight path dependent quantities of a single pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelTiming {
    /// Ratio of the pixel flight path to the nominal one
    pub tof_factor: f64,
    /// Width after the start of the frame where events of two frames mix. When skipping
    /// frames the same width follows the second pulse as well.
    pub overlap_width: f64,
}

/// Tally of a correction pass, merged across threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub pixels_corrected: usize,
    pub pixels_skipped: usize,
    pub events_kept: usize,
    pub events_dropped: usize,
}

impl CorrectionReport {
    fn merge(self, other: Self) -> Self {
        Self {
            pixels_corrected: self.pixels_corrected + other.pixels_corrected,
            pixels_skipped: self.pixels_skipped + other.pixels_skipped,
            events_kept: self.events_kept + other.events_kept,
            events_dropped: self.events_dropped + other.events_dropped,
        }
    }
}

/// Position of a time within its frame, truncated to 0.1 microsecond.
///
/// Negative times keep their sign, so they always fall before the low cut.
pub fn position_in_frame(rel_tof: f64, frame_width: f64) -> f64 {
    let width_ticks = (frame_width * 10.0).floor() as i64;
    if width_ticks <= 0 {
        return rel_tof;
    }
    (((rel_tof * 10.0).floor() as i64) % width_ticks) as f64 * 0.1
}

/// Rewrites the time of flight of every event relative to the resolved frame origin
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrameCorrector {
    state: ChopperSystemState,
    settings: CorrectionSettings,
    l1: f64,
    nominal_flight_path: f64,
}

impl EventFrameCorrector {
    /// Set up the correction. The nominal flight path is the source-sample distance
    /// plus the last `sample_detector_distance` log entry (in mm); a missing log is fatal.
    pub fn new(
        state: ChopperSystemState,
        settings: CorrectionSettings,
        logs: &impl RunLogs,
        geometry: &impl Geometry,
    ) -> Result<Self, CorrectionError> {
        let sample_detector = logs.latest_value(SAMPLE_DETECTOR_DISTANCE_LOG)? / 1000.0;
        let l1 = geometry.l1();
        let nominal_flight_path = l1 + sample_detector;
        if !(l1 > 0.0) || !(nominal_flight_path > 0.0) {
            return Err(CorrectionError::Geometry(format!(
                "source-sample distance {l1} m and nominal flight path {nominal_flight_path} m must be positive"
            )));
        }
        Ok(Self {
            state,
            settings,
            l1,
            nominal_flight_path,
        })
    }

    pub fn nominal_flight_path(&self) -> f64 {
        self.nominal_flight_path
    }

    /// Timing quantities of a pixel at `l2` metres from the sample
    pub fn pixel_timing(&self, l2: f64) -> PixelTiming {
        let flight_path = self.l1 + l2;
        let excess = ((flight_path - self.nominal_flight_path) / self.nominal_flight_path).max(0.0);
        PixelTiming {
            tof_factor: flight_path / self.nominal_flight_path,
            overlap_width: excess * self.state.frame_width,
        }
    }

    /// Corrected time of flight of one event, or None if the event must be dropped
    pub fn correct_tof(&self, tof: f64, timing: &PixelTiming) -> Option<f64> {
        let state = &self.state;
        let mut new_tof = tof + state.frame_offset;
        if self.settings.flight_path_correction {
            new_tof /= timing.tof_factor;
        }
        // Faster than the fastest neutron: it wrapped one more frame
        if new_tof < state.frame_tof0 {
            new_tof += state.frame_width;
        }

        let rel_tof = new_tof - state.frame_tof0;
        let x = position_in_frame(rel_tof, state.frame_width);
        if x < self.settings.low_tof_cut || x > state.frame_width - self.settings.high_tof_cut {
            return None;
        }
        // Each pulse of a skipping pair starts its own overlap region
        let pulse_x = if state.frame_skipping && x >= state.pulse_period {
            x - state.pulse_period
        } else {
            x
        };
        if self.settings.discard_overlap && pulse_x < timing.overlap_width {
            return None;
        }

        // The second frame of a skipping pair came from the earlier pulse
        if state.frame_skipping && rel_tof > state.pulse_period {
            new_tof += state.pulse_period;
        }
        Some(new_tof)
    }

    /// Correct the events of one pixel, returning the retimed survivors in order
    pub fn correct_events(&self, events: &[NeutronEvent], timing: &PixelTiming) -> Vec<NeutronEvent> {
        events
            .iter()
            .filter_map(|event| {
                self.correct_tof(event.tof, timing)
                    .map(|tof| NeutronEvent::new(tof, event.pulse_time))
            })
            .collect()
    }

    /// Correct every pixel in parallel.
    ///
    /// Each pixel's list is replaced in one step once its events are processed. Pixels
    /// without a detector are left untouched. Interruption aborts the whole pass.
    pub fn correct_pixels(
        &self,
        pixels: &mut [EventList],
        geometry: &(impl Geometry + Sync),
        progress: &ProgressReporter,
    ) -> Result<CorrectionReport, CorrectionError> {
        let report = pixels
            .par_iter_mut()
            .enumerate()
            .try_fold(CorrectionReport::default, |mut report, (idx, list)| {
                if progress.is_interrupted() {
                    return Err(CorrectionError::Interrupted);
                }
                match geometry.l2(idx) {
                    Some(l2) => {
                        let timing = self.pixel_timing(l2);
                        let corrected = self.correct_events(list.events(), &timing);
                        report.events_dropped += list.len() - corrected.len();
                        report.events_kept += corrected.len();
                        report.pixels_corrected += 1;
                        list.replace(corrected);
                    }
                    None => {
                        log::warn!("Pixel {idx} has no detector assigned to it - skipping");
                        report.pixels_skipped += 1;
                    }
                }
                progress.tick();
                Ok(report)
            })
            .try_reduce(CorrectionReport::default, |a, b| Ok(a.merge(b)))?;

        log::info!(
            "Corrected {} pixels ({} skipped): kept {} events, dropped {}",
            report.pixels_corrected,
            report.pixels_skipped,
            report.events_kept,
            report.events_dropped
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::DetectorGeometry;
    use crate::sample_logs::{SampleLogs, TimeSeries};
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::AtomicBool;

    const PULSE: f64 = 1.0e6 / 60.0;

    fn logs() -> SampleLogs {
        SampleLogs::new().with_value("sample_detector_distance", 4000.0)
    }

    fn geometry(l2: Vec<Option<f64>>) -> DetectorGeometry {
        DetectorGeometry {
            l1: 14.0,
            source_to_detector: 18.0,
            l2,
        }
    }

    fn corrector(state: ChopperSystemState, settings: CorrectionSettings) -> EventFrameCorrector {
        EventFrameCorrector::new(state, settings, &logs(), &geometry(vec![])).unwrap()
    }

    fn nominal(c: &EventFrameCorrector) -> PixelTiming {
        assert_abs_diff_eq!(c.nominal_flight_path(), 18.0);
        c.pixel_timing(4.0)
    }

    #[test]
    fn test_position_in_frame() {
        assert_abs_diff_eq!(position_in_frame(500.0, PULSE), 500.0);
        assert_abs_diff_eq!(position_in_frame(499.99, PULSE), 499.9, epsilon = 1e-9);
        assert_abs_diff_eq!(position_in_frame(PULSE + 100.0, PULSE), 100.0, epsilon = 1e-9);
        assert!(position_in_frame(-5.0, PULSE) < 0.0);
    }

    #[test]
    fn test_wrapped_event_moves_one_frame() {
        let state = ChopperSystemState::new(PULSE, false, 1000.0);
        assert_eq!(state.frame_offset, 0.0);
        let c = corrector(state, CorrectionSettings::default());
        let timing = nominal(&c);
        assert_abs_diff_eq!(timing.tof_factor, 1.0);
        assert_abs_diff_eq!(timing.overlap_width, 0.0);
        let new_tof = c.correct_tof(500.0, &timing).unwrap();
        assert_abs_diff_eq!(new_tof, 500.0 + PULSE);
        assert_abs_diff_eq!(new_tof, 17166.666666, epsilon = 1e-4);

        let with_high_cut = corrector(
            state,
            CorrectionSettings {
                high_tof_cut: 1000.0,
                ..Default::default()
            },
        );
        assert_eq!(with_high_cut.correct_tof(500.0, &timing), None);
        assert_eq!(with_high_cut.correct_tof(1500.0, &timing), Some(1500.0));
    }

    #[test]
    fn test_low_cut_boundary() {
        let state = ChopperSystemState::new(PULSE, false, 1000.0);
        let c = corrector(
            state,
            CorrectionSettings {
                low_tof_cut: 500.0,
                ..Default::default()
            },
        );
        let timing = nominal(&c);
        assert_eq!(c.correct_tof(1500.0, &timing), Some(1500.0));
        assert_eq!(c.correct_tof(1499.99, &timing), None);
    }

    #[test]
    fn test_frame_offset_applied() {
        let state = ChopperSystemState::new(PULSE, false, 20000.0);
        assert_abs_diff_eq!(state.frame_offset, PULSE);
        let c = corrector(state, CorrectionSettings::default());
        let timing = nominal(&c);
        // 4000 + offset is past the fastest neutron
        assert_abs_diff_eq!(c.correct_tof(4000.0, &timing).unwrap(), 4000.0 + PULSE);
        // 2000 + offset is not, so it wrapped once more
        assert_abs_diff_eq!(
            c.correct_tof(2000.0, &timing).unwrap(),
            2000.0 + 2.0 * PULSE,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_flight_path_correction() {
        let state = ChopperSystemState::new(PULSE, false, 1000.0);
        let c = corrector(
            state,
            CorrectionSettings {
                flight_path_correction: true,
                ..Default::default()
            },
        );
        let timing = c.pixel_timing(4.9);
        assert_abs_diff_eq!(timing.tof_factor, 18.9 / 18.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            c.correct_tof(9450.0, &timing).unwrap(),
            9000.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_overlap_region() {
        let state = ChopperSystemState::new(PULSE, false, 1000.0);
        let settings = CorrectionSettings {
            discard_overlap: true,
            ..Default::default()
        };
        let c = corrector(state, settings);
        // 10% longer flight path
        let timing = c.pixel_timing(5.8);
        assert_abs_diff_eq!(timing.overlap_width, 0.1 * PULSE, epsilon = 1e-9);
        assert_eq!(c.correct_tof(1500.0, &timing), None);
        assert_eq!(c.correct_tof(1000.0 + 0.2 * PULSE, &timing), Some(1000.0 + 0.2 * PULSE));
        // shorter paths do not overlap
        assert_eq!(c.pixel_timing(3.0).overlap_width, 0.0);

        let skipping = corrector(ChopperSystemState::new(PULSE, true, 1000.0), settings);
        assert_abs_diff_eq!(
            skipping.pixel_timing(5.8).overlap_width,
            0.2 * PULSE,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_overlap_after_second_pulse() {
        let state = ChopperSystemState::new(PULSE, true, 1000.0);
        let settings = CorrectionSettings {
            discard_overlap: true,
            ..Default::default()
        };
        let c = corrector(state, settings);
        let timing = c.pixel_timing(5.8);
        assert_abs_diff_eq!(timing.overlap_width, 0.2 * PULSE, epsilon = 1e-9);

        // Just after the start of the frame and just after the second pulse
        assert_eq!(c.correct_tof(1500.0, &timing), None);
        assert_eq!(c.correct_tof(1000.0 + PULSE + 100.0, &timing), None);
        // Clear of both overlap regions
        assert_eq!(c.correct_tof(6000.0, &timing), Some(6000.0));
        assert_eq!(c.correct_tof(1000.0 + PULSE - 10.0, &timing), Some(1000.0 + PULSE - 10.0));
        assert_abs_diff_eq!(
            c.correct_tof(1000.0 + PULSE + 4000.0, &timing).unwrap(),
            1000.0 + 2.0 * PULSE + 4000.0,
            epsilon = 1e-9
        );

        let keep_all = corrector(
            state,
            CorrectionSettings {
                discard_overlap: false,
                ..settings
            },
        );
        assert_abs_diff_eq!(
            keep_all.correct_tof(1000.0 + PULSE + 100.0, &timing).unwrap(),
            1000.0 + 2.0 * PULSE + 100.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_frame_skipping_second_frame() {
        let state = ChopperSystemState::new(PULSE, true, 1000.0);
        assert_eq!(state.frame_width, 2.0 * PULSE);
        let c = corrector(state, CorrectionSettings::default());
        let timing = nominal(&c);
        assert_eq!(c.correct_tof(5000.0, &timing), Some(5000.0));
        // Wrapped below the origin: one frame later, then past one pulse
        assert_abs_diff_eq!(
            c.correct_tof(500.0, &timing).unwrap(),
            500.0 + 3.0 * PULSE,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_correction_is_idempotent() {
        let state = ChopperSystemState::new(PULSE, false, 1000.0);
        let c = corrector(state, CorrectionSettings::default());
        let geometry = geometry(vec![Some(4.0), Some(4.0)]);
        let mut pixels = vec![
            EventList::new(vec![
                NeutronEvent::new(100.0, 1),
                NeutronEvent::new(1200.0, 1),
                NeutronEvent::new(16000.0, 2),
            ]),
            EventList::new(vec![NeutronEvent::new(999.0, 3)]),
        ];
        let first = c
            .correct_pixels(&mut pixels, &geometry, &ProgressReporter::silent(2))
            .unwrap();
        assert_eq!(first.events_kept, 4);
        let once = pixels.clone();
        let second = c
            .correct_pixels(&mut pixels, &geometry, &ProgressReporter::silent(2))
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(pixels, once);
    }

    #[test]
    fn test_pixels_without_detector_are_skipped() {
        let state = ChopperSystemState::new(PULSE, false, 1000.0);
        let c = corrector(
            state,
            CorrectionSettings {
                low_tof_cut: 100.0,
                ..Default::default()
            },
        );
        let geometry = geometry(vec![Some(4.0), None]);
        let untouched = EventList::new(vec![NeutronEvent::new(1000.0, 7)]);
        let mut pixels = vec![
            EventList::new(vec![NeutronEvent::new(1000.0, 7), NeutronEvent::new(3000.0, 8)]),
            untouched.clone(),
        ];
        let report = c
            .correct_pixels(&mut pixels, &geometry, &ProgressReporter::silent(2))
            .unwrap();
        assert_eq!(
            report,
            CorrectionReport {
                pixels_corrected: 1,
                pixels_skipped: 1,
                events_kept: 1,
                events_dropped: 1,
            }
        );
        assert_eq!(pixels[0].events(), &[NeutronEvent::new(3000.0, 8)]);
        assert_eq!(pixels[1], untouched);
    }

    #[test]
    fn test_interrupted() {
        let state = ChopperSystemState::new(PULSE, false, 1000.0);
        let c = corrector(state, CorrectionSettings::default());
        let geometry = geometry(vec![Some(4.0); 8]);
        let mut pixels = vec![EventList::new(vec![NeutronEvent::new(1000.0, 1)]); 8];
        let flag = AtomicBool::new(true);
        let progress = ProgressReporter::new(8, None, Some(&flag));
        assert_eq!(
            c.correct_pixels(&mut pixels, &geometry, &progress),
            Err(CorrectionError::Interrupted)
        );
    }

    #[test]
    fn test_detector_moved_during_run() {
        let state = ChopperSystemState::new(PULSE, false, 1000.0);
        let mut logs = SampleLogs::new();
        logs.insert(
            "sample_detector_distance",
            TimeSeries::new(vec![0.0, 10.0, 600.0], vec![1300.0, 2500.0, 4000.0]),
        );
        let c = EventFrameCorrector::new(
            state,
            CorrectionSettings::default(),
            &logs,
            &geometry(vec![]),
        )
        .unwrap();
        assert_abs_diff_eq!(c.nominal_flight_path(), 18.0);

        logs.insert("sample_detector_distance", TimeSeries::default());
        assert_eq!(
            EventFrameCorrector::new(state, CorrectionSettings::default(), &logs, &geometry(vec![])),
            Err(CorrectionError::Log(crate::error::LogError::Empty(String::from(
                "sample_detector_distance"
            ))))
        );
    }

    #[test]
    fn test_missing_distance_log() {
        let state = ChopperSystemState::new(PULSE, false, 1000.0);
        let result = EventFrameCorrector::new(
            state,
            CorrectionSettings::default(),
            &SampleLogs::new(),
            &geometry(vec![]),
        );
        assert_eq!(
            result,
            Err(CorrectionError::Log(crate::error::LogError::NotFound(
                String::from("sample_detector_distance")
            )))
        );
    }
}

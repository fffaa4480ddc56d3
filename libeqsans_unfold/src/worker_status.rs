use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;

/// Which part of the pipeline a status message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Loading,
    Resolving,
    Correcting,
    Writing,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub stage: Stage,
}

impl WorkerStatus {
    pub fn new(progress: f32, stage: Stage) -> Self {
        Self { progress, stage }
    }
}

/// Shared progress counter for the parallel event correction.
///
/// Every thread ticks it once per pixel; a status message is sent roughly every
/// percent. The optional interrupt flag is polled between pixels.
#[derive(Debug)]
pub struct ProgressReporter<'a> {
    tx: Option<&'a Sender<WorkerStatus>>,
    interrupt: Option<&'a AtomicBool>,
    total: usize,
    stride: usize,
    done: AtomicUsize,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(
        total: usize,
        tx: Option<&'a Sender<WorkerStatus>>,
        interrupt: Option<&'a AtomicBool>,
    ) -> Self {
        Self {
            tx,
            interrupt,
            total,
            stride: (total / 100).max(1),
            done: AtomicUsize::new(0),
        }
    }

    /// A reporter that reports to nobody and is never interrupted
    pub fn silent(total: usize) -> Self {
        Self::new(total, None, None)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    pub fn completed(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    /// Mark one pixel as done
    pub fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.stride != 0 && done != self.total {
            return;
        }
        if let Some(tx) = self.tx {
            let progress = done as f32 / self.total.max(1) as f32;
            // A closed channel only means nobody is watching
            if tx.send(WorkerStatus::new(progress, Stage::Correcting)).is_err() {
                log::debug!("Progress receiver hung up");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_progress_messages() {
        let (tx, rx) = mpsc::channel::<WorkerStatus>();
        let reporter = ProgressReporter::new(250, Some(&tx), None);
        for _ in 0..250 {
            reporter.tick();
        }
        assert_eq!(reporter.completed(), 250);
        drop(tx);
        let statuses: Vec<WorkerStatus> = rx.iter().collect();
        // every 2 pixels, the final pixel included
        assert_eq!(statuses.len(), 125);
        assert_eq!(statuses.last().unwrap().progress, 1.0);
        assert!(statuses.iter().all(|s| s.stage == Stage::Correcting));
    }

    #[test]
    fn test_interrupt() {
        let flag = AtomicBool::new(false);
        let reporter = ProgressReporter::new(10, None, Some(&flag));
        assert!(!reporter.is_interrupted());
        flag.store(true, Ordering::Relaxed);
        assert!(reporter.is_interrupted());
        assert!(!ProgressReporter::silent(10).is_interrupted());
    }
}

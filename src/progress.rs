// src/progress.rs
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Enumeration,
    Resolution,
    Geolocation,
    Aggregation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Enumeration => "CT log enumeration",
            Stage::Resolution => "DNS resolution",
            Stage::Geolocation => "Geolocation",
            Stage::Aggregation => "Aggregation",
        };
        f.write_str(label)
    }
}

/// Status events emitted by the pipeline components.
#[derive(Debug, Clone)]
pub enum ReportEvent {
    StageStarted { stage: Stage, total: usize },
    Advanced { stage: Stage, count: usize },
    StageFinished { stage: Stage, summary: String },
    SourceQueried { source: String, found: usize },
    SourceFailed { source: String, error: String },
    Retrying { source: String, attempt: u32, max_attempts: u32, delay: Duration },
    BatchFailed { index: usize, size: usize, error: String },
    Cancelled { stage: Stage },
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: ReportEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: ReportEvent) {}
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, event: ReportEvent) {
        match event {
            ReportEvent::StageStarted { stage, total } => info!("{}: {} items", stage, total),
            ReportEvent::Advanced { .. } => {}
            ReportEvent::StageFinished { stage, summary } => info!("{} complete: {}", stage, summary),
            ReportEvent::SourceQueried { source, found } => {
                info!("[{}] Found {} subdomains", source, found)
            }
            ReportEvent::SourceFailed { source, error } => warn!("[{}] Query failed: {}", source, error),
            ReportEvent::Retrying { source, attempt, max_attempts, delay } => warn!(
                "[{}] unavailable (attempt {}/{}), retrying in {:?}",
                source, attempt, max_attempts, delay
            ),
            ReportEvent::BatchFailed { index, size, error } => {
                warn!("Batch {} ({} addresses) geo lookup failed: {}", index + 1, size, error)
            }
            ReportEvent::Cancelled { stage } => warn!("{} cancelled, keeping partial results", stage),
        }
    }
}

/// Draws a progress bar per counted stage and logs everything else.
pub struct ProgressReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self { bar: Mutex::new(None) }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<20} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }
}

impl Reporter for ProgressReporter {
    fn report(&self, event: ReportEvent) {
        let mut bar = match self.bar.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match event {
            ReportEvent::StageStarted { stage, total }
                if matches!(stage, Stage::Resolution | Stage::Geolocation) =>
            {
                let pb = ProgressBar::new(total as u64);
                pb.set_style(Self::style());
                pb.set_message(stage.to_string());
                *bar = Some(pb);
            }
            ReportEvent::Advanced { count, .. } => {
                if let Some(pb) = bar.as_ref() {
                    pb.inc(count as u64);
                }
            }
            ReportEvent::StageFinished { .. } | ReportEvent::Cancelled { .. } => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                LogReporter.report(event);
            }
            other => {
                if let Some(pb) = bar.as_ref() {
                    pb.suspend(|| LogReporter.report(other));
                } else {
                    LogReporter.report(other);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Keeps every event for assertions.
    #[derive(Default)]
    pub struct RecordingReporter {
        pub events: Mutex<Vec<ReportEvent>>,
    }

    impl RecordingReporter {
        pub fn events(&self) -> Vec<ReportEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Reporter for RecordingReporter {
        fn report(&self, event: ReportEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_reporter_handles_full_stage() {
        let reporter = ProgressReporter::new();
        reporter.report(ReportEvent::StageStarted { stage: Stage::Resolution, total: 3 });
        reporter.report(ReportEvent::Advanced { stage: Stage::Resolution, count: 2 });
        assert_eq!(reporter.bar.lock().unwrap().as_ref().map(|pb| pb.position()), Some(2));

        reporter.report(ReportEvent::StageFinished {
            stage: Stage::Resolution,
            summary: "2 alive".to_string(),
        });
        assert!(reporter.bar.lock().unwrap().is_none());
    }

    #[test]
    fn test_enumeration_stage_has_no_bar() {
        let reporter = ProgressReporter::new();
        reporter.report(ReportEvent::StageStarted { stage: Stage::Enumeration, total: 1 });
        assert!(reporter.bar.lock().unwrap().is_none());
    }
}

//! Progress tracking for export operations
//!
//! This module provides the progress notifications emitted by the pipeline
//! and a progress bar that renders them, giving users real-time feedback on
//! long-running exports.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::warn;

/// Pipeline phase with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportProgress {
    /// Submitting the search job
    CreatingJob,

    /// Polling the job; `progress` is the service's done-progress (0.0–1.0)
    WaitingForJob { progress: f64 },

    /// One batch was fetched
    FetchingResults {
        /// Records fetched so far
        fetched: u64,
        /// Records expected in total
        total: u64,
        /// 1-based number of the batch just fetched
        batch: u64,
        /// Batches expected in total
        total_batches: u64,
    },

    /// All output was written
    Complete { exported: u64, total: u64 },
}

/// Receives progress notifications from the pipeline.
///
/// Called repeatedly from the single export flow. Implementations must not
/// block; a panic inside an observer is caught and logged.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &ExportProgress);
}

/// Delivers notifications to an optional observer without letting observer
/// failures reach the pipeline.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl ProgressReporter {
    pub fn new(observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            observer: Some(observer),
        }
    }

    /// A reporter that drops every notification
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn report(&self, progress: ExportProgress) {
        let Some(observer) = &self.observer else {
            return;
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_progress(&progress)));
        if outcome.is_err() {
            warn!(?progress, "Progress observer panicked; notification dropped");
        }
    }
}

const PHASE_IDLE: u8 = 0;
const PHASE_WAITING: u8 = 1;
const PHASE_FETCHING: u8 = 2;

/// Progress bar for export operations
///
/// Shows a spinner while the job runs on the server, then a bar with speed
/// and ETA while results are fetched. Renders to stderr so stdout stays
/// usable for exported data.
pub struct ProgressTracker {
    /// Current display phase
    phase: AtomicU8,
    /// Start time of the fetch phase, reset when fetching begins
    start_time: Mutex<Instant>,
    /// Progress bar (hidden when disabled)
    bar: ProgressBar,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `enable_bar` - Whether to draw anything
    ///
    /// # Returns
    /// * `Self` - New progress tracker instance
    pub fn new(enable_bar: bool) -> Self {
        let bar = if enable_bar {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr())
        } else {
            ProgressBar::hidden()
        };

        Self {
            phase: AtomicU8::new(PHASE_IDLE),
            start_time: Mutex::new(Instant::now()),
            bar,
        }
    }

    fn enter_waiting(&self) {
        if self.phase.swap(PHASE_WAITING, Ordering::Relaxed) == PHASE_WAITING {
            return;
        }
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            self.bar.set_style(style);
        }
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn enter_fetching(&self, total: u64) {
        if self.phase.swap(PHASE_FETCHING, Ordering::Relaxed) == PHASE_FETCHING {
            return;
        }
        *self.start_time.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.bar.disable_steady_tick();
        self.bar.set_length(total);
        self.bar.set_position(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            self.bar.set_style(style.progress_chars("#>-"));
        }
    }

    /// Time spent fetching results so far
    pub fn fetch_elapsed(&self) -> Duration {
        self.start_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressObserver for ProgressTracker {
    fn on_progress(&self, progress: &ExportProgress) {
        match progress {
            ExportProgress::CreatingJob => {
                self.enter_waiting();
                self.bar.set_message("Creating search job...");
            }
            ExportProgress::WaitingForJob { progress } => {
                self.enter_waiting();
                self.bar
                    .set_message(format!("Search running: {:.0}%", progress * 100.0));
            }
            ExportProgress::FetchingResults {
                fetched,
                total,
                batch,
                total_batches,
            } => {
                self.enter_fetching(*total);
                self.bar.set_position(*fetched);

                let elapsed = self.fetch_elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    let speed = *fetched as f64 / elapsed;
                    self.bar.set_message(format!(
                        "batch {batch}/{total_batches} ({speed:.0} results/sec)"
                    ));
                }
            }
            ExportProgress::Complete { .. } => self.finish(),
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

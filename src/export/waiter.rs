//! Job completion polling
//!
//! Polls a search job at a fixed interval until it reaches a terminal
//! dispatch state. Non-terminal states are retried; transport and HTTP
//! errors are not.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{SearchApi, SearchJob};
use crate::error::{ExportError, Result};

use super::progress::{ExportProgress, ProgressReporter};

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Reason reported when a failed job carries no ERROR message.
pub const UNKNOWN_FAILURE: &str = "Unknown error";

/// Polls a job until it is Done or Failed.
pub struct JobWaiter {
    api: Arc<dyn SearchApi>,
    interval: Duration,
    cancel_token: CancellationToken,
    reporter: ProgressReporter,
}

impl JobWaiter {
    pub fn new(api: Arc<dyn SearchApi>) -> Self {
        Self {
            api,
            interval: DEFAULT_POLL_INTERVAL,
            cancel_token: CancellationToken::new(),
            reporter: ProgressReporter::disabled(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Wait for the job to finish
    ///
    /// # Arguments
    /// * `sid` - Job to poll
    ///
    /// # Returns
    /// * `Result<SearchJob>` - The Done job, `JobFailed` if it failed, or
    ///   `Cancelled` if the token fired
    pub async fn wait(&self, sid: &str) -> Result<SearchJob> {
        let mut polls = 0u32;

        loop {
            self.check_cancelled(sid)?;

            let job = self.api.status(sid).await?;
            polls += 1;
            self.reporter.report(ExportProgress::WaitingForJob {
                progress: job.done_progress,
            });

            if job.is_done() {
                info!(
                    sid,
                    polls,
                    results = job.result_count,
                    events = job.event_count,
                    "Search job finished"
                );
                return Ok(job);
            }
            if job.is_failed() {
                let reason = job
                    .failure_reason
                    .unwrap_or_else(|| UNKNOWN_FAILURE.to_string());
                info!(sid, reason = %reason, "Search job failed");
                return Err(ExportError::JobFailed(reason));
            }

            debug!(
                sid,
                state = %job.state,
                progress = job.done_progress,
                "Search job still running"
            );

            self.check_cancelled(sid)?;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.cancel_token.cancelled() => {
                    info!(sid, "Job polling cancelled");
                    return Err(ExportError::Cancelled);
                }
            }
        }
    }

    fn check_cancelled(&self, sid: &str) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            info!(sid, "Job polling cancelled");
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }
}

//! Export coordinator for orchestrating export operations
//!
//! This module provides the main coordinator that brings together job
//! submission, completion polling, paged fetching, progress reporting and
//! format writing, and guarantees the remote job is deleted afterwards.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::SearchApi;
use crate::error::{ExportError, Result};

use super::fields::FieldSelection;
use super::options::ExportOptions;
use super::progress::{ExportProgress, ProgressObserver, ProgressReporter};
use super::streaming::{JobResultsQuery, StreamingQuery};
use super::waiter::{DEFAULT_POLL_INTERVAL, JobWaiter};
use super::writers::{ExportMetadata, FormatWriter, create_writer, open_sink};

/// Upper bound on the best-effort job deletion.
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of an export operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Search job that produced the results
    pub sid: String,
    /// Number of records written
    pub exported: u64,
    /// Fetch ceiling derived from the job's result count and the cap
    pub total_available: u64,
    /// Output file; `None` for stdout
    pub destination: Option<PathBuf>,
    /// Time taken for the whole export
    pub elapsed_ms: u64,
}

/// Coordinator for export operations
///
/// Runs one export end to end: submit, wait, fetch and encode. Whatever
/// happens after the job is created, the job is deleted before `execute`
/// returns, or in the background if the future is dropped first.
pub struct ExportCoordinator {
    /// Remote search API
    api: Arc<dyn SearchApi>,
    /// What to export and where
    options: ExportOptions,
    /// Observer wrapper for progress notifications
    reporter: ProgressReporter,
    /// Cancellation token for aborting export
    cancel_token: CancellationToken,
    /// Delay between job status polls
    poll_interval: Duration,
    /// Upper bound on job deletion
    cleanup_timeout: Duration,
}

impl ExportCoordinator {
    /// Create a new export coordinator
    ///
    /// # Arguments
    /// * `api` - Search API to talk to
    /// * `options` - Export options
    pub fn new(api: Arc<dyn SearchApi>, options: ExportOptions) -> Self {
        Self {
            api,
            options,
            reporter: ProgressReporter::disabled(),
            cancel_token: CancellationToken::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            cleanup_timeout: CLEANUP_TIMEOUT,
        }
    }

    /// Attach a progress observer
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.reporter = ProgressReporter::new(observer);
        self
    }

    /// Set cancellation token for this export operation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Override the job polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the job deletion timeout
    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    /// Execute the export operation
    ///
    /// This is the main entry point that orchestrates the entire export process:
    /// 1. Submit the search job
    /// 2. Poll until it finishes
    /// 3. Stream result pages into the output format
    /// 4. Delete the job, whatever the outcome of steps 2 and 3
    ///
    /// # Returns
    /// * `Result<ExportSummary>` - Export statistics or error
    pub async fn execute(&self) -> Result<ExportSummary> {
        self.options.validate()?;
        let start_time = Instant::now();

        if self.cancel_token.is_cancelled() {
            info!("Export cancelled before the search job was created");
            return Err(ExportError::Cancelled);
        }

        info!(query = %self.options.query, "Starting export operation");
        self.reporter.report(ExportProgress::CreatingJob);

        let range = &self.options.time_range;
        let sid = self
            .api
            .submit(
                &self.options.query,
                &range.earliest.as_param(),
                &range.latest.as_param(),
            )
            .await?;
        info!(sid = %sid, "Created search job");

        let guard = CleanupGuard::new(self.api.clone(), sid.clone());
        let outcome = self.run(&sid).await;
        guard.cleanup(self.cleanup_timeout).await;

        let (exported, total_available) = outcome?;
        let elapsed_ms = start_time.elapsed().as_millis() as u64;

        info!(
            sid = %sid,
            exported,
            total = total_available,
            elapsed_ms,
            "Export completed"
        );

        Ok(ExportSummary {
            sid,
            exported,
            total_available,
            destination: self.options.destination.clone(),
            elapsed_ms,
        })
    }

    /// Everything between job creation and cleanup.
    async fn run(&self, sid: &str) -> Result<(u64, u64)> {
        let job = JobWaiter::new(self.api.clone())
            .with_interval(self.poll_interval)
            .with_cancellation(self.cancel_token.clone())
            .with_reporter(self.reporter.clone())
            .wait(sid)
            .await?;

        let total = self.options.max_to_fetch(job.result_count);
        info!(
            sid,
            results = job.result_count,
            fetching = total,
            "Fetching search results"
        );

        let sink = open_sink(self.options.destination.as_deref()).await?;
        let range = &self.options.time_range;
        let metadata = ExportMetadata::new(
            self.options.query.clone(),
            range.earliest.as_param(),
            range.latest.as_param(),
        );
        let selection = FieldSelection::new(self.options.fields.clone());
        if !self.options.format.is_streaming() {
            debug!(format = %self.options.format, "Output format buffers all results until finalize");
        }
        let mut writer = create_writer(self.options.format, sink, selection, metadata);

        let mut query =
            JobResultsQuery::new(self.api.clone(), sid, total, self.options.page_size)
                .with_fields(self.options.fields.clone())
                .with_cancellation(self.cancel_token.clone())
                .with_reporter(self.reporter.clone());

        let exported = match encode_results(&mut query, writer.as_mut()).await {
            Ok(exported) => exported,
            Err(e) => {
                if let Err(flush_err) = writer.abort().await {
                    warn!(error = %flush_err, "Failed to flush partial output");
                }
                return Err(e);
            }
        };

        self.reporter.report(ExportProgress::Complete { exported, total });
        Ok((exported, total))
    }
}

/// Drain a batch sequence into a writer and finalize it.
///
/// # Returns
/// * `Result<u64>` - Total records written
pub async fn encode_results(
    query: &mut dyn StreamingQuery,
    writer: &mut dyn FormatWriter,
) -> Result<u64> {
    let mut batches = 0u64;

    while let Some(records) = query.next_batch().await? {
        let written = writer.write_batch(&records).await?;
        batches += 1;
        debug!("Wrote batch #{} ({} records)", batches, written);

        if batches % 10 == 0 {
            info!("Progress: {} batches written", batches);
        }
    }

    debug!("Finalizing output");
    writer.finalize().await
}

/// Deletes the job when dropped without an explicit cleanup.
struct CleanupGuard {
    api: Arc<dyn SearchApi>,
    sid: String,
    armed: bool,
}

impl CleanupGuard {
    fn new(api: Arc<dyn SearchApi>, sid: String) -> Self {
        Self {
            api,
            sid,
            armed: true,
        }
    }

    /// Delete the job, bounded by `timeout`. Failures are logged only.
    async fn cleanup(mut self, timeout: Duration) {
        self.armed = false;
        debug!(sid = %self.sid, "Deleting search job");
        if tokio::time::timeout(timeout, self.api.delete_job(&self.sid))
            .await
            .is_err()
        {
            warn!(sid = %self.sid, "Timed out deleting search job");
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(sid = %self.sid, "No runtime available to delete search job");
            return;
        };

        let api = self.api.clone();
        let sid = std::mem::take(&mut self.sid);
        debug!(sid = %sid, "Export dropped, deleting search job in background");
        handle.spawn(async move {
            if tokio::time::timeout(CLEANUP_TIMEOUT, api.delete_job(&sid))
                .await
                .is_err()
            {
                warn!(sid = %sid, "Timed out deleting search job");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ConnectionSettings, DispatchState, SearchClient, SearchJob};
    use crate::export::options::OutputFormat;
    use crate::record::EventRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// In-memory search service with a fixed result set.
    struct StubApi {
        records: Vec<EventRecord>,
        state: DispatchState,
        reported_count: u64,
        failure_reason: Option<String>,
        submits: AtomicUsize,
        deletes: AtomicUsize,
        fail_submit: bool,
        delete_delay: Option<Duration>,
    }

    impl StubApi {
        fn done_with(n: usize) -> Self {
            let records = (0..n)
                .map(|i| {
                    let mut r = EventRecord::new();
                    r.insert("id", Some(i.to_string()));
                    r.insert("msg", Some(format!("event {i}")));
                    r
                })
                .collect();
            Self {
                records,
                state: DispatchState::Done,
                reported_count: n as u64,
                failure_reason: None,
                submits: AtomicUsize::new(0),
                deletes: AtomicUsize::new(0),
                fail_submit: false,
                delete_delay: None,
            }
        }

        fn in_state(state: DispatchState, reason: Option<&str>) -> Self {
            Self {
                state,
                failure_reason: reason.map(String::from),
                ..Self::done_with(0)
            }
        }

        fn deletes(&self) -> usize {
            self.deletes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchApi for StubApi {
        async fn submit(&self, _query: &str, _earliest: &str, _latest: &str) -> Result<String> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            if self.fail_submit {
                return Err(ExportError::Authentication("bad token".into()));
            }
            Ok("stub-sid".into())
        }

        async fn status(&self, sid: &str) -> Result<SearchJob> {
            Ok(SearchJob {
                sid: sid.to_string(),
                state: self.state,
                event_count: self.reported_count,
                result_count: self.reported_count,
                done_progress: if self.state == DispatchState::Done { 1.0 } else { 0.3 },
                failure_reason: self.failure_reason.clone(),
            })
        }

        async fn fetch_page(
            &self,
            _sid: &str,
            offset: u64,
            count: u64,
            _fields: Option<&[String]>,
        ) -> Result<Vec<EventRecord>> {
            let start = (offset as usize).min(self.records.len());
            let end = (start + count as usize).min(self.records.len());
            Ok(self.records[start..end].to_vec())
        }

        async fn delete_job(&self, _sid: &str) {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delete_delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    struct Recording(Mutex<Vec<ExportProgress>>);

    impl ProgressObserver for Recording {
        fn on_progress(&self, progress: &ExportProgress) {
            self.0.lock().unwrap().push(progress.clone());
        }
    }

    /// Cancels the token once the first batch has been fetched.
    struct CancelAfterFirstBatch(CancellationToken);

    impl ProgressObserver for CancelAfterFirstBatch {
        fn on_progress(&self, progress: &ExportProgress) {
            if matches!(progress, ExportProgress::FetchingResults { .. }) {
                self.0.cancel();
            }
        }
    }

    fn options(dir: &TempDir, file: &str, format: OutputFormat) -> ExportOptions {
        let mut options = ExportOptions::new(
            ConnectionSettings::new("https://localhost:8089", "token"),
            "index=main",
        );
        options.page_size = 2;
        options.format = format;
        options.destination = Some(dir.path().join(file));
        options
    }

    #[tokio::test]
    async fn test_coordinator_exports_all_results() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(StubApi::done_with(5));
        let recording = Arc::new(Recording(Mutex::new(Vec::new())));

        let coordinator =
            ExportCoordinator::new(api.clone(), options(&dir, "out.csv", OutputFormat::Csv))
                .with_observer(recording.clone())
                .with_poll_interval(Duration::from_millis(1));
        let summary = coordinator.execute().await.unwrap();

        assert_eq!(summary.sid, "stub-sid");
        assert_eq!(summary.exported, 5);
        assert_eq!(summary.total_available, 5);
        assert_eq!(api.deletes(), 1);

        let content = std::fs::read_to_string(dir.path().join("out.csv")).unwrap();
        assert_eq!(content.lines().count(), 6);
        assert!(content.starts_with("id,msg\n0,event 0\n"));

        let events = recording.0.lock().unwrap();
        assert_eq!(events.first(), Some(&ExportProgress::CreatingJob));
        assert!(matches!(events[1], ExportProgress::WaitingForJob { .. }));
        assert_eq!(
            events.last(),
            Some(&ExportProgress::Complete {
                exported: 5,
                total: 5
            })
        );
        let batches = events
            .iter()
            .filter(|e| matches!(e, ExportProgress::FetchingResults { .. }))
            .count();
        assert_eq!(batches, 3);
    }

    #[tokio::test]
    async fn test_coordinator_respects_max_results() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(StubApi::done_with(10));
        let mut opts = options(&dir, "out.jsonl", OutputFormat::Jsonl);
        opts.max_results = 3;

        let summary = ExportCoordinator::new(api.clone(), opts)
            .execute()
            .await
            .unwrap();

        assert_eq!(summary.exported, 3);
        assert_eq!(summary.total_available, 3);
        let content = std::fs::read_to_string(dir.path().join("out.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_coordinator_tolerates_stale_result_count() {
        let dir = TempDir::new().unwrap();
        let mut stub = StubApi::done_with(3);
        stub.reported_count = 7;
        let api = Arc::new(stub);

        let summary =
            ExportCoordinator::new(api.clone(), options(&dir, "out.json", OutputFormat::Json))
                .execute()
                .await
                .unwrap();

        assert_eq!(summary.exported, 3);
        assert_eq!(summary.total_available, 7);

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("out.json")).unwrap())
                .unwrap();
        assert_eq!(doc["meta"]["totalCount"], 3);
        assert_eq!(doc["meta"]["query"], "index=main");
        assert_eq!(doc["meta"]["earliestTime"], "-24h");
    }

    #[tokio::test]
    async fn test_coordinator_empty_job() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(StubApi::done_with(0));

        let summary =
            ExportCoordinator::new(api.clone(), options(&dir, "out.json", OutputFormat::Json))
                .execute()
                .await
                .unwrap();

        assert_eq!(summary.exported, 0);
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("out.json")).unwrap())
                .unwrap();
        assert_eq!(doc["results"], serde_json::json!([]));
        assert_eq!(api.deletes(), 1);
    }

    #[tokio::test]
    async fn test_coordinator_failed_job_is_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(StubApi::in_state(DispatchState::Failed, Some("boom")));

        let err = ExportCoordinator::new(api.clone(), options(&dir, "out.csv", OutputFormat::Csv))
            .execute()
            .await
            .unwrap_err();

        match err {
            ExportError::JobFailed(reason) => assert_eq!(reason, "boom"),
            other => panic!("Expected JobFailed, got: {other:?}"),
        }
        assert_eq!(api.deletes(), 1);
        assert!(!dir.path().join("out.csv").exists());
    }

    #[tokio::test]
    async fn test_coordinator_submit_failure_skips_cleanup() {
        let dir = TempDir::new().unwrap();
        let mut stub = StubApi::done_with(1);
        stub.fail_submit = true;
        let api = Arc::new(stub);

        let err = ExportCoordinator::new(api.clone(), options(&dir, "out.csv", OutputFormat::Csv))
            .execute()
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Authentication(_)));
        assert_eq!(api.deletes(), 0);
    }

    #[tokio::test]
    async fn test_coordinator_invalid_options_fail_before_submit() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(StubApi::done_with(1));
        let mut opts = options(&dir, "out.csv", OutputFormat::Csv);
        opts.page_size = 0;

        let err = ExportCoordinator::new(api.clone(), opts)
            .execute()
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Configuration(_)));
        assert_eq!(api.submits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_coordinator_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(StubApi::done_with(1));
        let token = CancellationToken::new();
        token.cancel();

        let err = ExportCoordinator::new(api.clone(), options(&dir, "out.csv", OutputFormat::Csv))
            .with_cancellation(token)
            .execute()
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(api.submits.load(Ordering::SeqCst), 0);
        assert_eq!(api.deletes(), 0);
    }

    #[tokio::test]
    async fn test_coordinator_cancelled_mid_fetch_keeps_partial_output() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(StubApi::done_with(6));
        let token = CancellationToken::new();

        let err = ExportCoordinator::new(api.clone(), options(&dir, "out.csv", OutputFormat::Csv))
            .with_cancellation(token.clone())
            .with_observer(Arc::new(CancelAfterFirstBatch(token)))
            .execute()
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.exit_code(), 130);
        assert_eq!(api.deletes(), 1);

        let content = std::fs::read_to_string(dir.path().join("out.csv")).unwrap();
        assert_eq!(content, "id,msg\n0,event 0\n1,event 1\n");
    }

    #[tokio::test]
    async fn test_coordinator_dropped_future_deletes_job() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(StubApi::in_state(DispatchState::Running, None));

        let coordinator =
            ExportCoordinator::new(api.clone(), options(&dir, "out.csv", OutputFormat::Csv))
                .with_poll_interval(Duration::from_millis(5));
        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), coordinator.execute()).await;
        assert!(timed_out.is_err());

        for _ in 0..100 {
            if api.deletes() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(api.deletes(), 1);
    }

    #[tokio::test]
    async fn test_coordinator_bounds_slow_cleanup() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(StubApi {
            delete_delay: Some(Duration::from_secs(30)),
            ..StubApi::done_with(2)
        });

        let started = std::time::Instant::now();
        let coordinator =
            ExportCoordinator::new(api.clone(), options(&dir, "out.csv", OutputFormat::Csv));
        let summary = coordinator
            .with_poll_interval(Duration::from_millis(1))
            .with_cleanup_timeout(Duration::from_millis(20))
            .execute()
            .await
            .unwrap();

        assert_eq!(summary.exported, 2);
        assert_eq!(api.deletes(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_export_against_http_service() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/search/jobs"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "sid": "e2e-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/services/search/jobs/e2e-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entry": [{ "content": {
                    "dispatchState": "DONE",
                    "doneProgress": 1.0,
                    "eventCount": 3,
                    "resultCount": "3"
                }}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/services/search/jobs/e2e-1/results"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    { "host": "a", "tags": ["x", "y"] },
                    { "host": "b", "count": 2 }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/services/search/jobs/e2e-1/results"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [ { "host": "c" } ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/services/search/jobs/e2e-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut opts = ExportOptions::new(ConnectionSettings::new(server.uri(), "t0k"), "index=web");
        opts.page_size = 2;
        opts.format = OutputFormat::Jsonl;
        opts.destination = Some(dir.path().join("nested").join("out.jsonl"));

        let client = Arc::new(SearchClient::new(&opts.connection).unwrap());
        let summary = ExportCoordinator::new(client, opts)
            .with_poll_interval(Duration::from_millis(1))
            .execute()
            .await
            .unwrap();

        assert_eq!(summary.exported, 3);
        let content =
            std::fs::read_to_string(dir.path().join("nested").join("out.jsonl")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"host":"a","tags":"x, y"}"#,
                r#"{"host":"b","count":"2"}"#,
                r#"{"host":"c"}"#,
            ]
        );
    }
}

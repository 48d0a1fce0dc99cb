//! Streaming query abstractions for export operations
//!
//! This module provides a pull-based interface for streaming result pages
//! from a finished search job without loading all results into memory.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::SearchApi;
use crate::error::{ExportError, Result};
use crate::record::EventRecord;

use super::options::batch_count;
use super::progress::{ExportProgress, ProgressReporter};

/// Trait for streaming query results in batches
///
/// Sequences are lazy, finite and non-restartable: once `next_batch` has
/// returned `None` it keeps returning `None`.
#[async_trait]
pub trait StreamingQuery: Send {
    /// Fetch the next batch of records
    ///
    /// # Returns
    /// * `Result<Option<Vec<EventRecord>>>` - Next batch, or None if exhausted
    async fn next_batch(&mut self) -> Result<Option<Vec<EventRecord>>>;
}

/// Pages through the results of a finished job.
///
/// Requests `min(page_size, cap - fetched)` records at a time. An empty page
/// ends the sequence early, which happens when the job reported more results
/// than it can serve.
pub struct JobResultsQuery {
    api: Arc<dyn SearchApi>,
    sid: String,
    page_size: u64,
    cap: u64,
    fields: Option<Vec<String>>,
    offset: u64,
    fetched: u64,
    batch: u64,
    total_batches: u64,
    exhausted: bool,
    cancel_token: CancellationToken,
    reporter: ProgressReporter,
}

impl JobResultsQuery {
    /// Create a new results query
    ///
    /// # Arguments
    /// * `api` - Search API to fetch pages from
    /// * `sid` - Finished job to read
    /// * `cap` - Maximum number of records to fetch
    /// * `page_size` - Records per request
    pub fn new(api: Arc<dyn SearchApi>, sid: impl Into<String>, cap: u64, page_size: u64) -> Self {
        Self {
            api,
            sid: sid.into(),
            page_size,
            cap,
            fields: None,
            offset: 0,
            fetched: 0,
            batch: 0,
            total_batches: batch_count(cap, page_size),
            exhausted: false,
            cancel_token: CancellationToken::new(),
            reporter: ProgressReporter::disabled(),
        }
    }

    /// Restrict fetched fields
    pub fn with_fields(mut self, fields: Option<Vec<String>>) -> Self {
        self.fields = fields;
        self
    }

    /// Set cancellation token checked before each page request
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Report a `FetchingResults` notification per batch
    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Records fetched so far
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Batches expected for the cap, computed once
    pub fn total_batches(&self) -> u64 {
        self.total_batches
    }
}

#[async_trait]
impl StreamingQuery for JobResultsQuery {
    async fn next_batch(&mut self) -> Result<Option<Vec<EventRecord>>> {
        if self.exhausted || self.fetched >= self.cap || self.page_size == 0 {
            self.exhausted = true;
            return Ok(None);
        }

        if self.cancel_token.is_cancelled() {
            info!(sid = %self.sid, fetched = self.fetched, "Result fetching cancelled");
            return Err(ExportError::Cancelled);
        }

        let count = self.page_size.min(self.cap - self.fetched);
        debug!(sid = %self.sid, offset = self.offset, count, "Fetching batch #{}", self.batch + 1);

        let mut page = self
            .api
            .fetch_page(&self.sid, self.offset, count, self.fields.as_deref())
            .await?;

        if page.is_empty() {
            debug!(
                sid = %self.sid,
                fetched = self.fetched,
                expected = self.cap,
                "Empty page, result set ended early"
            );
            self.exhausted = true;
            return Ok(None);
        }

        // Servers may ignore `count`; never yield past the cap
        let remaining = usize::try_from(self.cap - self.fetched).unwrap_or(usize::MAX);
        if page.len() > remaining {
            debug!(sid = %self.sid, returned = page.len(), remaining, "Page exceeds cap, truncating");
            page.truncate(remaining);
        }

        let len = page.len() as u64;
        self.offset += len;
        self.fetched += len;
        self.batch += 1;

        self.reporter.report(ExportProgress::FetchingResults {
            fetched: self.fetched,
            total: self.cap,
            batch: self.batch,
            total_batches: self.total_batches,
        });

        Ok(Some(page))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::SearchJob;
    use crate::export::progress::ProgressObserver;
    use std::sync::Mutex;

    /// Serves pages out of a fixed in-memory result set.
    pub(crate) struct PagedApi {
        pub records: Vec<EventRecord>,
        pub requests: Mutex<Vec<(u64, u64)>>,
    }

    impl PagedApi {
        pub fn with_records(n: usize) -> Self {
            let records = (0..n)
                .map(|i| {
                    let mut r = EventRecord::new();
                    r.insert("id", Some(i.to_string()));
                    r
                })
                .collect();
            Self {
                records,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchApi for PagedApi {
        async fn submit(&self, _query: &str, _earliest: &str, _latest: &str) -> Result<String> {
            unreachable!("not used by the fetcher")
        }

        async fn status(&self, _sid: &str) -> Result<SearchJob> {
            unreachable!("not used by the fetcher")
        }

        async fn fetch_page(
            &self,
            _sid: &str,
            offset: u64,
            count: u64,
            _fields: Option<&[String]>,
        ) -> Result<Vec<EventRecord>> {
            self.requests.lock().unwrap().push((offset, count));
            let start = (offset as usize).min(self.records.len());
            let end = (start + count as usize).min(self.records.len());
            Ok(self.records[start..end].to_vec())
        }

        async fn delete_job(&self, _sid: &str) {}
    }

    /// Returns every remaining record regardless of the requested count.
    struct OversizedPageApi(PagedApi);

    #[async_trait]
    impl SearchApi for OversizedPageApi {
        async fn submit(&self, query: &str, earliest: &str, latest: &str) -> Result<String> {
            self.0.submit(query, earliest, latest).await
        }

        async fn status(&self, sid: &str) -> Result<SearchJob> {
            self.0.status(sid).await
        }

        async fn fetch_page(
            &self,
            sid: &str,
            offset: u64,
            _count: u64,
            fields: Option<&[String]>,
        ) -> Result<Vec<EventRecord>> {
            self.0.fetch_page(sid, offset, u64::MAX / 2, fields).await
        }

        async fn delete_job(&self, _sid: &str) {}
    }

    struct Recording(Mutex<Vec<ExportProgress>>);

    impl ProgressObserver for Recording {
        fn on_progress(&self, progress: &ExportProgress) {
            self.0.lock().unwrap().push(progress.clone());
        }
    }

    async fn drain(query: &mut JobResultsQuery) -> Vec<usize> {
        let mut sizes = Vec::new();
        while let Some(batch) = query.next_batch().await.unwrap() {
            sizes.push(batch.len());
        }
        sizes
    }

    #[tokio::test]
    async fn test_pages_until_cap() {
        let api = Arc::new(PagedApi::with_records(5));
        let recording = Arc::new(Recording(Mutex::new(Vec::new())));
        let mut query = JobResultsQuery::new(api.clone(), "sid", 5, 2)
            .with_reporter(ProgressReporter::new(recording.clone()));

        assert_eq!(drain(&mut query).await, vec![2, 2, 1]);
        assert_eq!(
            *api.requests.lock().unwrap(),
            vec![(0, 2), (2, 2), (4, 1)]
        );

        let fetched: Vec<u64> = recording
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|p| match p {
                ExportProgress::FetchingResults {
                    fetched,
                    total,
                    total_batches,
                    ..
                } => {
                    assert_eq!(*total, 5);
                    assert_eq!(*total_batches, 3);
                    *fetched
                }
                other => panic!("unexpected progress: {other:?}"),
            })
            .collect();
        assert_eq!(fetched, vec![2, 4, 5]);
    }

    #[tokio::test]
    async fn test_cap_below_available() {
        let api = Arc::new(PagedApi::with_records(100));
        let mut query = JobResultsQuery::new(api, "sid", 7, 3);
        assert_eq!(drain(&mut query).await, vec![3, 3, 1]);
        assert_eq!(query.fetched(), 7);
    }

    #[tokio::test]
    async fn test_empty_page_ends_early() {
        // Job claims 10 results but only 3 exist
        let api = Arc::new(PagedApi::with_records(3));
        let mut query = JobResultsQuery::new(api.clone(), "sid", 10, 2);

        assert_eq!(drain(&mut query).await, vec![2, 1]);
        assert_eq!(query.fetched(), 3);
        // Stays exhausted without further requests
        assert!(query.next_batch().await.unwrap().is_none());
        assert_eq!(api.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_cap_fetches_nothing() {
        let api = Arc::new(PagedApi::with_records(3));
        let mut query = JobResultsQuery::new(api.clone(), "sid", 0, 2);
        assert!(query.next_batch().await.unwrap().is_none());
        assert!(api.requests.lock().unwrap().is_empty());
        assert_eq!(query.total_batches(), 0);
    }

    #[tokio::test]
    async fn test_sum_of_batches_matches_cap() {
        for (available, cap, page) in [(10, 10, 3), (10, 4, 4), (10, 10, 10), (10, 9, 1)] {
            let api = Arc::new(PagedApi::with_records(available));
            let mut query = JobResultsQuery::new(api, "sid", cap, page);
            let total: usize = drain(&mut query).await.iter().sum();
            assert_eq!(total as u64, cap, "available={available} cap={cap} page={page}");
        }
    }

    #[tokio::test]
    async fn test_cancellation_checked_before_request() {
        let api = Arc::new(PagedApi::with_records(5));
        let token = CancellationToken::new();
        let mut query =
            JobResultsQuery::new(api.clone(), "sid", 5, 2).with_cancellation(token.clone());

        assert_eq!(query.next_batch().await.unwrap().map(|b| b.len()), Some(2));
        token.cancel();

        let err = query.next_batch().await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(api.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_page_truncated_to_cap() {
        let api = Arc::new(OversizedPageApi(PagedApi::with_records(10)));
        let mut query = JobResultsQuery::new(api, "sid", 3, 2);

        assert_eq!(drain(&mut query).await, vec![3]);
        assert_eq!(query.fetched(), 3);
    }
}

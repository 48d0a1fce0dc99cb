//! Buffered JSON writer for export operations
//!
//! Collects every record in memory and writes a single pretty-printed
//! document on finalize:
//!
//! ```json
//! {
//!   "meta": {
//!     "query": "...",
//!     "earliestTime": "-24h",
//!     "latestTime": "now",
//!     "totalCount": 2,
//!     "exportedAt": "2024-01-01T00:00:00Z"
//!   },
//!   "results": [ ... ]
//! }
//! ```
//!
//! Nothing reaches the sink before finalize, so a cancelled JSON export
//! leaves an empty file behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::error::Result;
use crate::export::fields::{FieldSelection, SelectedRecord};
use crate::record::EventRecord;

use super::{FormatWriter, SinkWriter};

/// Timestamp layout for `exportedAt`.
pub const EXPORTED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Descriptive fields placed in the document's `meta` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportMetadata {
    pub query: String,
    pub earliest_time: String,
    pub latest_time: String,
    pub exported_at: DateTime<Utc>,
}

impl ExportMetadata {
    /// Metadata stamped with the current time
    pub fn new(
        query: impl Into<String>,
        earliest_time: impl Into<String>,
        latest_time: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            earliest_time: earliest_time.into(),
            latest_time: latest_time.into(),
            exported_at: Utc::now(),
        }
    }

    pub fn with_exported_at(mut self, exported_at: DateTime<Utc>) -> Self {
        self.exported_at = exported_at;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetaSection<'a> {
    query: &'a str,
    earliest_time: &'a str,
    latest_time: &'a str,
    total_count: u64,
    exported_at: String,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    meta: MetaSection<'a>,
    results: Vec<SelectedRecord<'a>>,
}

/// Writer for the wrapped JSON format
pub struct JsonWriter<W> {
    sink: SinkWriter<W>,
    selection: FieldSelection,
    metadata: ExportMetadata,
    /// Every record seen so far
    records: Vec<EventRecord>,
    finalized: bool,
}

impl<W: AsyncWrite + Unpin + Send> JsonWriter<W> {
    /// Create a new JSON writer
    ///
    /// # Arguments
    /// * `sink` - Output sink
    /// * `selection` - Field allow-list
    /// * `metadata` - Values for the `meta` object
    pub fn new(sink: SinkWriter<W>, selection: FieldSelection, metadata: ExportMetadata) -> Self {
        debug!("Created JSON writer for: {}", sink.label().display());
        Self {
            sink,
            selection,
            metadata,
            records: Vec::new(),
            finalized: false,
        }
    }

    /// Unwrap the underlying writer after `finalize`
    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }

    fn render(&self) -> Result<Vec<u8>> {
        let document = ExportDocument {
            meta: MetaSection {
                query: &self.metadata.query,
                earliest_time: &self.metadata.earliest_time,
                latest_time: &self.metadata.latest_time,
                total_count: self.records.len() as u64,
                exported_at: self
                    .metadata
                    .exported_at
                    .format(EXPORTED_AT_FORMAT)
                    .to_string(),
            },
            results: self
                .records
                .iter()
                .map(|r| self.selection.project(r))
                .collect(),
        };

        let mut bytes = serde_json::to_vec_pretty(&document)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FormatWriter for JsonWriter<W> {
    async fn write_batch(&mut self, records: &[EventRecord]) -> Result<usize> {
        self.records.extend_from_slice(records);
        debug!(
            "Buffered {} records for JSON (total: {})",
            records.len(),
            self.records.len()
        );
        Ok(records.len())
    }

    async fn finalize(&mut self) -> Result<u64> {
        let total = self.records.len() as u64;
        if self.finalized {
            return Ok(total);
        }

        let bytes = self.render()?;
        self.sink.write_all(&bytes).await?;
        self.sink.flush().await?;
        self.finalized = true;

        debug!(
            "Finalized JSON output: {} ({} records)",
            self.sink.label().display(),
            total
        );
        Ok(total)
    }

    async fn abort(&mut self) -> Result<()> {
        self.sink.flush().await
    }
}

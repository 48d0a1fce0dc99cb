//! CSV writer for export operations
//!
//! This module exports records as comma-separated values with a single
//! header row. The header comes from the explicit field list, or from the
//! keys of the first non-empty batch; fields that only appear later are
//! dropped from every row.

use std::borrow::Cow;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::error::Result;
use crate::export::fields::{FieldSelection, derive_header};
use crate::record::EventRecord;

use super::{FormatWriter, SinkWriter};

/// Writer for CSV format
pub struct CsvWriter<W> {
    /// Buffered output
    sink: SinkWriter<W>,
    /// Explicit field list, if any
    selection: FieldSelection,
    /// Column headers once known
    headers: Vec<String>,
    /// Whether the header row has been written
    headers_written: bool,
    /// Number of records written
    written: u64,
}

impl<W: AsyncWrite + Unpin + Send> CsvWriter<W> {
    /// Create a new CSV writer
    ///
    /// # Arguments
    /// * `sink` - Output sink
    /// * `selection` - Field allow-list
    pub fn new(sink: SinkWriter<W>, selection: FieldSelection) -> Self {
        debug!("Created CSV writer for: {}", sink.label().display());
        Self {
            sink,
            selection,
            headers: Vec::new(),
            headers_written: false,
            written: 0,
        }
    }

    /// Header row written (or to be written)
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Unwrap the underlying writer after `finalize`
    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }

    async fn write_headers(&mut self) -> Result<()> {
        let mut line = self
            .headers
            .iter()
            .map(|h| escape_csv_value(h))
            .collect::<Vec<_>>()
            .join(",");
        line.push('\n');
        self.sink.write_all(line.as_bytes()).await?;
        self.headers_written = true;
        debug!("Wrote CSV headers: {} fields", self.headers.len());
        Ok(())
    }

    fn format_row(&self, record: &EventRecord, out: &mut String) {
        for (i, field) in self.headers.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&escape_csv_value(record.value(field).unwrap_or("")));
        }
        out.push('\n');
    }
}

/// Escape a CSV value if necessary
///
/// Values containing a comma, double quote, carriage return or line feed are
/// wrapped in double quotes with inner quotes doubled. Everything else,
/// including the empty string, is written unchanged.
pub fn escape_csv_value(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FormatWriter for CsvWriter<W> {
    async fn write_batch(&mut self, records: &[EventRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        if !self.headers_written {
            self.headers = match self.selection.explicit() {
                Some(fields) => fields.to_vec(),
                None => derive_header(records),
            };
            self.write_headers().await?;
        }

        let mut rows = String::new();
        for record in records {
            self.format_row(record, &mut rows);
        }
        self.sink.write_all(rows.as_bytes()).await?;

        self.written += records.len() as u64;
        debug!("Wrote {} records to CSV (total: {})", records.len(), self.written);

        Ok(records.len())
    }

    async fn finalize(&mut self) -> Result<u64> {
        if !self.headers_written {
            if let Some(fields) = self.selection.explicit() {
                self.headers = fields.to_vec();
                self.write_headers().await?;
            }
        }

        self.sink.flush().await?;
        debug!(
            "Finalized CSV output: {} ({} records)",
            self.sink.label().display(),
            self.written
        );
        Ok(self.written)
    }

    async fn abort(&mut self) -> Result<()> {
        self.sink.flush().await
    }
}

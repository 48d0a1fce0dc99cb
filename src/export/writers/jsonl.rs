//! JSON Lines writer for export operations
//!
//! Writes one self-contained JSON object per line with no wrapper, so it is
//! suitable for exports of any size.

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::error::Result;
use crate::export::fields::FieldSelection;
use crate::record::EventRecord;

use super::{FormatWriter, SinkWriter};

/// Writer for JSON Lines format
pub struct JsonLWriter<W> {
    /// Buffered output
    sink: SinkWriter<W>,
    /// Field allow-list
    selection: FieldSelection,
    /// Reused encoding buffer for one record
    line: Vec<u8>,
    /// Number of records written
    written: u64,
}

impl<W: AsyncWrite + Unpin + Send> JsonLWriter<W> {
    /// Create a new JSON Lines writer
    pub fn new(sink: SinkWriter<W>, selection: FieldSelection) -> Self {
        debug!("Created JSON Lines writer for: {}", sink.label().display());
        Self {
            sink,
            selection,
            line: Vec::new(),
            written: 0,
        }
    }

    /// Unwrap the underlying writer after `finalize`
    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FormatWriter for JsonLWriter<W> {
    async fn write_batch(&mut self, records: &[EventRecord]) -> Result<usize> {
        for record in records {
            self.line.clear();
            serde_json::to_writer(&mut self.line, &self.selection.project(record))?;
            self.line.push(b'\n');
            self.sink.write_all(&self.line).await?;
        }

        self.written += records.len() as u64;
        debug!(
            "Wrote {} records to JSON Lines (total: {})",
            records.len(),
            self.written
        );

        Ok(records.len())
    }

    async fn finalize(&mut self) -> Result<u64> {
        self.sink.flush().await?;
        debug!(
            "Finalized JSON Lines output: {} ({} records)",
            self.sink.label().display(),
            self.written
        );
        Ok(self.written)
    }

    async fn abort(&mut self) -> Result<()> {
        self.sink.flush().await
    }
}

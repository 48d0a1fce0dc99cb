//! Format writers for export operations
//!
//! This module provides a unified interface for encoding event records into
//! the supported output formats (CSV, JSON, JSON Lines) and the sinks they
//! write to (a file or standard output).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::{ExportError, Result};
use crate::record::EventRecord;

use super::fields::FieldSelection;
use super::options::OutputFormat;

pub mod csv;
pub mod json;
pub mod jsonl;

pub use csv::CsvWriter;
pub use json::{ExportMetadata, JsonWriter};
pub use jsonl::JsonLWriter;

/// Label used in errors and logs when writing to standard output.
pub const STDOUT_LABEL: &str = "<stdout>";

const WRITE_BUFFER_CAPACITY: usize = 8 * 1024 * 1024;

/// Type-erased output sink.
pub type BoxedSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Trait for writing records to different output formats
#[async_trait]
pub trait FormatWriter: Send {
    /// Write a batch of records
    ///
    /// # Arguments
    /// * `records` - Records to encode
    ///
    /// # Returns
    /// * `Result<usize>` - Number of records accepted
    async fn write_batch(&mut self, records: &[EventRecord]) -> Result<usize>;

    /// Finalize the output (headers, wrappers, flush)
    ///
    /// # Returns
    /// * `Result<u64>` - Total number of records written
    async fn finalize(&mut self) -> Result<u64>;

    /// Flush whatever was already written, without trailers.
    ///
    /// Used when the export stops early; partial output is left as-is.
    async fn abort(&mut self) -> Result<()>;
}

/// Buffered writer that tags I/O errors with the sink's label.
pub struct SinkWriter<W> {
    inner: BufWriter<W>,
    label: PathBuf,
}

impl<W: AsyncWrite + Unpin + Send> SinkWriter<W> {
    pub fn new(writer: W, label: impl Into<PathBuf>) -> Self {
        Self {
            inner: BufWriter::with_capacity(WRITE_BUFFER_CAPACITY, writer),
            label: label.into(),
        }
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner
            .write_all(bytes)
            .await
            .map_err(|e| ExportError::io(&self.label, e))
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .await
            .map_err(|e| ExportError::io(&self.label, e))
    }

    /// Path or `<stdout>`
    pub fn label(&self) -> &Path {
        &self.label
    }

    /// Unwrap the underlying writer. Call after `flush`.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

/// Open the destination for writing.
///
/// `None` writes to standard output. A path is created along with any missing
/// parent directories; an existing file is overwritten.
pub async fn open_sink(destination: Option<&Path>) -> Result<SinkWriter<BoxedSink>> {
    let Some(path) = destination else {
        debug!("Writing export to stdout");
        let stdout: BoxedSink = Box::new(tokio::io::stdout());
        return Ok(SinkWriter::new(stdout, STDOUT_LABEL));
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ExportError::io(parent, e))?;
    }

    let file = File::create(path)
        .await
        .map_err(|e| ExportError::io(path, e))?;
    debug!("Created output file: {}", path.display());

    let file: BoxedSink = Box::new(file);
    Ok(SinkWriter::new(file, path))
}

/// Build the writer for a format.
///
/// # Arguments
/// * `format` - Output format
/// * `sink` - Where encoded bytes go
/// * `selection` - Field allow-list shared by all formats
/// * `metadata` - Wrapper metadata, used by the buffered JSON format only
pub fn create_writer(
    format: OutputFormat,
    sink: SinkWriter<BoxedSink>,
    selection: FieldSelection,
    metadata: ExportMetadata,
) -> Box<dyn FormatWriter> {
    match format {
        OutputFormat::Csv => Box::new(CsvWriter::new(sink, selection)),
        OutputFormat::Json => Box::new(JsonWriter::new(sink, selection, metadata)),
        OutputFormat::Jsonl => Box::new(JsonLWriter::new(sink, selection)),
    }
}

//! Export module for streaming search results to local files
//!
//! This module provides the export pipeline:
//! - Submitting a search job and waiting for it to finish
//! - Paging through its results without holding them all in memory
//! - Progress notifications with an optional progress bar
//! - Multiple output formats (CSV, JSON, JSON Lines)
//!
//! # Architecture
//!
//! The pipeline is built from four components:
//!
//! 1. **JobWaiter**: Polls the job until it reaches a terminal state
//! 2. **StreamingQuery**: Pulls result pages from a finished job
//! 3. **FormatWriter**: Encodes records into the chosen output format
//! 4. **ProgressObserver**: Receives phase notifications (`ProgressTracker` draws a bar)
//!
//! These components are orchestrated by the **ExportCoordinator**, which also
//! guarantees the job is deleted from the service when the export ends.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use splunk_export::client::{ConnectionSettings, SearchClient};
//! use splunk_export::export::{ExportCoordinator, ExportOptions, OutputFormat};
//!
//! # async fn run() -> splunk_export::Result<()> {
//! let connection = ConnectionSettings::new("https://localhost:8089", "my-token");
//! let client = Arc::new(SearchClient::new(&connection)?);
//!
//! let mut options = ExportOptions::new(connection, "index=main error");
//! options.format = OutputFormat::Jsonl;
//! options.destination = Some("errors.jsonl".into());
//!
//! let summary = ExportCoordinator::new(client, options).execute().await?;
//! println!("exported {} records", summary.exported);
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod fields;
pub mod options;
pub mod progress;
pub mod streaming;
pub mod waiter;
pub mod writers;

pub use coordinator::{ExportCoordinator, ExportSummary, encode_results};
pub use fields::{FieldSelection, derive_header};
pub use options::{ExportOptions, OutputFormat, TimeBound, TimeRange};
pub use progress::{ExportProgress, ProgressObserver, ProgressReporter, ProgressTracker};
pub use streaming::{JobResultsQuery, StreamingQuery};
pub use waiter::JobWaiter;
pub use writers::{CsvWriter, ExportMetadata, FormatWriter, JsonLWriter, JsonWriter};

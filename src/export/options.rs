//! Export options
//!
//! An immutable snapshot of everything one export needs, built once per
//! invocation by the CLI/config layer and validated before use.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::client::ConnectionSettings;
use crate::error::{ExportError, Result};

/// Largest page the results endpoint will serve in one request.
pub const MAX_PAGE_SIZE: u64 = 50_000;

/// Default page size for result fetching.
pub const DEFAULT_PAGE_SIZE: u64 = 10_000;

/// Output format at the process boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma-separated rows with a header line
    #[default]
    Csv,

    /// One buffered JSON document with `meta` and `results`
    Json,

    /// One JSON object per line
    Jsonl,
}

impl OutputFormat {
    /// Infer a format from an output file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "csv" => Some(OutputFormat::Csv),
            "json" => Some(OutputFormat::Json),
            "jsonl" | "ndjson" => Some(OutputFormat::Jsonl),
            _ => None,
        }
    }

    /// Whether output can be written without buffering the whole result set
    pub fn is_streaming(&self) -> bool {
        !matches!(self, OutputFormat::Json)
    }
}

impl FromStr for OutputFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "ndjson" | "json-lines" => Ok(OutputFormat::Jsonl),
            other => Err(ExportError::Configuration(format!(
                "unknown output format '{other}' (expected csv, json or jsonl)"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Jsonl => "jsonl",
        })
    }
}

/// One end of a search time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeBound {
    /// Relative time modifier passed through verbatim, e.g. `-24h`, `now`, `-7d@d`
    Relative(String),

    /// Absolute RFC 3339 timestamp
    Absolute(DateTime<FixedOffset>),
}

impl TimeBound {
    /// Parse user input; anything that is not RFC 3339 is a relative modifier.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => TimeBound::Absolute(ts),
            Err(_) => TimeBound::Relative(raw.to_string()),
        }
    }

    /// Text sent as `earliest_time` / `latest_time`
    pub fn as_param(&self) -> String {
        match self {
            TimeBound::Relative(modifier) => modifier.clone(),
            TimeBound::Absolute(ts) => ts.to_rfc3339(),
        }
    }
}

impl fmt::Display for TimeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_param())
    }
}

/// Search time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub earliest: TimeBound,
    pub latest: TimeBound,
}

impl TimeRange {
    pub fn new(earliest: &str, latest: &str) -> Self {
        Self {
            earliest: TimeBound::parse(earliest),
            latest: TimeBound::parse(latest),
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::new("-24h", "now")
    }
}

/// Everything one export needs.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Connection target
    pub connection: ConnectionSettings,
    /// Query text as entered by the user
    pub query: String,
    /// Search time bounds
    pub time_range: TimeRange,
    /// Result cap; 0 means everything the job produced
    pub max_results: u64,
    /// Records requested per page
    pub page_size: u64,
    /// Output encoding
    pub format: OutputFormat,
    /// Output file; `None` writes to stdout
    pub destination: Option<PathBuf>,
    /// Field allow-list, in output order
    pub fields: Option<Vec<String>>,
    /// Display a progress bar
    pub show_progress: bool,
}

impl ExportOptions {
    /// Create options with defaults for everything but the target and query
    pub fn new(connection: ConnectionSettings, query: impl Into<String>) -> Self {
        Self {
            connection,
            query: query.into(),
            time_range: TimeRange::default(),
            max_results: 0,
            page_size: DEFAULT_PAGE_SIZE,
            format: OutputFormat::default(),
            destination: None,
            fields: None,
            show_progress: false,
        }
    }

    /// Validate option values
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, `Configuration` otherwise
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(ExportError::Configuration("query must not be empty".into()));
        }
        validate_page_size(self.page_size)?;
        if let Some(fields) = &self.fields {
            if fields.is_empty() || fields.iter().any(|f| f.trim().is_empty()) {
                return Err(ExportError::Configuration(
                    "field list must not contain empty names".into(),
                ));
            }
        }
        Ok(())
    }

    /// Effective fetch ceiling for a job reporting `result_count` rows.
    ///
    /// The job's count is authoritative; `max_results` can only lower it.
    pub fn max_to_fetch(&self, result_count: u64) -> u64 {
        if self.max_results == 0 {
            result_count
        } else {
            self.max_results.min(result_count)
        }
    }
}

/// Check page size bounds.
pub fn validate_page_size(page_size: u64) -> Result<()> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ExportError::Configuration(format!(
            "page size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
        )));
    }
    Ok(())
}

/// Number of pages needed to fetch `total` records.
pub fn batch_count(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

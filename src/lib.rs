//! Splunk search export library
//!
//! This library runs a search on a Splunk server and streams its results into
//! CSV, JSON or JSON Lines output. It can be used on its own to build export
//! tooling; the `splunk-export` binary is a thin CLI on top of it.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `client`: HTTP client for the search jobs REST API
//! - `config`: Configuration management
//! - `error`: Error types and handling
//! - `export`: Job waiting, paged fetching, output formats and orchestration
//! - `record`: Flattened event records
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use splunk_export::client::{ConnectionSettings, SearchClient};
//! use splunk_export::export::{ExportCoordinator, ExportOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = ConnectionSettings::new("https://localhost:8089", "my-token");
//!     let client = Arc::new(SearchClient::new(&connection)?);
//!
//!     let mut options = ExportOptions::new(connection, "index=_internal | head 10");
//!     options.destination = Some("internal.csv".into());
//!
//!     let summary = ExportCoordinator::new(client, options).execute().await?;
//!     println!("Exported {} results", summary.exported);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod record;

// Re-export commonly used types
pub use client::{ConnectionSettings, SearchApi, SearchClient};
pub use config::Config;
pub use error::{ExportError, Result};
pub use export::{ExportCoordinator, ExportOptions, ExportSummary, OutputFormat};
pub use record::EventRecord;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}

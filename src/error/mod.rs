//! Error handling for export operations.
//!
//! This module provides the error taxonomy used across the crate:
//! - HTTP status failures from the search API mapped to typed variants
//! - Job failures and cooperative cancellation
//! - Configuration and output sink errors
//!
//! # Example
//!
//! ```rust
//! use splunk_export::error::{ExportError, Result};
//!
//! fn check_page_size(size: u64) -> Result<u64> {
//!     if size == 0 {
//!         return Err(ExportError::Configuration("page size must be positive".into()));
//!     }
//!     Ok(size)
//! }
//!
//! assert!(check_page_size(0).is_err());
//! ```

pub mod kinds;

pub use kinds::{ConfigError, ExportError, Result};

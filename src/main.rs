//! splunk-export - Splunk search results exporter
//!
//! Runs a search against a Splunk management endpoint and streams the results
//! to a file or stdout.
//!
//! # Features
//!
//! - CSV, JSON and JSON Lines output
//! - Paged fetching that keeps memory flat for streaming formats
//! - Progress bar on stderr
//! - Ctrl+C cancels cleanly and still deletes the remote job
//!
//! # Usage
//!
//! ```bash
//! splunk-export --url https://splunk:8089 --token "$TOKEN" \
//!     -e -7d -o errors.jsonl 'index=main level=error'
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use splunk_export::cli::CliInterface;
use splunk_export::client::SearchClient;
use splunk_export::error::Result;
use splunk_export::export::{ExportCoordinator, ProgressTracker};

/// Application entry point
#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// Main application logic
///
/// This function orchestrates the application startup:
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or run the export
///
/// # Returns
/// * `Result<()>` - Success or error
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(());
    }

    run_export(&cli).await
}

/// Run one export with Ctrl+C wired to cancellation
async fn run_export(cli: &CliInterface) -> Result<()> {
    let options = cli.build_options()?;
    let client = Arc::new(SearchClient::new(&options.connection)?);
    let tracker = Arc::new(ProgressTracker::new(options.show_progress));

    let cancel_token = CancellationToken::new();
    let cancel_token_clone = cancel_token.clone();
    let ctrl_c_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                debug!("Received Ctrl+C, cancelling export");
                cancel_token_clone.cancel();
            }
            Err(err) => {
                eprintln!("Failed to listen for Ctrl+C: {}", err);
            }
        }
    });

    let coordinator = ExportCoordinator::new(client, options)
        .with_observer(tracker.clone())
        .with_cancellation(cancel_token);
    let result = coordinator.execute().await;

    ctrl_c_handle.abort();
    tracker.finish();

    let summary = result?;
    cli.print_summary(&summary);
    Ok(())
}

/// Initialize logging system based on verbosity level
///
/// Logs go to stderr so exported data on stdout stays clean. `RUST_LOG`
/// directives, when set, refine the configured level.
///
/// # Arguments
/// * `cli` - CLI interface with verbosity settings
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}

//! Command-line interface for splunk-export
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and layering
//! - Turning arguments and configuration into validated export options
//! - The `config` and `completion` subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::client::ConnectionSettings;
use crate::config::{Config, LogLevel};
use crate::error::{ExportError, Result};
use crate::export::{ExportOptions, ExportSummary, OutputFormat, TimeRange};

pub mod completion;

/// Export Splunk search results to CSV, JSON or JSON Lines
#[derive(Parser, Debug)]
#[command(
    name = "splunk-export",
    version,
    about = "Export Splunk search results to local files",
    long_about = "Runs a search on a Splunk server, waits for it to finish and streams the
results to a CSV, JSON or JSON Lines file (or stdout). The search job is always
deleted from the server afterwards.",
    args_conflicts_with_subcommands = true
)]
pub struct CliArgs {
    /// Search query, e.g. 'index=main error | head 100'
    ///
    /// A leading 'search' keyword is added unless the query starts with
    /// 'search' or a pipe.
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Management URL (e.g. https://splunk.example.com:8089)
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// API token
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Earliest time (relative like -24h or ISO-8601)
    #[arg(short = 'e', long, value_name = "TIME", allow_hyphen_values = true)]
    pub earliest: Option<String>,

    /// Latest time (relative like now or ISO-8601)
    #[arg(short = 'l', long, value_name = "TIME", allow_hyphen_values = true)]
    pub latest: Option<String>,

    /// Maximum number of results (0 exports everything)
    #[arg(short = 'm', long, value_name = "N")]
    pub max_results: Option<u64>,

    /// Results requested per page (1-50000)
    #[arg(long, value_name = "N")]
    pub page_size: Option<u64>,

    /// Output format (csv, json, jsonl)
    #[arg(short = 'f', long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Output file (stdout when omitted)
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Comma-separated list of fields to export, in order
    #[arg(long, value_name = "FIELDS")]
    pub fields: Option<String>,

    /// Do not draw a progress bar
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only, no summary)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for splunk-export
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Effective configuration (file, environment, then arguments)
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments and environment
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        let args = CliArgs::parse();
        Self::with_env(args, |key| std::env::var(key).ok())
    }

    /// Create a CLI interface with an explicit environment lookup
    ///
    /// # Arguments
    /// * `args` - Parsed arguments
    /// * `lookup` - Environment variable lookup
    pub fn with_env<F>(args: CliArgs, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        config.apply_env_from(lookup)?;
        Self::apply_args_to_config(&mut config, &args);

        Ok(Self { args, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_connection_args(config, args);
        Self::apply_export_args(config, args);
        Self::apply_logging_args(config, args);
    }

    /// Apply connection-related CLI arguments to configuration
    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        if let Some(url) = &args.url {
            config.connection.url = url.clone();
        }
        if let Some(token) = &args.token {
            config.connection.token = Some(token.clone());
        }
        if args.insecure {
            config.connection.insecure = true;
        }
        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }
    }

    /// Apply export-related CLI arguments to configuration
    fn apply_export_args(config: &mut Config, args: &CliArgs) {
        if let Some(earliest) = &args.earliest {
            config.export.earliest = earliest.clone();
        }
        if let Some(latest) = &args.latest {
            config.export.latest = latest.clone();
        }
        if let Some(max_results) = args.max_results {
            config.export.max_results = max_results;
        }
        if let Some(page_size) = args.page_size {
            config.export.page_size = page_size;
        }
        if args.no_progress || args.quiet {
            config.export.show_progress = false;
        }
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Resolve the output format
    ///
    /// Priority:
    /// 1. --format/-f
    /// 2. Output file extension
    /// 3. Configured default
    pub fn output_format(&self) -> Result<OutputFormat> {
        if let Some(format) = &self.args.format {
            return format.parse();
        }
        if let Some(format) = self.args.output.as_deref().and_then(OutputFormat::from_path) {
            return Ok(format);
        }
        Ok(self.config.export.format)
    }

    /// Build validated export options from arguments and configuration
    ///
    /// # Returns
    /// * `Result<ExportOptions>` - Options ready for the coordinator
    pub fn build_options(&self) -> Result<ExportOptions> {
        let query = self
            .args
            .query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ExportError::Configuration("a search query is required".into()))?;

        self.config.validate()?;

        let token = self
            .config
            .connection
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ExportError::Configuration(
                    "no API token; pass --token, set SPLUNK_TOKEN or add it to the config file"
                        .into(),
                )
            })?;

        let connection = ConnectionSettings {
            base_url: self.config.connection.url.clone(),
            token: token.to_string(),
            insecure: self.config.connection.insecure,
            timeout: self.config.connection_timeout(),
        };

        let export = &self.config.export;
        let mut options = ExportOptions::new(connection, query);
        options.time_range = TimeRange::new(&export.earliest, &export.latest);
        options.max_results = export.max_results;
        options.page_size = export.page_size;
        options.format = self.output_format()?;
        options.destination = self.args.output.clone();
        options.fields = parse_fields(self.args.fields.as_deref());
        options.show_progress = export.show_progress;

        options.validate()?;
        Ok(options)
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to continue
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Completion { shell }) => {
                completion::print_completion(shell)?;
                Ok(true)
            }
            Some(Commands::Config { show, validate }) => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Handle config subcommand
    ///
    /// With neither flag set the effective configuration is shown.
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file();
        }
        if show || !validate {
            self.show_config()?;
        }
        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) {
        let path = self.get_config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("❌ Configuration file does not exist");
            return;
        }

        match Config::load_from_file(Some(&path)) {
            Ok(config) => match config.validate() {
                Ok(_) => println!("✅ Configuration is valid"),
                Err(e) => println!("❌ Configuration validation failed: {}", e),
            },
            Err(e) => println!("❌ Failed to load configuration: {}", e),
        }
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        let path = self.get_config_path();
        println!("Configuration file: {}", path.display());
        println!();
        println!("=== Effective Configuration ===");
        println!();
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_config_path)
    }

    /// Print the end-of-run summary to stderr
    ///
    /// # Arguments
    /// * `summary` - Result of the export
    pub fn print_summary(&self, summary: &ExportSummary) {
        if self.args.quiet {
            return;
        }
        let destination = summary
            .destination
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".to_string());
        eprintln!(
            "Exported {} of {} results to {} in {:.1}s (job {})",
            summary.exported,
            summary.total_available,
            destination,
            summary.elapsed_ms as f64 / 1000.0,
            summary.sid
        );
    }
}

/// Split a comma-separated field list
///
/// Blank entries are dropped; an all-blank list means "all fields".
pub fn parse_fields(raw: Option<&str>) -> Option<Vec<String>> {
    let fields: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect();

    if fields.is_empty() { None } else { Some(fields) }
}

//! Shell completion generation for splunk-export
//!
//! Generates completion scripts for bash, zsh, fish, PowerShell and elvish
//! from the clap command definition.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::{self, Write};

use crate::cli::CliArgs;
use crate::error::{ExportError, Result};
use crate::export::writers::STDOUT_LABEL;

const BIN_NAME: &str = "splunk-export";

/// Print a completion script to stdout
///
/// # Arguments
/// * `shell_name` - Shell type (bash, zsh, fish, powershell, elvish)
pub fn print_completion(shell_name: &str) -> Result<()> {
    let script = completion_script(shell_name)?;
    io::stdout()
        .write_all(&script)
        .map_err(|e| ExportError::io(STDOUT_LABEL, e))
}

/// Render the completion script for a shell
///
/// # Returns
/// * `Result<Vec<u8>>` - Script bytes, or `Configuration` for unknown shells
pub fn completion_script(shell_name: &str) -> Result<Vec<u8>> {
    let shell = parse_shell(shell_name)?;
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buffer);
    Ok(buffer)
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        "powershell" | "pwsh" => Ok(Shell::PowerShell),
        "elvish" => Ok(Shell::Elvish),
        _ => Err(ExportError::Configuration(format!(
            "Unsupported shell: {}. Supported shells: bash, zsh, fish, powershell, elvish",
            shell_name
        ))),
    }
}

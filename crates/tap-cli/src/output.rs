//! Output formatting utilities

use colored::*;
use serde::Serialize;
use tap_types::{Result, TapError};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(data)
        .map_err(|e| TapError::serialization(format!("JSON serialization failed: {}", e)))?;
    println!("{}", output);
    Ok(())
}

/// Print error with formatting
pub fn print_error(error: &TapError) {
    eprintln!("{} {}", "Error:".red().bold(), error);
}

/// Print a section title
pub fn print_section(title: &str) {
    println!("{}", title.bold().underline());
}

/// Print a `label: value` line
pub fn print_field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<14} {}", format!("{}:", label).dimmed(), value);
}

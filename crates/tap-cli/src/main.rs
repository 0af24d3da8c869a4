//! tap CLI - Command line interface for image tokenizer assembly
//!
//! Lists the registered recipes, builds and inspects models, and shows the
//! static catalog.

use clap::{Parser, Subcommand};
use colored::*;
use std::process;
use tap_cli::{
    commands::*,
    config::CliConfig,
    output::{print_error, OutputFormat},
    utils::setup_logging,
};

#[derive(Parser)]
#[command(name = "tap")]
#[command(about = "Image tokenizer model assembly CLI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "tap.toml")]
    config: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "pretty")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered recipes
    List(ListCommand),

    /// Build a recipe and show its structure
    Inspect(InspectCommand),

    /// Show dataset locations and special tokens
    Catalog(CatalogCommand),
}

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet).unwrap_or_else(|e| {
        eprintln!("{} Failed to setup logging: {}", "Error:".red().bold(), e);
        process::exit(1);
    });

    let config = match CliConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} Failed to load config: {}", "Error:".red().bold(), e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::List(cmd) => list::execute(cmd, cli.format),
        Commands::Inspect(cmd) => inspect::execute(cmd, config, cli.format),
        Commands::Catalog(cmd) => catalog::execute(cmd, config, cli.format),
    };

    if let Err(e) = result {
        print_error(&e);
        process::exit(1);
    }
}

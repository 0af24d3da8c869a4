//! Catalog command - Show dataset locations and special tokens

use crate::config::CliConfig;
use crate::output::{print_field, print_json, print_section, OutputFormat};
use clap::Args;
use colored::*;
use serde::Serialize;
use tap_types::Result;

#[derive(Args)]
pub struct CatalogCommand {
    /// Show a single dataset with its resolved paths
    #[arg(long)]
    pub dataset: Option<String>,
}

#[derive(Serialize)]
struct DatasetPaths {
    name: String,
    images: String,
    annotations: String,
}

pub fn execute(cmd: CatalogCommand, config: CliConfig, format: OutputFormat) -> Result<()> {
    let catalog = &config.catalog;

    if let Some(name) = cmd.dataset {
        catalog.dataset(&name)?;
        let paths = DatasetPaths {
            images: catalog.images_path(&name)?.display().to_string(),
            annotations: catalog.annotations_path(&name)?.display().to_string(),
            name,
        };
        if format == OutputFormat::Json {
            return print_json(&paths);
        }
        print_section(&paths.name);
        print_field("images", &paths.images);
        print_field("annotations", &paths.annotations);
        return Ok(());
    }

    if format == OutputFormat::Json {
        return print_json(catalog);
    }

    print_section("Catalog");
    print_field("root", &catalog.root_path);
    print_field("ignore index", catalog.ignore_index);
    println!();

    print_section("Special tokens");
    for (key, literal) in catalog.special_tokens.iter() {
        print_field(key, literal.yellow());
    }
    println!();

    print_section("Datasets");
    if catalog.datasets.is_empty() {
        println!("  {}", "No datasets configured.".dimmed());
    }
    for (name, entry) in &catalog.datasets {
        println!("  {}", name.cyan());
        println!("    images:      {}", entry.images);
        println!("    annotations: {}", entry.annotations);
    }
    Ok(())
}

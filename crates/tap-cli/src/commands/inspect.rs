//! Inspect command - Build a recipe and report on the result

use crate::config::CliConfig;
use crate::output::{print_field, print_json, print_section, OutputFormat};
use crate::utils::{format_count, parse_key_value};
use clap::Args;
use colored::*;
use serde::Serialize;
use std::path::PathBuf;
use tap_models::{ImageTokenizer, ModelRegistry};
use tap_types::Result;
use tracing::info;

#[derive(Args)]
pub struct InspectCommand {
    /// Recipe name or alias
    pub recipe: String,

    /// Weights file (.pkl or safetensors)
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Preferred accelerator index
    #[arg(long)]
    pub device: Option<usize>,

    /// float16, bfloat16 or float32
    #[arg(long)]
    pub precision: Option<String>,

    /// HuggingFace tokenizer.json for the caption vocabulary
    #[arg(long)]
    pub tokenizer: Option<PathBuf>,

    /// Hyperparameter override, e.g. `--override image_size=512`
    #[arg(long = "override", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// List every parameter instead of the per-component summary
    #[arg(long)]
    pub params: bool,
}

#[derive(Serialize)]
struct ParamInfo {
    name: String,
    shape: Vec<usize>,
    dtype: String,
    loaded: bool,
}

pub fn execute(cmd: InspectCommand, config: CliConfig, format: OutputFormat) -> Result<()> {
    let mut options = config.build_options();
    if let Some(checkpoint) = cmd.checkpoint {
        options = options.with_checkpoint(checkpoint);
    }
    if let Some(device) = cmd.device {
        options = options.with_device_index(device);
    }
    if let Some(precision) = cmd.precision {
        options = options.with_precision(precision);
    }
    if let Some(tokenizer) = cmd.tokenizer {
        options = options.with_tokenizer_file(tokenizer);
    }
    for pair in &cmd.overrides {
        let (key, value) = parse_key_value(pair)?;
        options.overrides.set(key, value)?;
    }

    let registry = ModelRegistry::global();
    let recipe = registry.get(&cmd.recipe)?;
    info!("Inspecting {}", recipe.name());
    let model = recipe.build(options)?;

    if cmd.params {
        print_params(&model, format)
    } else {
        print_summary(recipe.name(), &model, format)
    }
}

fn print_summary(name: &str, model: &ImageTokenizer, format: OutputFormat) -> Result<()> {
    let summary = model.summary();
    if format == OutputFormat::Json {
        return print_json(&summary);
    }

    print_section(name);
    print_field("device", &summary.device);
    print_field("dtype", &summary.dtype);
    print_field("mode", summary.mode);
    print_field(
        "parameters",
        format!("{} ({})", format_count(summary.num_parameters), summary.num_parameters),
    );
    print_field("vocabulary", summary.vocab_size);
    println!();

    println!(
        "{:<20} {:>12} {:>8} {:>10} {:>11}",
        "COMPONENT".bold(),
        "PARAMETERS".bold(),
        "TENSORS".bold(),
        "SYNC NORM".bold(),
        "PLAIN NORM".bold()
    );
    for component in &summary.components {
        println!(
            "{:<20} {:>12} {:>8} {:>10} {:>11}",
            component.name.cyan(),
            format_count(component.parameters),
            component.tensors,
            component.sync_norms,
            component.plain_norms
        );
    }
    Ok(())
}

fn print_params(model: &ImageTokenizer, format: OutputFormat) -> Result<()> {
    let params: Vec<ParamInfo> = model
        .named_parameters()
        .into_iter()
        .map(|(name, param)| ParamInfo {
            name,
            shape: param.dims().to_vec(),
            dtype: param.dtype().as_str().to_string(),
            loaded: param.is_materialized(),
        })
        .collect();

    if format == OutputFormat::Json {
        return print_json(&params);
    }

    println!(
        "{:<64} {:<22} {:<6} {}",
        "NAME".bold(),
        "SHAPE".bold(),
        "DTYPE".bold(),
        "LOADED".bold()
    );
    for param in params {
        let loaded = if param.loaded {
            "yes".green().to_string()
        } else {
            "no".dimmed().to_string()
        };
        println!(
            "{:<64} {:<22} {:<6} {}",
            param.name,
            format!("{:?}", param.shape),
            param.dtype,
            loaded
        );
    }
    Ok(())
}

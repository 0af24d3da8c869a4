//! List command - Show registered recipes

use crate::output::{print_json, OutputFormat};
use clap::Args;
use colored::*;
use serde::Serialize;
use tap_models::ModelRegistry;
use tap_types::Result;

#[derive(Args)]
pub struct ListCommand {}

#[derive(Serialize)]
struct RecipeInfo<'a> {
    name: &'a str,
    aliases: Vec<&'a str>,
    depth: usize,
    embed_dim: usize,
    num_heads: usize,
    image_size: usize,
    description: &'a str,
}

pub fn execute(_cmd: ListCommand, format: OutputFormat) -> Result<()> {
    let registry = ModelRegistry::global();
    let recipes: Vec<RecipeInfo> = registry
        .recipes()
        .into_iter()
        .map(|recipe| {
            let encoder = recipe.encoder();
            RecipeInfo {
                name: recipe.name(),
                aliases: registry.aliases_of(recipe.name()),
                depth: encoder.depth,
                embed_dim: encoder.embed_dim,
                num_heads: encoder.num_heads,
                image_size: recipe.config().image_size,
                description: recipe.description(),
            }
        })
        .collect();

    if format == OutputFormat::Json {
        return print_json(&recipes);
    }

    println!(
        "{:<14} {:<16} {:<6} {:<6} {:<6} {}",
        "NAME".bold(),
        "ALIASES".bold(),
        "DEPTH".bold(),
        "WIDTH".bold(),
        "HEADS".bold(),
        "DESCRIPTION".bold()
    );
    for recipe in recipes {
        println!(
            "{:<14} {:<16} {:<6} {:<6} {:<6} {}",
            recipe.name.cyan(),
            recipe.aliases.join(","),
            recipe.depth,
            recipe.embed_dim,
            recipe.num_heads,
            recipe.description.dimmed()
        );
    }
    Ok(())
}

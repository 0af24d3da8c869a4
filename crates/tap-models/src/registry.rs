//! Recipe registry

use crate::builder::{assemble, BuildOptions, EncoderFactory, TokenizerConfig};
use crate::components::{vit_encoder, EncoderPreset};
use crate::model::ImageTokenizer;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tap_types::{Result, TapError};
use tracing::debug;

/// Named build preset
#[derive(Clone)]
pub struct Recipe {
    name: String,
    description: String,
    encoder: EncoderPreset,
    encoder_factory: EncoderFactory,
    config: TokenizerConfig,
}

impl std::fmt::Debug for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.name)
            .field("encoder", &self.encoder)
            .field("config", &self.config)
            .finish()
    }
}

impl Recipe {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        encoder: EncoderPreset,
        encoder_factory: EncoderFactory,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            encoder,
            encoder_factory,
            config: TokenizerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TokenizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn encoder(&self) -> EncoderPreset {
        self.encoder
    }

    pub fn encoder_factory(&self) -> EncoderFactory {
        self.encoder_factory
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn build(&self, options: BuildOptions) -> Result<ImageTokenizer> {
        assemble(self, options)
    }
}

/// Recipes by name, plus aliases
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    recipes: HashMap<String, Recipe>,
    aliases: HashMap<String, String>,
}

static GLOBAL: Lazy<ModelRegistry> = Lazy::new(ModelRegistry::with_defaults);

impl ModelRegistry {
    pub const VIT_B: &'static str = "tap_vit_b";
    pub const VIT_L: &'static str = "tap_vit_l";

    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in recipes
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Recipe::new(
            Self::VIT_B,
            "Image tokenizer with a ViT-B encoder (12 blocks, width 768)",
            EncoderPreset::VIT_B,
            vit_encoder,
        ));
        registry.register(Recipe::new(
            Self::VIT_L,
            "Image tokenizer with a ViT-L encoder (24 blocks, width 1024)",
            EncoderPreset::VIT_L,
            vit_encoder,
        ));
        registry.register_alias("variant-base", Self::VIT_B);
        registry.register_alias("variant-large", Self::VIT_L);
        registry
    }

    /// Process-wide registry of the built-in recipes
    pub fn global() -> &'static ModelRegistry {
        &GLOBAL
    }

    pub fn register(&mut self, recipe: Recipe) {
        debug!("Registering recipe: {}", recipe.name());
        self.recipes.insert(recipe.name().to_string(), recipe);
    }

    pub fn register_alias(&mut self, alias: impl Into<String>, name: impl Into<String>) {
        self.aliases.insert(alias.into(), name.into());
    }

    fn canonical<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn get(&self, name: &str) -> Result<&Recipe> {
        self.recipes
            .get(self.canonical(name))
            .ok_or_else(|| TapError::config(format!("unknown recipe: {}", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.recipes.contains_key(self.canonical(name))
    }

    /// Registered recipe names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.recipes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Aliases pointing at `name`, sorted
    pub fn aliases_of(&self, name: &str) -> Vec<&str> {
        let mut aliases: Vec<&str> = self
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == name)
            .map(|(alias, _)| alias.as_str())
            .collect();
        aliases.sort_unstable();
        aliases
    }

    pub fn recipes(&self) -> Vec<&Recipe> {
        self.names()
            .into_iter()
            .filter_map(|name| self.recipes.get(name))
            .collect()
    }

    pub fn build(&self, name: &str, options: BuildOptions) -> Result<ImageTokenizer> {
        self.get(name)?.build(options)
    }
}

/// Build a recipe from the global registry
pub fn build_recipe(name: &str, options: BuildOptions) -> Result<ImageTokenizer> {
    ModelRegistry::global().build(name, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_recipes() {
        let registry = ModelRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["tap_vit_b", "tap_vit_l"]);
        assert_eq!(registry.get("tap_vit_b").unwrap().encoder(), EncoderPreset::VIT_B);
        assert_eq!(registry.get("tap_vit_l").unwrap().encoder().depth, 24);
    }

    #[test]
    fn aliases_resolve() {
        let registry = ModelRegistry::global();
        assert_eq!(registry.get("variant-base").unwrap().name(), "tap_vit_b");
        assert_eq!(registry.get("variant-large").unwrap().name(), "tap_vit_l");
        assert!(registry.contains("variant-large"));
        assert_eq!(registry.aliases_of("tap_vit_b"), vec!["variant-base"]);
    }

    #[test]
    fn unknown_recipe_is_config_error() {
        let registry = ModelRegistry::global();
        let err = registry.get("nonexistent").unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("unknown recipe"));
        assert!(!registry.contains("nonexistent"));
    }

    #[test]
    fn custom_recipe_registration() {
        let mut registry = ModelRegistry::new();
        assert!(registry.names().is_empty());

        let tiny = EncoderPreset {
            depth: 1,
            embed_dim: 32,
            num_heads: 2,
        };
        registry.register(
            Recipe::new("tiny", "test recipe", tiny, vit_encoder).with_config(TokenizerConfig {
                image_size: 64,
                ..Default::default()
            }),
        );
        registry.register_alias("t", "tiny");
        assert_eq!(registry.get("t").unwrap().config().image_size, 64);
    }
}

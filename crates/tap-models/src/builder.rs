//! Model assembly pipeline
//!
//! Every recipe is built by the same function: construct the components from
//! the recipe's presets merged with caller overrides, compose them, then run
//! load weights → device → mode → precision → batch-norm rewrite, in that
//! order.

use crate::components::{
    concept_projector, image_decoder, prompt_encoder, text_decoder, EncoderConfig,
    EncoderPreset, ImageDecoderConfig, TextDecoderConfig, TextTokenizer,
};
use crate::device::{device_label, DeviceResolver};
use crate::model::ImageTokenizer;
use crate::module::Module;
use crate::registry::Recipe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tap_types::{Mode, Precision, Result, SpecialTokens, TapError};
use tracing::{debug, info, warn};

/// Encoder factory bound into a recipe
pub type EncoderFactory = fn(&EncoderConfig) -> Result<Module>;

/// Hyperparameters shared by every recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub image_size: usize,
    pub prompt_embed_dim: usize,
    pub sem_embed_dim: usize,
    pub text_embed_dim: usize,
    pub text_decoder_depth: usize,
    pub text_seq_len: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            image_size: 1024,
            prompt_embed_dim: 256,
            sem_embed_dim: 1024,
            text_embed_dim: 512,
            text_decoder_depth: 12,
            text_seq_len: 100,
        }
    }
}

impl TokenizerConfig {
    /// Apply overrides; set fields win over the preset
    pub fn merged(&self, overrides: &Overrides) -> Self {
        Self {
            image_size: overrides.image_size.unwrap_or(self.image_size),
            prompt_embed_dim: overrides.prompt_embed_dim.unwrap_or(self.prompt_embed_dim),
            sem_embed_dim: overrides.sem_embed_dim.unwrap_or(self.sem_embed_dim),
            text_embed_dim: overrides.text_embed_dim.unwrap_or(self.text_embed_dim),
            text_decoder_depth: overrides
                .text_decoder_depth
                .unwrap_or(self.text_decoder_depth),
            text_seq_len: overrides.text_seq_len.unwrap_or(self.text_seq_len),
        }
    }
}

/// Caller overrides of recipe hyperparameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Overrides {
    pub image_size: Option<usize>,
    pub prompt_embed_dim: Option<usize>,
    pub sem_embed_dim: Option<usize>,
    pub text_embed_dim: Option<usize>,
    pub text_decoder_depth: Option<usize>,
    pub text_seq_len: Option<usize>,
    /// Encoder depth
    pub depth: Option<usize>,
    /// Encoder width
    pub embed_dim: Option<usize>,
    /// Encoder head count
    pub num_heads: Option<usize>,
    /// Caption vocabulary size; defaults to the tokenizer's
    pub vocab_size: Option<usize>,
    /// Keep the model in training mode
    pub training: Option<bool>,
}

impl Overrides {
    /// Parse keyword-style overrides from a JSON object
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| TapError::config(format!("Invalid overrides: {}", e)))
    }

    /// Set one override from text, e.g. `("image_size", "512")`
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let parsed: serde_json::Value = serde_json::from_str(value)
            .map_err(|e| TapError::config(format!("Invalid value for {}: {}", key, e)))?;
        let mut fields = match serde_json::to_value(&*self)? {
            serde_json::Value::Object(fields) => fields,
            _ => serde_json::Map::new(),
        };
        fields.insert(key.to_string(), parsed);
        *self = Self::from_json(serde_json::Value::Object(fields))?;
        Ok(())
    }

    /// Apply encoder overrides to a preset
    pub fn encoder_preset(&self, preset: EncoderPreset) -> EncoderPreset {
        EncoderPreset {
            depth: self.depth.unwrap_or(preset.depth),
            embed_dim: self.embed_dim.unwrap_or(preset.embed_dim),
            num_heads: self.num_heads.unwrap_or(preset.num_heads),
        }
    }
}

/// Arguments of one build call
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Weights file; `None` keeps initial parameters
    pub checkpoint: Option<PathBuf>,
    /// Preferred accelerator index
    pub device_index: usize,
    /// `"float16"`, `"bfloat16"` or `"float32"`; anything else keeps f32
    pub precision: String,
    pub overrides: Overrides,
    /// HuggingFace `tokenizer.json` for the caption vocabulary
    pub tokenizer_file: Option<PathBuf>,
    pub special_tokens: SpecialTokens,
    pub resolver: DeviceResolver,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            checkpoint: None,
            device_index: 0,
            precision: Precision::Float16.to_string(),
            overrides: Overrides::default(),
            tokenizer_file: None,
            special_tokens: SpecialTokens::default(),
            resolver: DeviceResolver::probe(),
        }
    }
}

impl BuildOptions {
    pub fn with_checkpoint(mut self, checkpoint: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(checkpoint.into());
        self
    }

    pub fn with_device_index(mut self, device_index: usize) -> Self {
        self.device_index = device_index;
        self
    }

    pub fn with_precision(mut self, precision: impl Into<String>) -> Self {
        self.precision = precision.into();
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_tokenizer_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tokenizer_file = Some(path.into());
        self
    }

    pub fn with_special_tokens(mut self, special_tokens: SpecialTokens) -> Self {
        self.special_tokens = special_tokens;
        self
    }

    pub fn with_resolver(mut self, resolver: DeviceResolver) -> Self {
        self.resolver = resolver;
        self
    }
}

/// Build an image tokenizer from a recipe
pub fn assemble(recipe: &Recipe, options: BuildOptions) -> Result<ImageTokenizer> {
    let BuildOptions {
        checkpoint,
        device_index,
        precision,
        overrides,
        tokenizer_file,
        special_tokens,
        resolver,
    } = options;

    let config = recipe.config().merged(&overrides);
    let preset = overrides.encoder_preset(recipe.encoder());
    info!(
        "Assembling {} (encoder depth={}, embed_dim={}, image_size={})",
        recipe.name(),
        preset.depth,
        preset.embed_dim,
        config.image_size
    );

    let text_tokenizer = match &tokenizer_file {
        Some(path) => TextTokenizer::from_file(path, special_tokens)?,
        None => TextTokenizer::new(),
    };
    let vocab_size = overrides.vocab_size.unwrap_or(text_tokenizer.n_words());

    let encoder_factory = recipe.encoder_factory();
    let image_encoder = encoder_factory(&EncoderConfig::vit(
        preset,
        config.prompt_embed_dim,
        config.image_size,
    ))?;
    let prompt_encoder = prompt_encoder(config.prompt_embed_dim, config.image_size)?;
    let image_decoder = image_decoder(&ImageDecoderConfig::new(
        config.prompt_embed_dim,
        config.sem_embed_dim,
    ))?;
    let text_decoder = text_decoder(&TextDecoderConfig::new(
        config.text_decoder_depth,
        config.text_embed_dim,
        config.prompt_embed_dim,
        config.text_seq_len,
        vocab_size,
    ))?;

    let mut model = ImageTokenizer::new(
        image_encoder,
        prompt_encoder,
        image_decoder,
        text_decoder,
        text_tokenizer,
        concept_projector(),
    );
    debug!("Composed model with {} parameters", model.num_parameters());

    model.load_weights(checkpoint.as_deref(), true)?;

    let device = resolver.resolve(device_index);
    model.to_device(&device)?;

    model.set_mode(Mode::from_training(overrides.training.unwrap_or(false)));

    match Precision::parse(&precision) {
        Some(precision) => model.to_precision(precision)?,
        None => warn!(
            "Unknown precision '{}', keeping {:?}",
            precision,
            model.dtype()
        ),
    }

    let model = model.convert_sync_batch_norm()?;
    info!(
        "Built {}: {} parameters on {} as {:?} ({})",
        recipe.name(),
        model.num_parameters(),
        device_label(model.device()),
        model.dtype(),
        model.mode()
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_take_precedence() {
        let overrides = Overrides {
            image_size: Some(512),
            text_seq_len: Some(32),
            ..Default::default()
        };
        let merged = TokenizerConfig::default().merged(&overrides);
        assert_eq!(merged.image_size, 512);
        assert_eq!(merged.text_seq_len, 32);
        assert_eq!(merged.prompt_embed_dim, 256);
    }

    #[test]
    fn overrides_from_json() {
        let overrides =
            Overrides::from_json(serde_json::json!({"training": true, "depth": 2})).unwrap();
        assert_eq!(overrides.training, Some(true));
        assert_eq!(overrides.depth, Some(2));

        let err = Overrides::from_json(serde_json::json!({"nope": 1})).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn overrides_set_from_text() {
        let mut overrides = Overrides::default();
        overrides.set("image_size", "256").unwrap();
        overrides.set("training", "true").unwrap();
        assert_eq!(overrides.image_size, Some(256));
        assert_eq!(overrides.training, Some(true));

        assert!(overrides.set("image_size", "big").is_err());
        assert!(overrides.set("unknown_key", "1").is_err());
        assert_eq!(overrides.image_size, Some(256));
    }

    #[test]
    fn encoder_preset_overrides() {
        let overrides = Overrides {
            depth: Some(1),
            ..Default::default()
        };
        let preset = overrides.encoder_preset(EncoderPreset::VIT_L);
        assert_eq!(preset.depth, 1);
        assert_eq!(preset.embed_dim, 1024);
    }
}

//! Image (mask) decoder and text (caption) decoder

use super::layers::{
    conv_transpose2d, embedding, ensure_divisible, ensure_positive, feed_forward, layer_norm,
    linear, linear_no_bias, mlp, stack,
};
use crate::module::{Block, Module};
use serde::{Deserialize, Serialize};
use tap_types::Result;
use tracing::debug;

/// Hyperparameters of [`image_decoder`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDecoderConfig {
    pub depth: usize,
    pub embed_dim: usize,
    pub num_heads: usize,
    pub mlp_ratio: usize,
    pub num_mask_tokens: usize,
    pub sem_embed_dim: usize,
}

impl ImageDecoderConfig {
    pub const DEPTH: usize = 2;
    pub const HEAD_DIM: usize = 32;
    pub const MLP_RATIO: usize = 8;
    pub const NUM_MASK_TOKENS: usize = 4;

    /// Two-way decoder with one head per 32 channels
    pub fn new(embed_dim: usize, sem_embed_dim: usize) -> Self {
        Self {
            depth: Self::DEPTH,
            embed_dim,
            num_heads: embed_dim / Self::HEAD_DIM,
            mlp_ratio: Self::MLP_RATIO,
            num_mask_tokens: Self::NUM_MASK_TOKENS,
            sem_embed_dim,
        }
    }

    pub fn validate(&self) -> Result<()> {
        const NAME: &str = "image decoder";
        ensure_positive(NAME, "depth", self.depth)?;
        ensure_positive(NAME, "embed_dim", self.embed_dim)?;
        ensure_positive(NAME, "mlp_ratio", self.mlp_ratio)?;
        ensure_positive(NAME, "num_mask_tokens", self.num_mask_tokens)?;
        ensure_positive(NAME, "sem_embed_dim", self.sem_embed_dim)?;
        ensure_divisible(NAME, "embed_dim", self.embed_dim, "num_heads", self.num_heads)?;
        ensure_divisible(NAME, "embed_dim", self.embed_dim, "upscaling factor", 8)?;
        Ok(())
    }
}

/// Hyperparameters of [`text_decoder`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDecoderConfig {
    pub depth: usize,
    pub embed_dim: usize,
    pub num_heads: usize,
    pub mlp_ratio: usize,
    pub prompt_embed_dim: usize,
    pub max_seq_len: usize,
    pub vocab_size: usize,
}

impl TextDecoderConfig {
    pub const HEAD_DIM: usize = 64;
    pub const MLP_RATIO: usize = 4;

    /// Causal decoder with one head per 64 channels
    pub fn new(
        depth: usize,
        embed_dim: usize,
        prompt_embed_dim: usize,
        max_seq_len: usize,
        vocab_size: usize,
    ) -> Self {
        Self {
            depth,
            embed_dim,
            num_heads: embed_dim / Self::HEAD_DIM,
            mlp_ratio: Self::MLP_RATIO,
            prompt_embed_dim,
            max_seq_len,
            vocab_size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        const NAME: &str = "text decoder";
        ensure_positive(NAME, "depth", self.depth)?;
        ensure_positive(NAME, "embed_dim", self.embed_dim)?;
        ensure_positive(NAME, "mlp_ratio", self.mlp_ratio)?;
        ensure_positive(NAME, "prompt_embed_dim", self.prompt_embed_dim)?;
        ensure_positive(NAME, "max_seq_len", self.max_seq_len)?;
        ensure_positive(NAME, "vocab_size", self.vocab_size)?;
        ensure_divisible(NAME, "embed_dim", self.embed_dim, "num_heads", self.num_heads)?;
        Ok(())
    }
}

fn attention(dim: usize) -> Block {
    Block::new("attention")
        .with_child("q_proj", linear(dim, dim))
        .with_child("k_proj", linear(dim, dim))
        .with_child("v_proj", linear(dim, dim))
        .with_child("out_proj", linear(dim, dim))
}

/// Build the two-way transformer mask decoder.
pub fn image_decoder(config: &ImageDecoderConfig) -> Result<Module> {
    config.validate()?;
    debug!(
        "Building image decoder: depth={}, embed_dim={}, heads={}, sem_embed_dim={}",
        config.depth, config.embed_dim, config.num_heads, config.sem_embed_dim
    );

    let dim = config.embed_dim;
    let layers = stack("layers", config.depth, |_| {
        Block::new("two_way_attention_block")
            .with_child("self_attn", attention(dim))
            .with_child("norm1", layer_norm(dim))
            .with_child("cross_attn_token_to_image", attention(dim))
            .with_child("norm2", layer_norm(dim))
            .with_child("mlp", feed_forward(dim, dim * config.mlp_ratio))
            .with_child("norm3", layer_norm(dim))
            .with_child("cross_attn_image_to_token", attention(dim))
            .with_child("norm4", layer_norm(dim))
    });
    let transformer = Block::new("two_way_transformer")
        .with_child("layers", layers)
        .with_child("final_attn_token_to_image", attention(dim))
        .with_child("norm_final_attn", layer_norm(dim));

    let output_upscaling = Block::new("sequential")
        .with_child("0", conv_transpose2d(dim, dim / 4, 2))
        .with_child("1", layer_norm(dim / 4))
        .with_child("3", conv_transpose2d(dim / 4, dim / 8, 2));

    let hypernetworks = stack("hypernetworks", config.num_mask_tokens, |_| {
        mlp(dim, dim, dim / 8, 3)
    });

    Ok(Block::new("image_decoder")
        .with_child("iou_token", embedding(1, dim))
        .with_child("mask_tokens", embedding(config.num_mask_tokens, dim))
        .with_child("sem_tokens", embedding(config.num_mask_tokens, dim))
        .with_child("transformer", transformer)
        .with_child("output_upscaling", output_upscaling)
        .with_child("output_hypernetworks_mlps", hypernetworks)
        .with_child("iou_prediction_head", mlp(dim, dim, config.num_mask_tokens, 3))
        .with_child("sem_projection", linear(dim, config.sem_embed_dim))
        .into())
}

/// Build the prompt-conditioned causal text decoder.
pub fn text_decoder(config: &TextDecoderConfig) -> Result<Module> {
    config.validate()?;
    debug!(
        "Building text decoder: depth={}, embed_dim={}, heads={}, seq_len={}, vocab={}",
        config.depth, config.embed_dim, config.num_heads, config.max_seq_len, config.vocab_size
    );

    let dim = config.embed_dim;
    let blocks = stack("blocks", config.depth, |_| {
        let attn = Block::new("attention")
            .with_child("qkv", linear(dim, 3 * dim))
            .with_child("proj", linear(dim, dim));
        Block::new("decoder_block")
            .with_child("norm1", layer_norm(dim))
            .with_child("attn", attn)
            .with_child("norm2", layer_norm(dim))
            .with_child("mlp", feed_forward(dim, dim * config.mlp_ratio))
    });

    Ok(Block::new("text_decoder")
        .with_child("prompt_proj", linear(config.prompt_embed_dim, dim))
        .with_child("token_embed", embedding(config.vocab_size, dim))
        .with_child("pos_embed", embedding(config.max_seq_len, dim))
        .with_child("blocks", blocks)
        .with_child("norm", layer_norm(dim))
        .with_child("text_proj", linear_no_bias(dim, config.vocab_size))
        .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_decoder_defaults_follow_embed_dim() {
        let config = ImageDecoderConfig::new(256, 1024);
        assert_eq!(config.num_heads, 8);
        assert_eq!(config.depth, 2);

        let module = image_decoder(&config).unwrap();
        assert_eq!(module.parameter("mask_tokens.weight").unwrap().dims(), &[4, 256]);
        assert_eq!(
            module
                .parameter("transformer.layers.1.cross_attn_image_to_token.q_proj.weight")
                .unwrap()
                .dims(),
            &[256, 256]
        );
        assert_eq!(
            module.parameter("output_upscaling.3.weight").unwrap().dims(),
            &[64, 32, 2, 2]
        );
        assert_eq!(
            module
                .parameter("output_hypernetworks_mlps.3.layers.2.weight")
                .unwrap()
                .dims(),
            &[32, 256]
        );
        assert_eq!(module.parameter("sem_projection.weight").unwrap().dims(), &[1024, 256]);
    }

    #[test]
    fn image_decoder_rejects_narrow_width() {
        // fewer than 32 channels leaves no attention head
        let config = ImageDecoderConfig::new(16, 64);
        assert!(image_decoder(&config).unwrap_err().is_config_error());
    }

    #[test]
    fn text_decoder_layout() {
        let config = TextDecoderConfig::new(12, 512, 256, 100, 32000);
        assert_eq!(config.num_heads, 8);

        let module = text_decoder(&config).unwrap();
        assert_eq!(module.parameter("prompt_proj.weight").unwrap().dims(), &[512, 256]);
        assert_eq!(module.parameter("token_embed.weight").unwrap().dims(), &[32000, 512]);
        assert_eq!(module.parameter("pos_embed.weight").unwrap().dims(), &[100, 512]);
        assert!(module.parameter("blocks.11.mlp.fc2.bias").is_some());
        assert!(module.parameter("text_proj.bias").is_none());
    }

    #[test]
    fn text_decoder_rejects_mismatched_heads() {
        let mut config = TextDecoderConfig::new(1, 128, 64, 8, 10);
        config.num_heads = 3;
        assert!(text_decoder(&config).unwrap_err().is_config_error());
    }

    #[test]
    fn factories_are_deterministic() {
        let config = TextDecoderConfig::new(2, 64, 32, 8, 10);
        let a = text_decoder(&config).unwrap();
        let b = text_decoder(&config).unwrap();
        let names = |m: &Module| {
            m.named_parameters()
                .into_iter()
                .map(|(n, p)| (n, p.dims().to_vec()))
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&a), names(&b));
    }
}

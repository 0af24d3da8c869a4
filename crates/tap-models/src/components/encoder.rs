//! ViT image encoder

use super::layers::{conv2d, ensure_divisible, ensure_positive, feed_forward, layer_norm, linear, stack};
use crate::module::{BatchNorm, Block, Module};
use crate::param::Param;
use serde::{Deserialize, Serialize};
use tap_types::Result;
use tracing::debug;

/// Width/depth preset that distinguishes encoder variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderPreset {
    pub depth: usize,
    pub embed_dim: usize,
    pub num_heads: usize,
}

impl EncoderPreset {
    /// ViT-B: 12 blocks, width 768, 12 heads
    pub const VIT_B: Self = Self {
        depth: 12,
        embed_dim: 768,
        num_heads: 12,
    };

    /// ViT-L: 24 blocks, width 1024, 16 heads
    pub const VIT_L: Self = Self {
        depth: 24,
        embed_dim: 1024,
        num_heads: 16,
    };
}

/// Full hyperparameter set of [`vit_encoder`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub depth: usize,
    pub embed_dim: usize,
    pub num_heads: usize,
    pub mlp_ratio: usize,
    pub patch_size: usize,
    pub window_size: usize,
    pub image_size: usize,
    pub out_dim: usize,
}

impl EncoderConfig {
    pub const MLP_RATIO: usize = 4;
    pub const PATCH_SIZE: usize = 16;
    pub const WINDOW_SIZE: usize = 16;

    /// Standard ViT layout for a preset
    pub fn vit(preset: EncoderPreset, out_dim: usize, image_size: usize) -> Self {
        Self {
            depth: preset.depth,
            embed_dim: preset.embed_dim,
            num_heads: preset.num_heads,
            mlp_ratio: Self::MLP_RATIO,
            patch_size: Self::PATCH_SIZE,
            window_size: Self::WINDOW_SIZE,
            image_size,
            out_dim,
        }
    }

    pub fn validate(&self) -> Result<()> {
        const NAME: &str = "image encoder";
        ensure_positive(NAME, "depth", self.depth)?;
        ensure_positive(NAME, "mlp_ratio", self.mlp_ratio)?;
        ensure_positive(NAME, "window_size", self.window_size)?;
        ensure_positive(NAME, "out_dim", self.out_dim)?;
        ensure_positive(NAME, "embed_dim", self.embed_dim)?;
        ensure_positive(NAME, "image_size", self.image_size)?;
        ensure_divisible(NAME, "embed_dim", self.embed_dim, "num_heads", self.num_heads)?;
        ensure_divisible(NAME, "image_size", self.image_size, "patch_size", self.patch_size)?;
        Ok(())
    }

    /// Side length of the patch grid
    pub fn grid_size(&self) -> usize {
        self.image_size / self.patch_size
    }

    pub fn head_dim(&self) -> usize {
        self.embed_dim / self.num_heads
    }
}

/// Build a ViT image encoder.
///
/// Layout: patch embedding, absolute position embedding, `depth` windowed
/// attention blocks with relative position tables, and a convolutional neck
/// projecting to `out_dim` with synchronized batch normalization.
pub fn vit_encoder(config: &EncoderConfig) -> Result<Module> {
    config.validate()?;
    debug!(
        "Building ViT encoder: depth={}, embed_dim={}, heads={}, image_size={}, out_dim={}",
        config.depth, config.embed_dim, config.num_heads, config.image_size, config.out_dim
    );

    let dim = config.embed_dim;
    let grid = config.grid_size();
    let rel_pos_len = 2 * config.window_size - 1;

    let patch_embed = Block::new("patch_embed").with_child(
        "proj",
        conv2d(dim, 3, config.patch_size, true),
    );

    let blocks = stack("blocks", config.depth, |_| {
        let attn = Block::new("attention")
            .with_child("qkv", linear(dim, 3 * dim))
            .with_child("proj", linear(dim, dim))
            .with_param("rel_pos_h", Param::zeros(&[rel_pos_len, config.head_dim()]))
            .with_param("rel_pos_w", Param::zeros(&[rel_pos_len, config.head_dim()]));
        Block::new("encoder_block")
            .with_child("norm1", layer_norm(dim))
            .with_child("attn", attn)
            .with_child("norm2", layer_norm(dim))
            .with_child("mlp", feed_forward(dim, dim * config.mlp_ratio))
    });

    let neck = Block::new("neck")
        .with_child("0", conv2d(config.out_dim, dim, 1, false))
        .with_child("1", Module::SyncBatchNorm(BatchNorm::new(config.out_dim)))
        .with_child("2", conv2d(config.out_dim, config.out_dim, 3, false))
        .with_child("3", Module::SyncBatchNorm(BatchNorm::new(config.out_dim)));

    Ok(Block::new("image_encoder")
        .with_param("pos_embed", Param::zeros(&[1, grid, grid, dim]))
        .with_child("patch_embed", patch_embed)
        .with_child("blocks", blocks)
        .with_child("neck", neck)
        .into())
}

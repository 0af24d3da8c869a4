//! Prompt encoder for points and boxes

use super::layers::{embedding, ensure_divisible, ensure_positive};
use crate::module::{Block, Module};
use crate::param::Param;
use tap_types::Result;

/// Number of learned point embeddings (background, foreground, two box corners)
pub const NUM_POINT_EMBEDDINGS: usize = 4;

/// Build the prompt encoder.
///
/// Points and box corners are encoded with a random Fourier position encoding
/// (`pe_layer.gaussian_matrix`, `2 x embed_dim/2`) plus learned per-label
/// embeddings.
pub fn prompt_encoder(embed_dim: usize, image_size: usize) -> Result<Module> {
    const NAME: &str = "prompt encoder";
    ensure_positive(NAME, "image_size", image_size)?;
    ensure_positive(NAME, "embed_dim", embed_dim)?;
    ensure_divisible(NAME, "embed_dim", embed_dim, "2", 2)?;

    let pe_layer = Block::new("position_embedding_random")
        .with_param("gaussian_matrix", Param::normal(&[2, embed_dim / 2], 1.0));

    Ok(Block::new("prompt_encoder")
        .with_child("pe_layer", pe_layer)
        .with_child("point_embed", embedding(NUM_POINT_EMBEDDINGS, embed_dim))
        .with_child("not_a_point_embed", embedding(1, embed_dim))
        .into())
}

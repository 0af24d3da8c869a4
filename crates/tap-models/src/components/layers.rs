//! Parameter layouts of the building blocks shared by the components

use crate::module::Block;
use crate::param::Param;
use tap_types::{Result, TapError};

const WEIGHT_STD: f64 = 0.02;

pub(crate) fn linear(in_dim: usize, out_dim: usize) -> Block {
    Block::new("linear")
        .with_param("weight", Param::normal(&[out_dim, in_dim], WEIGHT_STD))
        .with_param("bias", Param::zeros(&[out_dim]))
}

pub(crate) fn linear_no_bias(in_dim: usize, out_dim: usize) -> Block {
    Block::new("linear").with_param("weight", Param::normal(&[out_dim, in_dim], WEIGHT_STD))
}

pub(crate) fn layer_norm(dim: usize) -> Block {
    Block::new("layer_norm")
        .with_param("weight", Param::ones(&[dim]))
        .with_param("bias", Param::zeros(&[dim]))
}

pub(crate) fn conv2d(out_channels: usize, in_channels: usize, kernel: usize, bias: bool) -> Block {
    let block = Block::new("conv2d").with_param(
        "weight",
        Param::normal(&[out_channels, in_channels, kernel, kernel], WEIGHT_STD),
    );
    if bias {
        block.with_param("bias", Param::zeros(&[out_channels]))
    } else {
        block
    }
}

/// Transposed convolution; weight layout is `[in, out, k, k]`
pub(crate) fn conv_transpose2d(in_channels: usize, out_channels: usize, kernel: usize) -> Block {
    Block::new("conv_transpose2d")
        .with_param(
            "weight",
            Param::normal(&[in_channels, out_channels, kernel, kernel], WEIGHT_STD),
        )
        .with_param("bias", Param::zeros(&[out_channels]))
}

pub(crate) fn embedding(num_embeddings: usize, dim: usize) -> Block {
    Block::new("embedding").with_param("weight", Param::normal(&[num_embeddings, dim], 1.0))
}

/// Feed-forward stack `in -> hidden -> ... -> out` under `layers.{i}`
pub(crate) fn mlp(in_dim: usize, hidden_dim: usize, out_dim: usize, num_layers: usize) -> Block {
    let layers = (0..num_layers).fold(Block::new("sequential"), |layers, i| {
        let input = if i == 0 { in_dim } else { hidden_dim };
        let output = if i + 1 == num_layers { out_dim } else { hidden_dim };
        layers.with_child(i.to_string(), linear(input, output))
    });
    Block::new("mlp").with_child("layers", layers)
}

/// Two-layer transformer feed-forward (`fc1`, `fc2`)
pub(crate) fn feed_forward(dim: usize, hidden_dim: usize) -> Block {
    Block::new("feed_forward")
        .with_child("fc1", linear(dim, hidden_dim))
        .with_child("fc2", linear(hidden_dim, dim))
}

/// Children named `0..count`, each built by `make`
pub(crate) fn stack<F>(kind: &str, count: usize, mut make: F) -> Block
where
    F: FnMut(usize) -> Block,
{
    (0..count).fold(Block::new(kind), |stack, i| {
        stack.with_child(i.to_string(), make(i))
    })
}

pub(crate) fn ensure_positive(component: &str, field: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(TapError::config(format!(
            "{}: {} must be positive",
            component, field
        )));
    }
    Ok(())
}

pub(crate) fn ensure_divisible(
    component: &str,
    field: &str,
    value: usize,
    divisor_field: &str,
    divisor: usize,
) -> Result<()> {
    ensure_positive(component, divisor_field, divisor)?;
    if value % divisor != 0 {
        return Err(TapError::config(format!(
            "{}: {} ({}) must be divisible by {} ({})",
            component, field, value, divisor_field, divisor
        )));
    }
    Ok(())
}

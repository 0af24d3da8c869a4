//! Device, precision and mode types

use serde::{Deserialize, Serialize};

/// Accelerator family reported by the availability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    /// No accelerator; everything runs on the host
    None,
    /// NVIDIA CUDA
    Cuda,
    /// Apple GPU using Metal
    Metal,
}

impl Accelerator {
    /// Check if an accelerator is present
    pub fn is_available(&self) -> bool {
        !matches!(self, Accelerator::None)
    }
}

impl std::fmt::Display for Accelerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Accelerator::None => write!(f, "none"),
            Accelerator::Cuda => write!(f, "cuda"),
            Accelerator::Metal => write!(f, "metal"),
        }
    }
}

/// Numeric precision a model can be cast to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Precision {
    /// 16-bit floating point (IEEE 754)
    #[serde(rename = "float16")]
    Float16,
    /// 16-bit brain floating point
    #[serde(rename = "bfloat16")]
    BFloat16,
    /// 32-bit floating point
    #[serde(rename = "float32")]
    Float32,
}

impl Precision {
    /// Parse a precision name. Unrecognized names yield `None`; callers keep
    /// the model at its constructed precision in that case.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "float16" => Some(Precision::Float16),
            "bfloat16" => Some(Precision::BFloat16),
            "float32" => Some(Precision::Float32),
            _ => None,
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Precision::Float16 => "float16",
            Precision::BFloat16 => "bfloat16",
            Precision::Float32 => "float32",
        };
        write!(f, "{}", name)
    }
}

/// Train/eval mode of an assembled model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    #[default]
    Eval,
}

impl Mode {
    pub fn from_training(training: bool) -> Self {
        if training {
            Mode::Train
        } else {
            Mode::Eval
        }
    }

    pub fn is_training(&self) -> bool {
        matches!(self, Mode::Train)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Eval => write!(f, "eval"),
        }
    }
}

//! Error types for tap model assembly

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for tap operations
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum TapError {
    /// Unknown recipe or hyperparameters that violate a factory contract
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Checkpoint unreadable, corrupt, or not matching the model
    #[error("Load error: {message}")]
    Load { message: String },

    /// Tensor backend failures while building or casting
    #[error("Model error: {message}")]
    Model { message: String },

    /// Device errors
    #[error("Device error: {message}")]
    Device { message: String },

    /// Tokenizer errors
    #[error("Tokenizer error: {message}")]
    Tokenizer { message: String },

    /// I/O errors
    #[error("I/O error: {message}")]
    IO { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl TapError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a load error
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
        }
    }

    /// Create a model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
        }
    }

    /// Create a device error
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    /// Create a tokenizer error
    pub fn tokenizer(message: impl Into<String>) -> Self {
        Self::Tokenizer {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::IO {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Whether this is a checkpoint load error
    pub fn is_load_error(&self) -> bool {
        matches!(self, Self::Load { .. })
    }
}

/// Conversion from std::io::Error
impl From<std::io::Error> for TapError {
    fn from(err: std::io::Error) -> Self {
        Self::io(format!("{}", err))
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for TapError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("{}", err))
    }
}

/// Conversion from toml::de::Error
impl From<toml::de::Error> for TapError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("{}", err))
    }
}

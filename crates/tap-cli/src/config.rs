//! CLI configuration management
//!
//! Settings are read from a TOML file (`tap.toml` by default). A missing file
//! is not an error: every section falls back to its defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tap_models::{BuildOptions, DeviceResolver};
use tap_types::{Catalog, Precision, Result, TapError};
use tracing::debug;

/// CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Defaults for `tap inspect`
    pub build: BuildDefaults,

    /// Dataset locations and special tokens
    pub catalog: Catalog,
}

/// Build defaults applied before command-line flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildDefaults {
    /// Checkpoint used when `--checkpoint` is not given
    pub checkpoint: Option<PathBuf>,

    /// Preferred accelerator index
    pub device_index: usize,

    /// Precision name
    pub precision: String,

    /// HuggingFace tokenizer file
    pub tokenizer_file: Option<PathBuf>,
}

impl Default for BuildDefaults {
    fn default() -> Self {
        Self {
            checkpoint: None,
            device_index: 0,
            precision: Precision::Float16.to_string(),
            tokenizer_file: None,
        }
    }
}

impl CliConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            TapError::io(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TapError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Build options seeded from the `[build]` section
    pub fn build_options(&self) -> BuildOptions {
        let mut options = BuildOptions::default()
            .with_device_index(self.build.device_index)
            .with_precision(self.build.precision.clone())
            .with_special_tokens(self.catalog.special_tokens.clone())
            .with_resolver(DeviceResolver::probe());
        if let Some(checkpoint) = &self.build.checkpoint {
            options = options.with_checkpoint(checkpoint);
        }
        if let Some(tokenizer_file) = &self.build.tokenizer_file {
            options = options.with_tokenizer_file(tokenizer_file);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let config = CliConfig::load("/nonexistent/tap.toml").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.build.precision, "float16");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = CliConfig::from_toml_str(
            r#"
            [build]
            precision = "float32"
            checkpoint = "weights/tap_vit_b.pkl"

            [catalog]
            root_path = "/data"
            "#,
        )
        .unwrap();
        assert_eq!(config.build.precision, "float32");
        assert_eq!(config.build.device_index, 0);
        assert_eq!(config.catalog.root_path, "/data");
        assert_eq!(config.catalog.ignore_index, -100);

        let options = config.build_options();
        assert_eq!(options.precision, "float32");
        assert_eq!(
            options.checkpoint.as_deref(),
            Some(Path::new("weights/tap_vit_b.pkl"))
        );
    }

    #[test]
    fn invalid_file_is_config_error() {
        let err = CliConfig::from_toml_str("[build]\ndevice_index = \"zero\"").unwrap_err();
        assert!(err.is_config_error());
    }
}

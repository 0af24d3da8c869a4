//! Static catalog configuration
//!
//! Dataset locations and special-token literals are read-only tables. They are
//! loaded once (or taken from the built-in defaults) and then passed around by
//! reference; nothing mutates a [`Catalog`] after construction.

use crate::{Result, TapError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Immutable lookup tables consumed by collaborators of the model builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    /// Root directory dataset paths are relative to
    pub root_path: String,

    /// Label value ignored by losses
    pub ignore_index: i64,

    /// Special-token literals by key
    pub special_tokens: SpecialTokens,

    /// Conversation datasets by name
    pub datasets: BTreeMap<String, DatasetEntry>,
}

/// Location of one dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub images: String,
    pub annotations: String,
}

/// Special-token literals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialTokens {
    pub pad: String,
    pub eos: String,
    pub bos: String,
    pub unk: String,
    pub image: String,
    #[serde(rename = "box")]
    pub box_token: String,
    pub image_patch: String,
    pub image_start: String,
    pub image_end: String,
}

impl SpecialTokens {
    /// Keys accepted by [`SpecialTokens::get`]
    pub const KEYS: [&'static str; 9] = [
        "pad",
        "eos",
        "bos",
        "unk",
        "image",
        "box",
        "image_patch",
        "image_start",
        "image_end",
    ];

    /// Look up a literal by key
    pub fn get(&self, key: &str) -> Option<&str> {
        let literal = match key {
            "pad" => &self.pad,
            "eos" => &self.eos,
            "bos" => &self.bos,
            "unk" => &self.unk,
            "image" => &self.image,
            "box" => &self.box_token,
            "image_patch" => &self.image_patch,
            "image_start" => &self.image_start,
            "image_end" => &self.image_end,
            _ => return None,
        };
        Some(literal.as_str())
    }

    /// Iterate `(key, literal)` pairs in a stable order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        Self::KEYS
            .iter()
            .filter_map(move |key| self.get(key).map(|literal| (*key, literal)))
    }
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            pad: "<|endoftext|>".to_string(),
            eos: "</s>".to_string(),
            bos: "</s>".to_string(),
            unk: "<unk>".to_string(),
            image: "<image>".to_string(),
            box_token: "<box>".to_string(),
            image_patch: "<imgpad>".to_string(),
            image_start: "<img>".to_string(),
            image_end: "</img>".to_string(),
        }
    }
}

impl Catalog {
    /// Load a catalog from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TapError::io(format!("Failed to read catalog {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a catalog from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TapError::config(format!("Failed to parse catalog: {}", e)))
    }

    /// Look up a dataset by name
    pub fn dataset(&self, name: &str) -> Result<&DatasetEntry> {
        self.datasets
            .get(name)
            .ok_or_else(|| TapError::config(format!("unknown dataset: {}", name)))
    }

    /// Dataset image directory joined onto the catalog root
    pub fn images_path(&self, name: &str) -> Result<std::path::PathBuf> {
        let entry = self.dataset(name)?;
        Ok(Path::new(&self.root_path).join(&entry.images))
    }

    /// Dataset annotation file joined onto the catalog root
    pub fn annotations_path(&self, name: &str) -> Result<std::path::PathBuf> {
        let entry = self.dataset(name)?;
        Ok(Path::new(&self.root_path).join(&entry.annotations))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let datasets = [
            ("laion-coco-4m", "", ""),
            (
                "llava_v1.5_pretrain",
                "data/LLaVA-Pretrain/llava_images/",
                "data/LLaVA-Pretrain/blip_laion_cc_sbu_558k.json",
            ),
            (
                "llava_v1.5_finetune",
                "data/",
                "data/LLaVA-v1.5/llava_v1_5_mix665k.json",
            ),
            (
                "refer_coco",
                "data/refcocos/images/tran2014/",
                "data/refcocos/REC_ref3_train.json",
            ),
            ("pdf", "", ""),
            ("docvqa_train", "", ""),
            ("chartqa_train", "", ""),
        ]
        .into_iter()
        .map(|(name, images, annotations)| {
            (
                name.to_string(),
                DatasetEntry {
                    images: images.to_string(),
                    annotations: annotations.to_string(),
                },
            )
        })
        .collect();

        Self {
            root_path: "./data".to_string(),
            ignore_index: -100,
            special_tokens: SpecialTokens::default(),
            datasets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_token_lookup() {
        let tokens = SpecialTokens::default();
        assert_eq!(tokens.get("image"), Some("<image>"));
        assert_eq!(tokens.get("box"), Some("<box>"));
        assert_eq!(tokens.get("nope"), None);
        assert_eq!(tokens.iter().count(), SpecialTokens::KEYS.len());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let catalog = Catalog::from_toml_str(
            r#"
            root_path = "/mnt/data"

            [special_tokens]
            pad = "[PAD]"
            "#,
        )
        .unwrap();

        assert_eq!(catalog.root_path, "/mnt/data");
        assert_eq!(catalog.special_tokens.pad, "[PAD]");
        assert_eq!(catalog.special_tokens.eos, "</s>");
        assert_eq!(catalog.ignore_index, -100);
    }
}

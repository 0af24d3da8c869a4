//! Assembled image tokenizer

use crate::components::TextTokenizer;
use crate::device::{device_label, precision_dtype};
use crate::loader::{self, LoadReport, StateDict};
use crate::module::{Block, Module, NodeKind};
use crate::param::Param;
use crate::rewrite::convert_sync_batch_norm;
use candle_core::{DType, Device};
use serde::Serialize;
use std::path::Path;
use tap_types::{Mode, Precision, Result, TapError};
use tracing::debug;

/// Image tokenizer: promptable segmentation plus region captioning.
///
/// The learnable components form one module tree whose top-level children are
/// the components named by the `*_COMPONENT` constants. The text tokenizer is
/// held alongside the tree and has no parameters.
#[derive(Debug, Clone)]
pub struct ImageTokenizer {
    modules: Module,
    text_tokenizer: TextTokenizer,
    device: Device,
    dtype: DType,
    mode: Mode,
}

impl ImageTokenizer {
    pub const IMAGE_ENCODER: &'static str = "image_encoder";
    pub const PROMPT_ENCODER: &'static str = "prompt_encoder";
    pub const IMAGE_DECODER: &'static str = "image_decoder";
    pub const TEXT_DECODER: &'static str = "text_decoder";
    pub const CONCEPT_PROJECTOR: &'static str = "concept_projector";

    /// Top-level component names in tree order
    pub const COMPONENTS: [&'static str; 5] = [
        Self::IMAGE_ENCODER,
        Self::PROMPT_ENCODER,
        Self::IMAGE_DECODER,
        Self::TEXT_DECODER,
        Self::CONCEPT_PROJECTOR,
    ];

    /// Compose freshly built components. The model starts on the host, in
    /// training mode, at f32, like any newly constructed module.
    pub fn new(
        image_encoder: Module,
        prompt_encoder: Module,
        image_decoder: Module,
        text_decoder: Module,
        text_tokenizer: TextTokenizer,
        concept_projector: Module,
    ) -> Self {
        let modules = Block::new("image_tokenizer")
            .with_child(Self::IMAGE_ENCODER, image_encoder)
            .with_child(Self::PROMPT_ENCODER, prompt_encoder)
            .with_child(Self::IMAGE_DECODER, image_decoder)
            .with_child(Self::TEXT_DECODER, text_decoder)
            .with_child(Self::CONCEPT_PROJECTOR, concept_projector)
            .into();
        Self {
            modules,
            text_tokenizer,
            device: Device::Cpu,
            dtype: DType::F32,
            mode: Mode::Train,
        }
    }

    /// Root of the parameter tree
    pub fn modules(&self) -> &Module {
        &self.modules
    }

    pub fn component(&self, name: &str) -> Option<&Module> {
        self.modules.child(name)
    }

    pub fn image_encoder(&self) -> Option<&Module> {
        self.component(Self::IMAGE_ENCODER)
    }

    pub fn prompt_encoder(&self) -> Option<&Module> {
        self.component(Self::PROMPT_ENCODER)
    }

    pub fn image_decoder(&self) -> Option<&Module> {
        self.component(Self::IMAGE_DECODER)
    }

    pub fn text_decoder(&self) -> Option<&Module> {
        self.component(Self::TEXT_DECODER)
    }

    pub fn concept_projector(&self) -> Option<&Module> {
        self.component(Self::CONCEPT_PROJECTOR)
    }

    pub fn text_tokenizer(&self) -> &TextTokenizer {
        &self.text_tokenizer
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_training(&self) -> bool {
        self.mode.is_training()
    }

    pub fn named_parameters(&self) -> Vec<(String, &Param)> {
        self.modules.named_parameters()
    }

    pub fn parameter(&self, path: &str) -> Option<&Param> {
        self.modules.parameter(path)
    }

    pub fn parameter_mut(&mut self, path: &str) -> Option<&mut Param> {
        self.modules.parameter_mut(path)
    }

    pub fn num_parameters(&self) -> usize {
        self.modules.num_parameters()
    }

    pub fn count_kind(&self, kind: NodeKind) -> usize {
        self.modules.count_kind(kind)
    }

    /// Load a checkpoint into the parameter tree; `None` keeps initial values
    pub fn load_weights(&mut self, path: Option<&Path>, strict: bool) -> Result<LoadReport> {
        loader::load_weights(&mut self.modules, path, strict)
    }

    pub fn to_device(&mut self, device: &Device) -> Result<()> {
        debug!("Moving model to {}", device_label(device));
        self.modules.to_device(device)?;
        self.device = device.clone();
        Ok(())
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn to_dtype(&mut self, dtype: DType) -> Result<()> {
        debug!("Casting model to {:?}", dtype);
        self.modules.to_dtype(dtype)?;
        self.dtype = dtype;
        Ok(())
    }

    pub fn to_precision(&mut self, precision: Precision) -> Result<()> {
        self.to_dtype(precision_dtype(precision))
    }

    /// Replace every synchronized batch-norm leaf with a plain one.
    ///
    /// Consumes the model: the old tree is released as soon as the new one is
    /// built, so two full parameter sets never outlive this call.
    pub fn convert_sync_batch_norm(self) -> Result<Self> {
        let Self {
            modules,
            text_tokenizer,
            device,
            dtype,
            mode,
        } = self;
        let converted = convert_sync_batch_norm(&modules)?;
        drop(modules);
        Ok(Self {
            modules: converted,
            text_tokenizer,
            device,
            dtype,
            mode,
        })
    }

    /// Allocate storage for every parameter still deferred
    pub fn materialize(&mut self) -> Result<()> {
        self.modules.materialize()
    }

    /// Current value of every parameter by dotted path
    pub fn state_dict(&self) -> Result<StateDict> {
        self.named_parameters()
            .into_iter()
            .map(|(name, param)| {
                param
                    .tensor()
                    .map(|tensor| (name.clone(), tensor))
                    .map_err(|e| TapError::model(format!("{}: {}", name, e)))
            })
            .collect()
    }

    /// Serializable overview for reporting
    pub fn summary(&self) -> ModelSummary {
        let components = Self::COMPONENTS
            .iter()
            .filter_map(|name| {
                self.component(name).map(|module| ComponentSummary {
                    name: name.to_string(),
                    parameters: module.num_parameters(),
                    tensors: module.named_parameters().len(),
                    sync_norms: module.count_kind(NodeKind::SyncNorm),
                    plain_norms: module.count_kind(NodeKind::PlainNorm),
                })
            })
            .collect();
        ModelSummary {
            device: device_label(&self.device),
            dtype: self.dtype.as_str().to_string(),
            mode: self.mode,
            num_parameters: self.num_parameters(),
            vocab_size: self.text_tokenizer.n_words(),
            components,
        }
    }
}

/// Overview of an assembled model
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub device: String,
    pub dtype: String,
    pub mode: Mode,
    pub num_parameters: usize,
    pub vocab_size: usize,
    pub components: Vec<ComponentSummary>,
}

/// Per-component parameter statistics
#[derive(Debug, Clone, Serialize)]
pub struct ComponentSummary {
    pub name: String,
    pub parameters: usize,
    pub tensors: usize,
    pub sync_norms: usize,
    pub plain_norms: usize,
}

//! Image tokenizer assembly
//!
//! This crate builds image tokenizer models from named recipes. A model is a
//! tree of [`Module`] nodes whose parameters are declared by the component
//! factories and filled from a checkpoint. Assembly runs load weights,
//! device placement, mode, precision and the synchronized batch-norm rewrite
//! in that order.

pub mod builder;
pub mod components;
pub mod device;
pub mod loader;
pub mod model;
pub mod module;
pub mod param;
pub mod registry;
pub mod rewrite;

pub use builder::{assemble, BuildOptions, EncoderFactory, Overrides, TokenizerConfig};
pub use components::{
    concept_projector, image_decoder, prompt_encoder, text_decoder, vit_encoder, EncoderConfig,
    EncoderPreset, ImageDecoderConfig, TextDecoderConfig, TextTokenizer,
};
pub use device::{device_label, precision_dtype, resolve_device, DeviceResolver};
pub use loader::{load_state_dict, load_weights, read_checkpoint, CheckpointFormat, LoadReport, StateDict};
pub use model::{ComponentSummary, ImageTokenizer, ModelSummary};
pub use module::{BatchNorm, Block, Module, NodeKind};
pub use param::{Init, Param};
pub use registry::{build_recipe, ModelRegistry, Recipe};
pub use rewrite::convert_sync_batch_norm;

pub use tap_types::{Mode, Precision, Result, TapError};

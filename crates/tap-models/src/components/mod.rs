//! Component factories
//!
//! Each factory is a pure function from hyperparameters to a freshly owned
//! module tree. Parameters are declared, not allocated; structural violations
//! (zero sizes, widths not divisible by head counts) fail with a
//! configuration error.

mod layers;

pub mod decoder;
pub mod encoder;
pub mod projector;
pub mod prompt;
pub mod tokenizer;

pub use decoder::{image_decoder, text_decoder, ImageDecoderConfig, TextDecoderConfig};
pub use encoder::{vit_encoder, EncoderConfig, EncoderPreset};
pub use projector::concept_projector;
pub use prompt::prompt_encoder;
pub use tokenizer::TextTokenizer;

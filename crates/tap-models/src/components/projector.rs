//! Concept projector

use crate::module::{Block, Module};

/// Build the concept projector.
///
/// It carries no checkpoint parameters: its concept bank is attached after
/// assembly, so the state dict never contains `concept_projector.*` keys.
pub fn concept_projector() -> Module {
    Block::new("concept_projector").into()
}

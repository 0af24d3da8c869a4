//! Core type definitions shared across the tap workspace
//!
//! Errors, precision/mode/accelerator enums and the static catalog live here so
//! that the model crate and the CLI agree on them without pulling in the
//! tensor backend.

pub mod config;
pub mod devices;
pub mod errors;

pub use config::*;
pub use devices::*;
pub use errors::*;

/// Result type used throughout tap
pub type Result<T> = std::result::Result<T, TapError>;

//! # tap CLI Library
//!
//! Command-line interface for building and inspecting image tokenizers.
//!
//! ## Commands
//!
//! - `list`: List registered recipes
//! - `inspect`: Build a recipe and report its components and parameters
//! - `catalog`: Show dataset locations and special tokens

pub mod commands;
pub mod config;
pub mod output;
pub mod utils;

pub use config::CliConfig;

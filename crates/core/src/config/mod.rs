//! Configuration management for buildstep

pub mod defaults;
mod settings;

// Re-export main types
pub use settings::{CONFIG_FILE_NAMES, Config, StepConfig};

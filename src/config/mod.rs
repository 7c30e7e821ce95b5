//! Configuration management for gridtrain.
//!
//! A run is described by a single [`Config`]: grid layout, batch size, task,
//! metrics, optimizer and checkpoint location. Configurations load from JSON
//! or TOML files and from `GRIDTRAIN_*` environment variables.

pub mod core;

pub use self::core::{Config, ConfigBuilder, OptimizerConfig};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "gridtrain.toml";

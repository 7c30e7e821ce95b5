//! Core infrastructure module for gridtrain.
//!
//! This module provides the foundational pieces every subsystem builds on:
//! the error taxonomy, shared enumerations, checkpoint key constants and
//! the process grid communication layer.
//!
//! # Organization
//!
//! - [`types`]: Execution modes, partition scopes and other shared enums
//! - [`constants`]: Checkpoint key names, sentinels and defaults
//! - [`error`]: Error handling and error types
//! - [`network`]: Process topology and the `Communicator` trait
//! - [`local_grid`]: A thread-backed process grid for single-host runs and tests
//!
//! # Usage
//!
//! ```rust
//! use gridtrain::core::{
//!     network::{CommScope, Communicator, SingleProcess},
//!     types::ExecutionMode,
//! };
//!
//! let comm = SingleProcess::new();
//! assert!(comm.am_world_master());
//! let lr = comm.broadcast_f32(CommScope::World, 0, 0.01)?;
//! assert_eq!(lr, 0.01);
//! assert_eq!(ExecutionMode::Training.to_string(), "training");
//! # Ok::<(), gridtrain::core::error::GridError>(())
//! ```

pub mod constants;
pub mod error;
pub mod local_grid;
pub mod network;
pub mod types;

pub use constants::*;
pub use error::{GridError, Result};
pub use local_grid::{GridComm, LocalGrid};
pub use network::{CommScope, Communicator, ProcessTopology, SingleProcess};
pub use types::*;

/// Version information for the core module
pub const CORE_MODULE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the `env_logger` backend.
///
/// `verbosity` follows the configuration convention: negative is errors
/// only, 0 is warnings, 1 is info and anything higher is debug. `RUST_LOG`
/// still overrides it. Repeated calls are harmless.
pub fn init_logging(verbosity: i32) {
    let level = match verbosity {
        v if v < 0 => log::LevelFilter::Error,
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

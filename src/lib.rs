//! # gridtrain
//!
//! Orchestration core for training many model replicas over a grid of
//! processes: `num_models` models, each spread over `procs_per_model` ranks.
//!
//! ## Features
//!
//! - **Process topology**: world, per-model and intermodel groups behind a
//!   [`Communicator`] trait, with an in-process [`LocalGrid`] transport.
//! - **Input coordination**: training, validation and testing datasets with
//!   per-phase progress counters, shape cross-checks and the partition policy
//!   (training split across models, evaluation shared by all of them).
//! - **Metric reporting**: per-model values gathered at the world master and
//!   printed as stable, parseable lines.
//! - **Checkpointing**: rank-0-authoritative persistence of dataset progress
//!   and optimizer state, restored by broadcast.
//!
//! ## Quick Start
//!
//! ```rust
//! use gridtrain::{
//!     Callback, ConfigBuilder, ExecutionMode, InMemoryDataset, InputCoordinator, LocalGrid,
//!     ModelView, PrintCallback,
//! };
//! use ndarray::Array2;
//!
//! # fn main() -> gridtrain::Result<()> {
//! let config = ConfigBuilder::new().grid(2, 2).mini_batch_size(4).build()?;
//!
//! let results = LocalGrid::new(config.num_models, config.procs_per_model, None)?.run(|comm| {
//!     let topology = *gridtrain::Communicator::topology(&comm);
//!     let mut coordinator = InputCoordinator::new(topology, config.task);
//!     let train = InMemoryDataset::classification("train", Array2::zeros((32, 3)), vec![0; 32], 2)?;
//!     coordinator.set_training_dataset(Box::new(train));
//!     coordinator.configure_training_partition(&config.training_partition(&topology))?;
//!
//!     coordinator.set_execution_mode(ExecutionMode::Training);
//!     while let Some(batch) = coordinator.fetch_batch(config.mini_batch_size)? {
//!         assert!(batch.len() <= config.mini_batch_size);
//!     }
//!
//!     let view = ModelView::new(&comm, &[]).with_coordinator(&coordinator);
//!     PrintCallback::new(Vec::new()).on_epoch_end(&view)
//! })?;
//! assert!(results.iter().all(|r| r.is_ok()));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms, non_snake_case, non_upper_case_globals)]

// Core infrastructure module - always available
pub mod core;

// Configuration management module
pub mod config;

// Datasets, progress tracking and the input coordinator
pub mod dataset;

// Metrics module
pub mod metrics;

// Training-loop hooks and reporting
pub mod callbacks;

// Checkpoint persistence
pub mod io;

// Optimizers and their checkpoint contract
pub mod optimizer;

// Re-export core functionality for convenience
pub use crate::core::{
    constants::*,
    error::{GridError, Result},
    local_grid::{GridComm, LocalGrid},
    network::{CommScope, Communicator, ProcessTopology, SingleProcess},
    types::*,
};

// Re-export configuration functionality
pub use crate::config::{Config, ConfigBuilder, OptimizerConfig};

// Re-export dataset functionality
pub use crate::dataset::{
    Batch, Dataset, DatasetLabels, DatasetState, InMemoryDataset, InputCoordinator, Partition,
};

// Re-export metrics functionality
pub use crate::metrics::{create_metric, CategoricalAccuracy, MeanSquaredError, Metric};

// Re-export callbacks
pub use crate::callbacks::{Callback, IoCallback, ModelView, PrintCallback};

// Re-export persistence functionality
pub use crate::io::{
    CheckpointManifest, DatasetHeader, FilePersist, MatrixBlob, MemoryPersist, PersistStore,
};

// Re-export optimizers
pub use crate::optimizer::{create_optimizer, Optimizer, RmsProp, Sgd};

// Version information
pub use crate::core::constants::GRIDTRAIN_VERSION as VERSION;

/// Initialize the library.
///
/// Sets up `env_logger` at the verbosity found in `GRIDTRAIN_VERBOSITY`
/// (warnings only when unset). Safe to call more than once.
///
/// # Examples
///
/// ```rust
/// fn main() -> gridtrain::Result<()> {
///     gridtrain::init()?;
///     Ok(())
/// }
/// ```
pub fn init() -> Result<()> {
    let config = Config::load_from_environment()?;
    crate::core::init_logging(config.verbosity);
    Ok(())
}

//! Checkpoint persistence for gridtrain.
//!
//! This module provides the [`PersistStore`] contract, a file-backed store
//! for shared file systems, an in-memory store for tests and single-host
//! runs, and the checkpoint protocol for dataset progress and optimizer state.

pub mod checkpoint;
pub mod file_store;
pub mod memory_store;
pub mod persist;

pub use checkpoint::{learning_rate_key, matrix_key, DatasetHeader};
pub use file_store::{CheckpointManifest, FilePersist};
pub use memory_store::MemoryPersist;
pub use persist::{MatrixBlob, PersistStore};

//! Dataset management module for gridtrain.
//!
//! Readers of every format sit behind the [`Dataset`] capability trait. The
//! [`InputCoordinator`] owns one [`DatasetState`] per execution phase and
//! only ever talks to readers through that trait, so concrete formats stay
//! independent of the orchestration logic.

pub mod coordinator;
pub mod memory;
pub mod progress;

pub use coordinator::InputCoordinator;
pub use memory::{DatasetLabels, InMemoryDataset};
pub use progress::DatasetState;

use crate::core::error::Result;
use crate::core::types::*;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Assignment of samples to a reader: iteration starts at
/// `base_offset + model_offset` and each mini-batch advances by `stride`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    /// First sample index shared by every reader
    pub base_offset: usize,
    /// Distance between the first samples of consecutive mini-batches
    pub stride: usize,
    /// Extra offset of this model's slice; ignored for shared scopes
    pub model_offset: usize,
}

impl Partition {
    pub fn new(base_offset: usize, stride: usize, model_offset: usize) -> Self {
        Self {
            base_offset,
            stride,
            model_offset,
        }
    }

    /// First sample index a reader with `scope` starts from.
    pub fn start(&self, scope: PartitionScope) -> usize {
        match scope {
            PartitionScope::PartitionedByModel { .. } => self.base_offset + self.model_offset,
            PartitionScope::SharedFullSet => self.base_offset,
        }
    }
}

/// One mini-batch handed out by a reader.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Sample rows (`len x linearized_feature_size`)
    pub features: Array2<f32>,
    /// Label rows (`len x linearized_label_size`)
    pub labels: Array2<f32>,
    /// Dataset indices of the samples in this batch
    pub indices: Vec<usize>,
}

impl Batch {
    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Capability interface every dataset reader implements.
///
/// Sizes are reported as `i64` so that the coordinator can use `-1` as the
/// "no dataset" sentinel when it combines them.
pub trait Dataset: Send {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Number of samples in the dataset
    fn sample_count(&self) -> u64;

    /// Length of one flattened sample
    fn linearized_feature_size(&self) -> i64;

    /// Length of one flattened label
    fn linearized_label_size(&self) -> i64;

    /// Set the slice of the dataset this reader iterates and rewind to its start.
    fn configure_partition(&mut self, partition: &Partition, scope: PartitionScope) -> Result<()>;

    /// Read the next mini-batch of at most `max_samples` samples, or `None`
    /// once the partition is exhausted.
    fn fetch_batch(&mut self, max_samples: usize) -> Option<Batch>;

    /// Rewind to the start of the configured partition for a new epoch.
    fn reset(&mut self);
}

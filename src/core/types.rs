//! Core data types shared across the orchestration core.
//!
//! Execution phases, partition scopes and the small enumerations that
//! configuration files select between live here so that every subsystem
//! agrees on one spelling of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample counter type used by dataset progress tracking and checkpoints.
pub type SampleCount = u64;

/// Step counter type used by the reporting callbacks.
pub type StepIndex = u64;

/// Identifier of a process-group model within the grid.
pub type ModelId = usize;

/// Layer index used to key optimizer state in checkpoints.
pub type LayerIndex = usize;

/// Phase label selecting which dataset and counters are active.
///
/// `Prediction` is a placeholder phase that the input coordinator does not
/// implement. Selecting it is accepted, but every operation that resolves
/// the active dataset fails with `GridError::UnknownMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Consuming the training dataset
    Training,
    /// Consuming the validation dataset
    Validation,
    /// Consuming the testing dataset
    Testing,
    /// Unimplemented inference phase
    Prediction,
}

impl ExecutionMode {
    /// The phases that own a dataset in the input coordinator, in the
    /// order shape checks visit them.
    pub const DATA_PHASES: [ExecutionMode; 3] = [
        ExecutionMode::Training,
        ExecutionMode::Validation,
        ExecutionMode::Testing,
    ];

    /// True for the phases the input coordinator tracks.
    pub fn has_dataset(self) -> bool {
        !matches!(self, ExecutionMode::Prediction)
    }

    /// Phase name as it appears in checkpoint keys (`reader_<name>_processed`).
    pub fn checkpoint_name(self) -> &'static str {
        match self {
            ExecutionMode::Training => "train",
            ExecutionMode::Validation => "validate",
            ExecutionMode::Testing => "test",
            ExecutionMode::Prediction => "predict",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Training => write!(f, "training"),
            ExecutionMode::Validation => write!(f, "validation"),
            ExecutionMode::Testing => write!(f, "testing"),
            ExecutionMode::Prediction => write!(f, "prediction"),
        }
    }
}

/// How a dataset is split across the process grid.
///
/// Training data is partitioned across models so each model sees a distinct
/// slice. Evaluation data is shared so that every model scores against the
/// identical full set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionScope {
    /// Iterate the slice that belongs to `model_id` out of `num_models`
    PartitionedByModel {
        /// Model that owns this reader
        model_id: ModelId,
        /// Number of models sharing the dataset
        num_models: usize,
    },
    /// Iterate the whole dataset, ignoring model grouping
    SharedFullSet,
}

impl PartitionScope {
    /// True if iteration honours the model offset.
    pub fn is_partitioned(&self) -> bool {
        matches!(self, PartitionScope::PartitionedByModel { .. })
    }
}

/// Learning task, which decides how label dimensionality is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Labels are class indices; label size is the number of classes
    #[default]
    Classification,
    /// Labels are responses; label size is fixed at 1
    Regression,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Classification => write!(f, "classification"),
            TaskKind::Regression => write!(f, "regression"),
        }
    }
}

/// Metrics the reporting callbacks know how to name and format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Percentage of samples whose arg-max prediction matches the label
    CategoricalAccuracy,
    /// Mean of squared prediction errors
    MeanSquaredError,
}

impl MetricKind {
    /// Unit suffix appended to reported values.
    pub fn display_unit(self) -> &'static str {
        match self {
            MetricKind::CategoricalAccuracy => "%",
            MetricKind::MeanSquaredError => "",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::CategoricalAccuracy => write!(f, "categorical accuracy"),
            MetricKind::MeanSquaredError => write!(f, "mean squared error"),
        }
    }
}

/// Optimizer update rules available through `create_optimizer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Plain stochastic gradient descent
    Sgd,
    /// RMSprop with a running average of squared gradients
    #[default]
    RmsProp,
}

impl OptimizerKind {
    /// Name used in checkpoint matrix keys.
    pub fn key_name(self) -> &'static str {
        match self {
            OptimizerKind::Sgd => "sgd",
            OptimizerKind::RmsProp => "rmsprop",
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Sgd => write!(f, "SGD"),
            OptimizerKind::RmsProp => write!(f, "RMSprop"),
        }
    }
}

/// Persistence namespace a checkpoint entry lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistKind {
    /// Training progress and optimizer state
    Train,
    /// Model parameters
    Model,
}

impl PersistKind {
    /// Directory or prefix name of the namespace.
    pub fn as_str(self) -> &'static str {
        match self {
            PersistKind::Train => "train",
            PersistKind::Model => "model",
        }
    }
}

impl fmt::Display for PersistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

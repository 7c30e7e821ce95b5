//! Core configuration structures for gridtrain runs.
//!
//! This module provides the run configuration, its builder and the partition
//! planning that turns grid layout and batch size into the offsets each
//! dataset reader iterates with.

use crate::core::constants::*;
use crate::core::error::{GridError, Result};
use crate::core::network::ProcessTopology;
use crate::core::types::*;
use crate::dataset::{InMemoryDataset, Partition};
use crate::io::FilePersist;
use crate::metrics::{create_metric, Metric};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Optimizer selection and hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Update rule
    pub kind: OptimizerKind,
    /// Initial learning rate
    pub learning_rate: f32,
    /// Decay of the squared-gradient running average (RMSprop)
    pub rho: f32,
    /// Denominator guard (RMSprop)
    pub epsilon: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            kind: OptimizerKind::default(),
            learning_rate: DEFAULT_LEARNING_RATE,
            rho: DEFAULT_RHO,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl OptimizerConfig {
    /// Validate the optimizer hyperparameters
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(GridError::invalid_parameter(
                "optimizer.learning_rate",
                self.learning_rate.to_string(),
                "must be a positive finite number",
            ));
        }
        if !(0.0..1.0).contains(&self.rho) {
            return Err(GridError::invalid_parameter(
                "optimizer.rho",
                self.rho.to_string(),
                "must be in range [0.0, 1.0)",
            ));
        }
        if !(self.epsilon > 0.0) {
            return Err(GridError::invalid_parameter(
                "optimizer.epsilon",
                self.epsilon.to_string(),
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Main configuration structure for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Process grid
    /// Number of process-group models
    pub num_models: usize,
    /// Ranks per model
    pub procs_per_model: usize,

    // Data
    /// Samples per rank per step
    pub mini_batch_size: usize,
    /// Learning task; regression fixes the label size at 1
    pub task: TaskKind,
    /// Split the training set across models instead of giving each model all of it
    pub data_sets_span_models: bool,
    /// Seed for shuffling in-memory datasets (None = no shuffling)
    pub shuffle_seed: Option<u64>,

    // Reporting
    /// Metrics attached to every model
    pub metrics: Vec<MetricKind>,
    /// Verbosity level for logging (<0 errors, 0 warnings, 1 info, >1 debug)
    pub verbosity: i32,

    // Checkpointing and transport
    /// Directory for shared checkpoints (None = checkpointing disabled)
    pub checkpoint_dir: Option<PathBuf>,
    /// Rendezvous timeout for collectives in milliseconds (None = wait forever)
    pub collective_timeout_ms: Option<u64>,

    /// Optimizer selection
    pub optimizer: OptimizerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            num_models: 1,
            procs_per_model: 1,
            mini_batch_size: DEFAULT_MINI_BATCH_SIZE,
            task: TaskKind::Classification,
            data_sets_span_models: false,
            shuffle_seed: None,
            metrics: vec![MetricKind::CategoricalAccuracy],
            verbosity: 1,
            checkpoint_dir: None,
            collective_timeout_ms: None,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.num_models == 0 {
            return Err(GridError::invalid_parameter(
                "num_models",
                self.num_models.to_string(),
                "must be at least 1",
            ));
        }

        if self.procs_per_model == 0 {
            return Err(GridError::invalid_parameter(
                "procs_per_model",
                self.procs_per_model.to_string(),
                "must be at least 1",
            ));
        }

        if self.mini_batch_size == 0 {
            return Err(GridError::invalid_parameter(
                "mini_batch_size",
                self.mini_batch_size.to_string(),
                "must be at least 1",
            ));
        }

        if self.collective_timeout_ms == Some(0) {
            return Err(GridError::invalid_parameter(
                "collective_timeout_ms",
                "0",
                "must be positive when set",
            ));
        }

        self.optimizer.validate()
    }

    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| GridError::config(format!("Failed to read config file: {}", e)))?;

        let config: Config = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| GridError::config(format!("Failed to parse JSON config: {}", e)))?,
            Some("toml") => toml::from_str(&content)?,
            _ => {
                return Err(GridError::config(
                    "Unsupported config file format. Use .json or .toml",
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)?,
            _ => {
                return Err(GridError::config(
                    "Unsupported config file format. Use .json or .toml",
                ))
            }
        };

        std::fs::write(path, content)
            .map_err(|e| GridError::config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Load configuration from `GRIDTRAIN_*` environment variables on top of
    /// the defaults.
    pub fn load_from_environment() -> Result<Self> {
        let mut config = Config::default();
        config.apply_environment_overrides()?;
        Ok(config)
    }

    /// Override fields that have a `GRIDTRAIN_*` environment variable set.
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        if let Some(val) = env_value("NUM_MODELS") {
            self.num_models = parse_env("NUM_MODELS", &val)?;
        }
        if let Some(val) = env_value("PROCS_PER_MODEL") {
            self.procs_per_model = parse_env("PROCS_PER_MODEL", &val)?;
        }
        if let Some(val) = env_value("MINI_BATCH_SIZE") {
            self.mini_batch_size = parse_env("MINI_BATCH_SIZE", &val)?;
        }
        if let Some(val) = env_value("TASK") {
            self.task = match val.as_str() {
                "classification" => TaskKind::Classification,
                "regression" => TaskKind::Regression,
                _ => return Err(GridError::config(format!("Invalid {}TASK", ENV_PREFIX))),
            };
        }
        if let Some(val) = env_value("DATA_SETS_SPAN_MODELS") {
            self.data_sets_span_models = parse_env("DATA_SETS_SPAN_MODELS", &val)?;
        }
        if let Some(val) = env_value("SHUFFLE_SEED") {
            self.shuffle_seed = Some(parse_env("SHUFFLE_SEED", &val)?);
        }
        if let Some(val) = env_value("VERBOSITY") {
            self.verbosity = parse_env("VERBOSITY", &val)?;
        }
        if let Some(val) = env_value("CHECKPOINT_DIR") {
            self.checkpoint_dir = Some(PathBuf::from(val));
        }
        if let Some(val) = env_value("COLLECTIVE_TIMEOUT_MS") {
            self.collective_timeout_ms = Some(parse_env("COLLECTIVE_TIMEOUT_MS", &val)?);
        }
        if let Some(val) = env_value("OPTIMIZER") {
            self.optimizer.kind = match val.as_str() {
                "sgd" => OptimizerKind::Sgd,
                "rmsprop" => OptimizerKind::RmsProp,
                _ => return Err(GridError::config(format!("Invalid {}OPTIMIZER", ENV_PREFIX))),
            };
        }
        if let Some(val) = env_value("LEARNING_RATE") {
            self.optimizer.learning_rate = parse_env("LEARNING_RATE", &val)?;
        }

        self.validate()
    }

    /// Rendezvous timeout for collectives.
    pub fn collective_timeout(&self) -> Option<Duration> {
        self.collective_timeout_ms.map(Duration::from_millis)
    }

    /// Total number of ranks in the run.
    pub fn world_size(&self) -> usize {
        self.num_models * self.procs_per_model
    }

    /// Topology of a world rank under this configuration.
    pub fn topology_for(&self, world_rank: usize) -> Result<ProcessTopology> {
        ProcessTopology::from_world_rank(world_rank, self.procs_per_model, self.num_models)
    }

    /// Fresh instances of the configured metrics, in configuration order.
    pub fn create_metrics(&self) -> Vec<Box<dyn Metric>> {
        self.metrics.iter().map(|&kind| create_metric(kind)).collect()
    }

    /// Apply the configured shuffle seed to an in-memory dataset.
    pub fn prepare_dataset(&self, dataset: InMemoryDataset) -> InMemoryDataset {
        match self.shuffle_seed {
            Some(seed) => dataset.with_shuffle(seed),
            None => dataset,
        }
    }

    /// Checkpoint store for saving from `topology`, or `None` when
    /// checkpointing is disabled.
    pub fn create_checkpoint_store(&self, topology: &ProcessTopology) -> Result<Option<FilePersist>> {
        self.checkpoint_dir
            .as_ref()
            .map(|dir| FilePersist::create(dir, topology))
            .transpose()
    }

    /// Checkpoint store for restoring on `topology`, or `None` when
    /// checkpointing is disabled.
    pub fn open_checkpoint_store(&self, topology: &ProcessTopology) -> Result<Option<FilePersist>> {
        self.checkpoint_dir
            .as_ref()
            .map(|dir| FilePersist::open(dir, topology))
            .transpose()
    }

    /// Partition used by the training reader of `topology`'s model.
    ///
    /// When data sets span models, consecutive mini-batches are dealt out to
    /// the models in turn: each model starts `model_id` batches in and steps
    /// over one batch per model.
    pub fn training_partition(&self, topology: &ProcessTopology) -> Partition {
        if self.data_sets_span_models {
            Partition {
                base_offset: 0,
                stride: self.mini_batch_size * topology.num_models(),
                model_offset: topology.model_id() * self.mini_batch_size,
            }
        } else {
            self.evaluation_partition()
        }
    }

    /// Partition used by the validation and testing readers.
    pub fn evaluation_partition(&self) -> Partition {
        Partition {
            base_offset: 0,
            stride: self.mini_batch_size,
            model_offset: 0,
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name)).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| GridError::config(format!("Invalid {}{}: {}", ENV_PREFIX, name, value)))
}

/// Configuration builder for fluent configuration creation
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
    validation_errors: Vec<String>,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
            validation_errors: Vec::new(),
        }
    }

    /// Set the process grid layout
    pub fn grid(mut self, num_models: usize, procs_per_model: usize) -> Self {
        if num_models == 0 {
            self.validation_errors
                .push("num_models must be at least 1".to_string());
        }
        if procs_per_model == 0 {
            self.validation_errors
                .push("procs_per_model must be at least 1".to_string());
        }
        self.config.num_models = num_models;
        self.config.procs_per_model = procs_per_model;
        self
    }

    /// Set the mini-batch size
    pub fn mini_batch_size(mut self, size: usize) -> Self {
        if size == 0 {
            self.validation_errors
                .push("mini_batch_size must be at least 1".to_string());
        }
        self.config.mini_batch_size = size;
        self
    }

    pub fn task(mut self, task: TaskKind) -> Self {
        self.config.task = task;
        self
    }

    pub fn data_sets_span_models(mut self, span: bool) -> Self {
        self.config.data_sets_span_models = span;
        self
    }

    pub fn shuffle_seed(mut self, seed: u64) -> Self {
        self.config.shuffle_seed = Some(seed);
        self
    }

    /// Replace the metric list
    pub fn metrics(mut self, metrics: Vec<MetricKind>) -> Self {
        self.config.metrics = metrics;
        self
    }

    /// Set the optimizer update rule
    pub fn optimizer(mut self, kind: OptimizerKind) -> Self {
        self.config.optimizer.kind = kind;
        self
    }

    /// Set the learning rate
    pub fn learning_rate(mut self, rate: f32) -> Self {
        if !(rate > 0.0) {
            self.validation_errors
                .push("learning_rate must be positive".to_string());
        }
        self.config.optimizer.learning_rate = rate;
        self
    }

    pub fn checkpoint_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn collective_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.collective_timeout_ms = Some(timeout);
        self
    }

    pub fn verbosity(mut self, verbosity: i32) -> Self {
        self.config.verbosity = verbosity;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        if !self.validation_errors.is_empty() {
            return Err(GridError::config(format!(
                "Configuration validation failed: {}",
                self.validation_errors.join(", ")
            )));
        }

        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! Common test utilities for gridtrain integration tests.

#![allow(dead_code)]

use gridtrain::*;
use ndarray::{Array2, Axis};
use parking_lot::Mutex;
use rand::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// Timeout for every collective in multi-rank tests, so a protocol bug
/// fails the test instead of hanging it.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn grid(num_models: usize, procs_per_model: usize) -> LocalGrid {
    LocalGrid::new(num_models, procs_per_model, Some(TEST_TIMEOUT)).unwrap()
}

/// Random features with seeded class labels
pub fn create_classification_dataset(
    name: &str,
    num_samples: usize,
    num_features: usize,
    num_classes: usize,
) -> InMemoryDataset {
    let mut rng = StdRng::seed_from_u64(42);
    let features = Array2::from_shape_fn((num_samples, num_features), |_| rng.gen_range(-1.0..1.0));
    let labels = (0..num_samples).map(|_| rng.gen_range(0..num_classes)).collect();
    InMemoryDataset::classification(name, features, labels, num_classes).unwrap()
}

/// Random features with a linear response
pub fn create_regression_dataset(name: &str, num_samples: usize, num_features: usize) -> InMemoryDataset {
    let mut rng = StdRng::seed_from_u64(7);
    let features = Array2::from_shape_fn((num_samples, num_features), |_| rng.gen_range(-5.0..5.0));
    let responses = features.sum_axis(Axis(1)).insert_axis(Axis(1));
    InMemoryDataset::regression(name, features, responses).unwrap()
}

/// Dataset double that reports fixed sizes and records every partition
/// request it receives.
#[derive(Debug, Clone)]
pub struct RecordingDataset {
    name: String,
    samples: u64,
    feature_size: i64,
    label_size: i64,
    pub calls: Arc<Mutex<Vec<(Partition, PartitionScope)>>>,
}

impl RecordingDataset {
    pub fn new(name: &str, samples: u64, feature_size: i64, label_size: i64) -> Self {
        Self {
            name: name.to_string(),
            samples,
            feature_size,
            label_size,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn scopes(&self) -> Vec<PartitionScope> {
        self.calls.lock().iter().map(|(_, scope)| *scope).collect()
    }
}

impl Dataset for RecordingDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample_count(&self) -> u64 {
        self.samples
    }

    fn linearized_feature_size(&self) -> i64 {
        self.feature_size
    }

    fn linearized_label_size(&self) -> i64 {
        self.label_size
    }

    fn configure_partition(&mut self, partition: &Partition, scope: PartitionScope) -> Result<()> {
        self.calls.lock().push((*partition, scope));
        Ok(())
    }

    fn fetch_batch(&mut self, _max_samples: usize) -> Option<Batch> {
        None
    }

    fn reset(&mut self) {}
}

/// Metric double returning one fixed value per phase.
#[derive(Debug, Clone)]
pub struct FixedMetric {
    pub kind: MetricKind,
    pub training: Option<f64>,
    pub validation: Option<f64>,
    pub testing: Option<f64>,
}

impl FixedMetric {
    pub fn accuracy(training: f64, validation: f64, testing: f64) -> Self {
        Self {
            kind: MetricKind::CategoricalAccuracy,
            training: Some(training),
            validation: Some(validation),
            testing: Some(testing),
        }
    }

    /// A metric whose every report fails.
    pub fn broken() -> Self {
        Self {
            kind: MetricKind::CategoricalAccuracy,
            training: None,
            validation: None,
            testing: None,
        }
    }
}

impl Metric for FixedMetric {
    fn kind(&self) -> MetricKind {
        self.kind
    }

    fn record(&mut self, _: ExecutionMode, _: &Array2<f32>, _: &Array2<f32>) -> Result<()> {
        Ok(())
    }

    fn report_metric(&self, mode: ExecutionMode) -> Result<f64> {
        let value = match mode {
            ExecutionMode::Training => self.training,
            ExecutionMode::Validation => self.validation,
            ExecutionMode::Testing => self.testing,
            ExecutionMode::Prediction => None,
        };
        value.ok_or_else(|| GridError::metric(self.name(), format!("no {} value", mode)))
    }

    fn reset(&mut self, _: ExecutionMode) {}
}

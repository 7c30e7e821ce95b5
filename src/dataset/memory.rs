//! In-memory dataset reader.
//!
//! Holds a dense feature matrix plus class or regression labels and serves
//! mini-batches according to the configured partition.

use crate::core::error::{GridError, Result};
use crate::core::types::PartitionScope;
use crate::dataset::{Batch, Dataset, Partition};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Labels attached to an [`InMemoryDataset`].
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetLabels {
    /// One class index per sample; batches carry one-hot rows
    Classes {
        labels: Vec<usize>,
        num_classes: usize,
    },
    /// One response row per sample
    Responses(Array2<f32>),
}

impl DatasetLabels {
    fn len(&self) -> usize {
        match self {
            DatasetLabels::Classes { labels, .. } => labels.len(),
            DatasetLabels::Responses(responses) => responses.nrows(),
        }
    }

    fn width(&self) -> usize {
        match self {
            DatasetLabels::Classes { num_classes, .. } => *num_classes,
            DatasetLabels::Responses(responses) => responses.ncols(),
        }
    }

    fn rows(&self, indices: &[usize]) -> Array2<f32> {
        match self {
            DatasetLabels::Classes {
                labels,
                num_classes,
            } => {
                let mut one_hot = Array2::zeros((indices.len(), *num_classes));
                for (row, &index) in indices.iter().enumerate() {
                    one_hot[[row, labels[index]]] = 1.0;
                }
                one_hot
            }
            DatasetLabels::Responses(responses) => responses.select(Axis(0), indices),
        }
    }
}

/// Dataset reader backed by matrices held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    name: String,
    features: Array2<f32>,
    labels: DatasetLabels,
    order: Vec<usize>,
    layout: Option<(Partition, PartitionScope)>,
    position: usize,
    rng: Option<StdRng>,
}

impl InMemoryDataset {
    /// Classification data: one class index per feature row.
    pub fn classification<S: Into<String>>(
        name: S,
        features: Array2<f32>,
        labels: Vec<usize>,
        num_classes: usize,
    ) -> Result<Self> {
        if num_classes == 0 {
            return Err(GridError::invalid_parameter(
                "num_classes",
                "0",
                "must be at least 1",
            ));
        }
        if let Some(bad) = labels.iter().find(|&&label| label >= num_classes) {
            return Err(GridError::invalid_parameter(
                "labels",
                bad.to_string(),
                format!("class index must be less than {}", num_classes),
            ));
        }
        Self::new(
            name.into(),
            features,
            DatasetLabels::Classes {
                labels,
                num_classes,
            },
        )
    }

    /// Regression data: one response row per feature row.
    pub fn regression<S: Into<String>>(
        name: S,
        features: Array2<f32>,
        responses: Array2<f32>,
    ) -> Result<Self> {
        Self::new(name.into(), features, DatasetLabels::Responses(responses))
    }

    fn new(name: String, features: Array2<f32>, labels: DatasetLabels) -> Result<Self> {
        if labels.len() != features.nrows() {
            return Err(GridError::invalid_parameter(
                "labels",
                labels.len().to_string(),
                format!("must have one entry per sample ({})", features.nrows()),
            ));
        }
        let order = (0..features.nrows()).collect();
        Ok(Self {
            name,
            features,
            labels,
            order,
            layout: None,
            position: 0,
            rng: None,
        })
    }

    /// Shuffle the sample order now and on every `reset`.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        self.order.shuffle(&mut rng);
        self.rng = Some(rng);
        self
    }

    pub fn labels(&self) -> &DatasetLabels {
        &self.labels
    }

    /// Current sample order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    fn start(&self) -> usize {
        self.layout
            .map(|(partition, scope)| partition.start(scope))
            .unwrap_or(0)
    }
}

impl Dataset for InMemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample_count(&self) -> u64 {
        self.features.nrows() as u64
    }

    fn linearized_feature_size(&self) -> i64 {
        self.features.ncols() as i64
    }

    fn linearized_label_size(&self) -> i64 {
        self.labels.width() as i64
    }

    fn configure_partition(&mut self, partition: &Partition, scope: PartitionScope) -> Result<()> {
        if partition.stride == 0 {
            return Err(GridError::invalid_parameter(
                "stride",
                "0",
                "partition stride must be at least 1",
            ));
        }
        self.layout = Some((*partition, scope));
        self.position = self.start();
        log::debug!(
            "Dataset {} iterates from {} with stride {} ({:?})",
            self.name,
            self.position,
            partition.stride,
            scope
        );
        Ok(())
    }

    fn fetch_batch(&mut self, max_samples: usize) -> Option<Batch> {
        let total = self.order.len();
        if max_samples == 0 || self.position >= total {
            return None;
        }

        let end = (self.position + max_samples).min(total);
        let indices = self.order[self.position..end].to_vec();
        self.position += match self.layout {
            Some((partition, _)) => partition.stride,
            None => indices.len(),
        };

        Some(Batch {
            features: self.features.select(Axis(0), &indices),
            labels: self.labels.rows(&indices),
            indices,
        })
    }

    fn reset(&mut self) {
        if let Some(rng) = self.rng.as_mut() {
            self.order.shuffle(rng);
        }
        self.position = self.start();
    }
}

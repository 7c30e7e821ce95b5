//! Regression metrics.

use crate::core::error::{GridError, Result};
use crate::core::types::{ExecutionMode, MetricKind};
use crate::metrics::{check_batch, Metric, ModeAccumulator};
use ndarray::Array2;

/// Mean of squared differences between predictions and responses.
#[derive(Debug, Clone, Default)]
pub struct MeanSquaredError {
    squared_error: ModeAccumulator,
}

impl MeanSquaredError {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for MeanSquaredError {
    fn kind(&self) -> MetricKind {
        MetricKind::MeanSquaredError
    }

    fn record(
        &mut self,
        mode: ExecutionMode,
        predictions: &Array2<f32>,
        labels: &Array2<f32>,
    ) -> Result<()> {
        check_batch(&self.name(), predictions, labels)?;
        let sum: f64 = predictions
            .iter()
            .zip(labels.iter())
            .map(|(&p, &y)| {
                let diff = f64::from(p) - f64::from(y);
                diff * diff
            })
            .sum();
        self.squared_error.add(mode, sum, predictions.len() as u64)
    }

    fn report_metric(&self, mode: ExecutionMode) -> Result<f64> {
        self.squared_error
            .mean(mode)?
            .ok_or_else(|| GridError::metric(self.name(), format!("no {} samples recorded", mode)))
    }

    fn reset(&mut self, mode: ExecutionMode) {
        self.squared_error.reset(mode);
    }
}

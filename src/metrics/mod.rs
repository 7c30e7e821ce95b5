//! Evaluation metrics reported at epoch and test boundaries.
//!
//! A [`Metric`] accumulates per execution phase and reduces to one scalar on
//! the rank that owns it. Reporting across models is the job of the
//! callbacks in [`crate::callbacks`].
//!
//! ```rust
//! use gridtrain::core::types::ExecutionMode;
//! use gridtrain::metrics::{CategoricalAccuracy, Metric};
//! use ndarray::array;
//!
//! let mut accuracy = CategoricalAccuracy::new();
//! let predictions = array![[0.9, 0.1], [0.2, 0.8]];
//! let labels = array![[1.0, 0.0], [1.0, 0.0]];
//! accuracy.record(ExecutionMode::Training, &predictions, &labels)?;
//! assert_eq!(accuracy.report_metric(ExecutionMode::Training)?, 50.0);
//! # Ok::<(), gridtrain::GridError>(())
//! ```

pub mod classification;
pub mod regression;

pub use classification::CategoricalAccuracy;
pub use regression::MeanSquaredError;

use crate::core::error::{GridError, Result};
use crate::core::types::{ExecutionMode, MetricKind};
use ndarray::Array2;

/// Scalar evaluation metric with one accumulator per execution phase.
pub trait Metric: Send {
    fn kind(&self) -> MetricKind;

    /// Display name used in report lines
    fn name(&self) -> String {
        self.kind().to_string()
    }

    /// Accumulate a mini-batch of predictions against one-hot or response labels.
    fn record(
        &mut self,
        mode: ExecutionMode,
        predictions: &Array2<f32>,
        labels: &Array2<f32>,
    ) -> Result<()>;

    /// Current value for `mode`. Fails if nothing was recorded.
    fn report_metric(&self, mode: ExecutionMode) -> Result<f64>;

    /// Forget everything recorded for `mode`.
    fn reset(&mut self, mode: ExecutionMode);
}

/// Build a metric of the given kind.
pub fn create_metric(kind: MetricKind) -> Box<dyn Metric> {
    match kind {
        MetricKind::CategoricalAccuracy => Box::new(CategoricalAccuracy::new()),
        MetricKind::MeanSquaredError => Box::new(MeanSquaredError::new()),
    }
}

/// Running sum and sample count per data phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModeAccumulator {
    totals: [(f64, u64); 3],
}

impl ModeAccumulator {
    fn slot(mode: ExecutionMode) -> Result<usize> {
        match mode {
            ExecutionMode::Training => Ok(0),
            ExecutionMode::Validation => Ok(1),
            ExecutionMode::Testing => Ok(2),
            ExecutionMode::Prediction => Err(GridError::unknown_mode(mode.to_string())),
        }
    }

    pub fn add(&mut self, mode: ExecutionMode, sum: f64, count: u64) -> Result<()> {
        let slot = &mut self.totals[Self::slot(mode)?];
        slot.0 += sum;
        slot.1 += count;
        Ok(())
    }

    /// Mean of everything added for `mode`, or `None` before the first sample.
    pub fn mean(&self, mode: ExecutionMode) -> Result<Option<f64>> {
        let (sum, count) = self.totals[Self::slot(mode)?];
        Ok((count > 0).then(|| sum / count as f64))
    }

    pub fn count(&self, mode: ExecutionMode) -> u64 {
        Self::slot(mode).map(|slot| self.totals[slot].1).unwrap_or(0)
    }

    pub fn reset(&mut self, mode: ExecutionMode) {
        if let Ok(slot) = Self::slot(mode) {
            self.totals[slot] = (0.0, 0);
        }
    }
}

pub(crate) fn check_batch(
    metric: &str,
    predictions: &Array2<f32>,
    labels: &Array2<f32>,
) -> Result<()> {
    if predictions.dim() != labels.dim() {
        return Err(GridError::metric(
            metric,
            format!(
                "predictions are {:?} but labels are {:?}",
                predictions.dim(),
                labels.dim()
            ),
        ));
    }
    Ok(())
}

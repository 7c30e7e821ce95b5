//! Classification metrics.

use crate::core::error::{GridError, Result};
use crate::core::types::{ExecutionMode, MetricKind};
use crate::metrics::{check_batch, Metric, ModeAccumulator};
use ndarray::{Array2, ArrayView1};

/// Percentage of samples whose highest-scoring class matches the label.
#[derive(Debug, Clone, Default)]
pub struct CategoricalAccuracy {
    correct: ModeAccumulator,
}

impl CategoricalAccuracy {
    pub fn new() -> Self {
        Self::default()
    }
}

fn argmax(row: ArrayView1<'_, f32>) -> Option<usize> {
    row.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

impl Metric for CategoricalAccuracy {
    fn kind(&self) -> MetricKind {
        MetricKind::CategoricalAccuracy
    }

    fn record(
        &mut self,
        mode: ExecutionMode,
        predictions: &Array2<f32>,
        labels: &Array2<f32>,
    ) -> Result<()> {
        check_batch(&self.name(), predictions, labels)?;
        let correct = predictions
            .rows()
            .into_iter()
            .zip(labels.rows())
            .filter(|(p, l)| argmax(*p).is_some() && argmax(*p) == argmax(*l))
            .count();
        self.correct
            .add(mode, correct as f64, predictions.nrows() as u64)
    }

    fn report_metric(&self, mode: ExecutionMode) -> Result<f64> {
        self.correct
            .mean(mode)?
            .map(|fraction| fraction * 100.0)
            .ok_or_else(|| GridError::metric(self.name(), format!("no {} samples recorded", mode)))
    }

    fn reset(&mut self, mode: ExecutionMode) {
        self.correct.reset(mode);
    }
}

//! Human-readable progress report.
//!
//! The line formats written here are parsed by log tooling and must stay
//! stable. They are written to a caller-supplied sink rather than the logger.

use crate::callbacks::{agree_on_outcome, Callback, ModelView};
use crate::core::constants::{EPOCH_RULE_WIDTH, GRIDTRAIN_VERSION};
use crate::core::error::Result;
use crate::core::types::ExecutionMode;
use std::io::{self, Write};

/// Prints metric values of every model at epoch and test boundaries.
///
/// Each model master computes its local values, the world master gathers
/// one value per model and writes one line per model per metric, ordered by
/// model id. Other ranks take no part. A metric failure on any model aborts
/// the pass on every model master before anything is written.
#[derive(Debug)]
pub struct PrintCallback<W: Write = io::Stdout> {
    out: W,
}

impl PrintCallback<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl Default for PrintCallback<io::Stdout> {
    fn default() -> Self {
        Self::stdout()
    }
}

impl<W: Write> PrintCallback<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, lines: &[String]) -> Result<()> {
        for line in lines {
            writeln!(self.out, "{}", line)?;
        }
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> Callback for PrintCallback<W> {
    fn on_train_begin(&mut self, model: &ModelView<'_>) -> Result<()> {
        if model.comm.am_world_master() {
            self.emit(&[format!("Training with gridtrain version {}", GRIDTRAIN_VERSION)])?;
        }
        Ok(())
    }

    fn on_epoch_begin(&mut self, model: &ModelView<'_>) -> Result<()> {
        if model.comm.am_world_master() {
            let rule = "-".repeat(EPOCH_RULE_WIDTH);
            self.emit(&[rule.clone(), format!("[{}] Epoch", model.epoch), rule])?;
        }
        Ok(())
    }

    fn on_epoch_end(&mut self, model: &ModelView<'_>) -> Result<()> {
        let comm = model.comm;
        if !comm.am_model_master() {
            return Ok(());
        }

        let local = model
            .metrics
            .iter()
            .map(|metric| {
                Ok((
                    metric.report_metric(ExecutionMode::Training)?,
                    metric.report_metric(ExecutionMode::Validation)?,
                ))
            })
            .collect::<Result<Vec<_>>>();
        let local = agree_on_outcome(comm, "epoch report", local)?;

        let mut lines = Vec::new();
        for (metric, (train, validate)) in model.metrics.iter().zip(local) {
            let train_all = comm.intermodel_gather_f64(train)?;
            let validate_all = comm.intermodel_gather_f64(validate)?;
            if let (Some(train_all), Some(validate_all)) = (train_all, validate_all) {
                let name = metric.name();
                let unit = metric.kind().display_unit();
                for (i, (train, validate)) in train_all.iter().zip(&validate_all).enumerate() {
                    lines.push(format!(
                        "Model {} @{} steps Training {}: {}{} @{} validation steps Validation {}: {}{}",
                        i,
                        model.step,
                        name,
                        train,
                        unit,
                        model.validation_step,
                        name,
                        validate,
                        unit
                    ));
                }
            }
        }
        self.emit(&lines)
    }

    fn on_test_end(&mut self, model: &ModelView<'_>) -> Result<()> {
        let comm = model.comm;
        if !comm.am_model_master() {
            return Ok(());
        }

        let local = model
            .metrics
            .iter()
            .map(|metric| metric.report_metric(ExecutionMode::Testing))
            .collect::<Result<Vec<_>>>();
        let local = agree_on_outcome(comm, "test report", local)?;

        let mut lines = Vec::new();
        for (metric, test) in model.metrics.iter().zip(local) {
            if let Some(test_all) = comm.intermodel_gather_f64(test)? {
                let name = metric.name();
                let unit = metric.kind().display_unit();
                for (i, test) in test_all.iter().enumerate() {
                    lines.push(format!(
                        "Model {} @{} testing steps external validation {}: {}{}",
                        i, model.testing_step, name, test, unit
                    ));
                }
            }
        }
        self.emit(&lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::SingleProcess;
    use crate::metrics::{create_metric, Metric};
    use crate::core::types::MetricKind;
    use ndarray::array;

    fn output(cb: PrintCallback<Vec<u8>>) -> String {
        String::from_utf8(cb.into_inner()).unwrap()
    }

    #[test]
    fn test_banner_and_epoch_rule() {
        let comm = SingleProcess::new();
        let mut view = ModelView::new(&comm, &[]);
        view.epoch = 3;
        let mut cb = PrintCallback::new(Vec::new());
        cb.on_train_begin(&view).unwrap();
        cb.on_epoch_begin(&view).unwrap();

        let text = output(cb);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], format!("Training with gridtrain version {}", GRIDTRAIN_VERSION));
        assert_eq!(lines[1], "-".repeat(59));
        assert_eq!(lines[2], "[3] Epoch");
        assert_eq!(lines[3], lines[1]);
    }

    #[test]
    fn test_single_model_epoch_line() {
        let comm = SingleProcess::new();
        let mut metric = create_metric(MetricKind::CategoricalAccuracy);
        let predictions = array![[0.9, 0.1], [0.3, 0.7]];
        let labels = array![[1.0, 0.0], [0.0, 1.0]];
        metric.record(ExecutionMode::Training, &predictions, &labels).unwrap();
        metric
            .record(ExecutionMode::Validation, &predictions, &array![[1.0, 0.0], [1.0, 0.0]])
            .unwrap();
        let metrics: Vec<Box<dyn Metric>> = vec![metric];

        let mut view = ModelView::new(&comm, &metrics);
        view.step = 120;
        view.validation_step = 8;
        let mut cb = PrintCallback::new(Vec::new());
        cb.on_epoch_end(&view).unwrap();

        assert_eq!(
            output(cb),
            "Model 0 @120 steps Training categorical accuracy: 100% \
             @8 validation steps Validation categorical accuracy: 50%\n"
        );
    }

    #[test]
    fn test_failed_metric_writes_nothing() {
        let comm = SingleProcess::new();
        let metrics: Vec<Box<dyn Metric>> = vec![create_metric(MetricKind::MeanSquaredError)];
        let view = ModelView::new(&comm, &metrics);
        let mut cb = PrintCallback::new(Vec::new());
        assert!(cb.on_test_end(&view).is_err());
        assert!(output(cb).is_empty());
    }
}

//! Per-model report of how far each dataset has been read.

use crate::callbacks::{agree_on_outcome, intermodel_gather_u64, Callback, ModelView};
use crate::core::error::{GridError, Result};
use crate::core::types::{ExecutionMode, SampleCount};
use std::io::{self, Write};

/// Reports `samples_processed` of `total_samples` for each model.
///
/// Training and validation are reported at epoch end, testing at test end.
/// Lines have the form `Model <i> <phase> I/O: <processed> of <total> samples`.
#[derive(Debug)]
pub struct IoCallback<W: Write = io::Stdout> {
    out: W,
    phases: Vec<ExecutionMode>,
}

impl IoCallback<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> IoCallback<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            phases: ExecutionMode::DATA_PHASES.to_vec(),
        }
    }

    /// Only report the given phases.
    pub fn with_phases(mut self, phases: &[ExecutionMode]) -> Self {
        self.phases = phases.to_vec();
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn report(&mut self, model: &ModelView<'_>, candidates: &[ExecutionMode]) -> Result<()> {
        let comm = model.comm;
        if !comm.am_model_master() {
            return Ok(());
        }
        let phases: Vec<ExecutionMode> = candidates
            .iter()
            .copied()
            .filter(|mode| self.phases.contains(mode))
            .collect();
        if phases.is_empty() {
            return Ok(());
        }

        let local = model
            .coordinator
            .ok_or_else(|| GridError::config("I/O reporting needs an input coordinator"))
            .and_then(|coordinator| {
                phases
                    .iter()
                    .map(|&mode| {
                        let state = coordinator.dataset_state(mode)?;
                        Ok((state.samples_processed(), state.total_samples()))
                    })
                    .collect::<Result<Vec<(SampleCount, SampleCount)>>>()
            });
        let local = agree_on_outcome(comm, "I/O report", local)?;

        let mut lines = Vec::new();
        for (mode, (processed, total)) in phases.iter().zip(local) {
            let processed_all = intermodel_gather_u64(comm, processed)?;
            let total_all = intermodel_gather_u64(comm, total)?;
            if let (Some(processed_all), Some(total_all)) = (processed_all, total_all) {
                for (i, (processed, total)) in processed_all.iter().zip(&total_all).enumerate() {
                    lines.push(format!(
                        "Model {} {} I/O: {} of {} samples",
                        i, mode, processed, total
                    ));
                }
            }
        }
        for line in &lines {
            writeln!(self.out, "{}", line)?;
        }
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> Callback for IoCallback<W> {
    fn on_epoch_end(&mut self, model: &ModelView<'_>) -> Result<()> {
        self.report(model, &[ExecutionMode::Training, ExecutionMode::Validation])
    }

    fn on_test_end(&mut self, model: &ModelView<'_>) -> Result<()> {
        self.report(model, &[ExecutionMode::Testing])
    }
}

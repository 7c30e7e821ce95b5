//! Training-loop hooks.
//!
//! A [`Callback`] observes the run at fixed boundaries through a borrowed
//! [`ModelView`]. Reporting callbacks coordinate across models with the
//! intermodel collectives of the view's communicator, so every model master
//! must invoke the same hooks in the same order.

pub mod io;
pub mod print;

pub use self::io::IoCallback;
pub use self::print::PrintCallback;

use crate::core::error::{GridError, Result};
use crate::core::network::{CommScope, Communicator};
use crate::core::types::StepIndex;
use crate::dataset::InputCoordinator;
use crate::metrics::Metric;

/// What a callback may see of the running model on this rank.
pub struct ModelView<'a> {
    pub epoch: u64,
    /// Training steps taken so far.
    pub step: StepIndex,
    pub validation_step: StepIndex,
    pub testing_step: StepIndex,
    pub metrics: &'a [Box<dyn Metric>],
    pub comm: &'a dyn Communicator,
    pub coordinator: Option<&'a InputCoordinator>,
}

impl<'a> ModelView<'a> {
    pub fn new(comm: &'a dyn Communicator, metrics: &'a [Box<dyn Metric>]) -> Self {
        Self {
            epoch: 0,
            step: 0,
            validation_step: 0,
            testing_step: 0,
            metrics,
            comm,
            coordinator: None,
        }
    }

    pub fn with_coordinator(mut self, coordinator: &'a InputCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }
}

/// Hooks invoked by the training loop. All default to no-ops.
pub trait Callback {
    fn on_train_begin(&mut self, _model: &ModelView<'_>) -> Result<()> {
        Ok(())
    }

    fn on_epoch_begin(&mut self, _model: &ModelView<'_>) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, _model: &ModelView<'_>) -> Result<()> {
        Ok(())
    }

    fn on_test_end(&mut self, _model: &ModelView<'_>) -> Result<()> {
        Ok(())
    }
}

/// Share the outcome of a local computation among the model masters.
///
/// Every model master calls this before the value gathers of a reporting
/// pass, so a failure on one model aborts the pass on all of them instead of
/// leaving the others blocked in a gather. The local error is returned
/// unchanged; the other masters get a `Metric` error naming the failed model.
pub(crate) fn agree_on_outcome<T>(
    comm: &dyn Communicator,
    what: &str,
    local: Result<T>,
) -> Result<T> {
    let flag = vec![u8::from(local.is_ok())];
    let flags = comm.exchange(CommScope::Intermodel, "report_outcome", flag)?;
    let value = local?;
    if let Some(model) = flags.iter().position(|f| f.first() != Some(&1)) {
        return Err(GridError::metric(
            what,
            format!("reporting aborted: computation failed on model {}", model),
        ));
    }
    Ok(value)
}

/// Gather one `u64` per model at the world master.
pub(crate) fn intermodel_gather_u64(comm: &dyn Communicator, value: u64) -> Result<Option<Vec<u64>>> {
    let gathered = comm.exchange(
        CommScope::Intermodel,
        "intermodel_gather_u64",
        value.to_le_bytes().to_vec(),
    )?;
    if !comm.am_world_master() {
        return Ok(None);
    }
    gathered
        .iter()
        .map(|bytes| {
            let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                GridError::collective(
                    "intermodel",
                    "intermodel_gather_u64",
                    format!("expected 8 bytes for a u64, received {}", bytes.len()),
                )
            })?;
            Ok(u64::from_le_bytes(raw))
        })
        .collect::<Result<Vec<u64>>>()
        .map(Some)
}

//! Per-phase dataset progress tracking.

use crate::core::error::{GridError, Result};
use crate::core::types::{ExecutionMode, PartitionScope, SampleCount};
use crate::dataset::{Dataset, Partition};
use std::fmt;

/// Progress counters and reader of one execution phase.
///
/// `samples_processed` is expected to stay at or below `total_samples`, but
/// the tracker does not enforce it: a partitioned multi-rank run can
/// legitimately count past the dataset size. The first overrun after each
/// attach is logged and [`DatasetState::is_overrun`] reports it. Overflowing
/// the counter itself is an error and leaves it unchanged.
pub struct DatasetState {
    mode: ExecutionMode,
    dataset: Option<Box<dyn Dataset>>,
    total_samples: SampleCount,
    samples_processed: SampleCount,
    overrun_reported: bool,
}

impl DatasetState {
    /// Empty tracker for `mode`.
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            dataset: None,
            total_samples: 0,
            samples_processed: 0,
            overrun_reported: false,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Take ownership of `dataset`, resetting progress to its start.
    ///
    /// The previously attached reader is handed back to the caller.
    pub fn attach(&mut self, dataset: Box<dyn Dataset>) -> Option<Box<dyn Dataset>> {
        self.total_samples = dataset.sample_count();
        self.samples_processed = 0;
        self.overrun_reported = false;
        log::info!(
            "Attached {} dataset {} with {} samples",
            self.mode,
            dataset.name(),
            self.total_samples
        );
        self.dataset.replace(dataset)
    }

    /// Give up the attached reader. Counters are left untouched.
    pub fn detach(&mut self) -> Option<Box<dyn Dataset>> {
        self.dataset.take()
    }

    pub fn dataset(&self) -> Option<&dyn Dataset> {
        self.dataset.as_deref()
    }

    pub fn dataset_mut(&mut self) -> Option<&mut (dyn Dataset + 'static)> {
        self.dataset.as_deref_mut()
    }

    pub fn has_dataset(&self) -> bool {
        self.dataset.is_some()
    }

    pub fn total_samples(&self) -> SampleCount {
        self.total_samples
    }

    pub fn samples_processed(&self) -> SampleCount {
        self.samples_processed
    }

    /// Count `n` more consumed samples and return the new total.
    pub fn advance(&mut self, n: SampleCount) -> Result<SampleCount> {
        self.samples_processed = self.samples_processed.checked_add(n).ok_or_else(|| {
            log::error!(
                "{} sample counter overflow: {} + {}",
                self.mode,
                self.samples_processed,
                n
            );
            GridError::invalid_parameter(
                "samples_processed",
                n.to_string(),
                format!(
                    "{} sample counter at {} cannot count this many more samples",
                    self.mode, self.samples_processed
                ),
            )
        })?;
        if self.is_overrun() && !self.overrun_reported {
            self.overrun_reported = true;
            log::warn!(
                "{} dataset processed {} samples, exceeding its {} total",
                self.mode,
                self.samples_processed,
                self.total_samples
            );
        }
        Ok(self.samples_processed)
    }

    /// True once more samples were counted than the dataset holds.
    pub fn is_overrun(&self) -> bool {
        self.samples_processed > self.total_samples
    }

    /// Hand the partition to the attached reader; no-op without one.
    pub fn reset_for_partition(&mut self, partition: &Partition, scope: PartitionScope) -> Result<()> {
        match self.dataset.as_deref_mut() {
            Some(dataset) => {
                log::debug!(
                    "Configuring {} reader {}: base {}, stride {}, model offset {}, {:?}",
                    self.mode,
                    dataset.name(),
                    partition.base_offset,
                    partition.stride,
                    partition.model_offset,
                    scope
                );
                dataset.configure_partition(partition, scope)
            }
            None => Ok(()),
        }
    }

    /// Overwrite both counters with checkpointed values.
    pub fn restore(&mut self, samples_processed: SampleCount, total_samples: SampleCount) {
        self.samples_processed = samples_processed;
        self.total_samples = total_samples;
        self.overrun_reported = false;
    }
}

impl fmt::Debug for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetState")
            .field("mode", &self.mode)
            .field("dataset", &self.dataset.as_ref().map(|d| d.name().to_string()))
            .field("total_samples", &self.total_samples)
            .field("samples_processed", &self.samples_processed)
            .finish()
    }
}

//! Execution-mode-aware input coordination.
//!
//! The [`InputCoordinator`] is the input layer's bookkeeping: it selects the
//! dataset of the current execution mode, checks that every attached dataset
//! agrees on sample and label shapes, hands each reader its partition and
//! carries the dataset progress through checkpoints.

use crate::core::constants::{REGRESSION_LABEL_SIZE, UNSET_LINEARIZED_SIZE};
use crate::core::error::{GridError, Result};
use crate::core::network::{Communicator, ProcessTopology};
use crate::core::types::*;
use crate::dataset::{Batch, Dataset, DatasetState, Partition};
use crate::io::checkpoint::{self, DatasetHeader};
use crate::io::PersistStore;

/// Which per-dataset dimension a consistency check compares.
#[derive(Debug, Clone, Copy)]
enum Quantity {
    Feature,
    Label,
}

impl Quantity {
    fn name(self) -> &'static str {
        match self {
            Quantity::Feature => "feature",
            Quantity::Label => "label",
        }
    }

    fn of(self, dataset: &dyn Dataset) -> i64 {
        match self {
            Quantity::Feature => dataset.linearized_feature_size(),
            Quantity::Label => dataset.linearized_label_size(),
        }
    }
}

/// Owner of the training, validation and testing dataset states of one rank.
///
/// Mode changes are driven by the training loop and take effect immediately.
#[derive(Debug)]
pub struct InputCoordinator {
    topology: ProcessTopology,
    task: TaskKind,
    mode: Option<ExecutionMode>,
    training: DatasetState,
    validation: DatasetState,
    testing: DatasetState,
}

impl InputCoordinator {
    pub fn new(topology: ProcessTopology, task: TaskKind) -> Self {
        Self {
            topology,
            task,
            mode: None,
            training: DatasetState::new(ExecutionMode::Training),
            validation: DatasetState::new(ExecutionMode::Validation),
            testing: DatasetState::new(ExecutionMode::Testing),
        }
    }

    pub fn topology(&self) -> &ProcessTopology {
        &self.topology
    }

    pub fn task(&self) -> TaskKind {
        self.task
    }

    /// Switch the active phase.
    ///
    /// Any mode is accepted here; selecting one without a dataset
    /// (`Prediction`) makes the next dataset lookup fail.
    pub fn set_execution_mode(&mut self, mode: ExecutionMode) {
        log::debug!("Input coordinator switching to {} mode", mode);
        self.mode = Some(mode);
    }

    pub fn clear_execution_mode(&mut self) {
        self.mode = None;
    }

    pub fn execution_mode(&self) -> Option<ExecutionMode> {
        self.mode
    }

    /// Attach the training reader, returning the one it replaces.
    pub fn set_training_dataset(&mut self, dataset: Box<dyn Dataset>) -> Option<Box<dyn Dataset>> {
        self.training.attach(dataset)
    }

    /// Attach the validation reader, returning the one it replaces.
    pub fn set_validation_dataset(&mut self, dataset: Box<dyn Dataset>) -> Option<Box<dyn Dataset>> {
        self.validation.attach(dataset)
    }

    /// Attach the testing reader, returning the one it replaces.
    pub fn set_testing_dataset(&mut self, dataset: Box<dyn Dataset>) -> Option<Box<dyn Dataset>> {
        self.testing.attach(dataset)
    }

    /// Attach a reader to the phase `mode`.
    pub fn set_dataset(
        &mut self,
        mode: ExecutionMode,
        dataset: Box<dyn Dataset>,
    ) -> Result<Option<Box<dyn Dataset>>> {
        Ok(self.dataset_state_mut(mode)?.attach(dataset))
    }

    /// Dataset state of a specific phase.
    pub fn dataset_state(&self, mode: ExecutionMode) -> Result<&DatasetState> {
        match mode {
            ExecutionMode::Training => Ok(&self.training),
            ExecutionMode::Validation => Ok(&self.validation),
            ExecutionMode::Testing => Ok(&self.testing),
            ExecutionMode::Prediction => Err(GridError::unknown_mode(mode.to_string())),
        }
    }

    pub fn dataset_state_mut(&mut self, mode: ExecutionMode) -> Result<&mut DatasetState> {
        match mode {
            ExecutionMode::Training => Ok(&mut self.training),
            ExecutionMode::Validation => Ok(&mut self.validation),
            ExecutionMode::Testing => Ok(&mut self.testing),
            ExecutionMode::Prediction => Err(GridError::unknown_mode(mode.to_string())),
        }
    }

    fn active_mode(&self, operation: &str) -> Result<ExecutionMode> {
        self.mode.ok_or_else(|| GridError::invalid_mode(operation))
    }

    /// Dataset state of the current mode.
    pub fn select_active_dataset(&self) -> Result<&DatasetState> {
        let mode = self.active_mode("select_active_dataset")?;
        self.dataset_state(mode)
    }

    pub fn select_active_dataset_mut(&mut self) -> Result<&mut DatasetState> {
        let mode = self.active_mode("select_active_dataset")?;
        self.dataset_state_mut(mode)
    }

    /// Count `num_samples` consumed by the current mode and return its new total.
    pub fn update_num_samples_processed(&mut self, num_samples: SampleCount) -> Result<SampleCount> {
        let mode = self.active_mode("update_num_samples_processed")?;
        self.dataset_state_mut(mode)?.advance(num_samples)
    }

    /// Fetch the next mini-batch of the current mode and count it as processed.
    pub fn fetch_batch(&mut self, max_samples: usize) -> Result<Option<Batch>> {
        let mode = self.active_mode("fetch_batch")?;
        let state = self.dataset_state_mut(mode)?;
        let dataset = state
            .dataset_mut()
            .ok_or_else(|| GridError::config(format!("no {} dataset attached", mode)))?;
        let batch = dataset.fetch_batch(max_samples);
        if let Some(batch) = &batch {
            state.advance(batch.len() as SampleCount)?;
        }
        Ok(batch)
    }

    /// Flattened sample length shared by every attached dataset, or `-1` if
    /// none is attached.
    pub fn linearized_feature_size(&self) -> Result<i64> {
        self.consistent_size(Quantity::Feature)
    }

    /// Flattened label length shared by every attached dataset, or `-1` if
    /// none is attached.
    ///
    /// Regression tasks always report 1 without consulting the datasets.
    pub fn linearized_label_size(&self) -> Result<i64> {
        if self.task == TaskKind::Regression {
            return Ok(REGRESSION_LABEL_SIZE);
        }
        self.consistent_size(Quantity::Label)
    }

    fn consistent_size(&self, quantity: Quantity) -> Result<i64> {
        let mut size = UNSET_LINEARIZED_SIZE;
        for state in [&self.training, &self.validation, &self.testing] {
            let Some(dataset) = state.dataset() else {
                continue;
            };
            let current = quantity.of(dataset);
            if size != UNSET_LINEARIZED_SIZE && size != current {
                return Err(GridError::shape_mismatch(
                    state.mode().to_string(),
                    quantity.name(),
                    size,
                    current,
                ));
            }
            size = current;
        }
        Ok(size)
    }

    /// Partition the training reader across models.
    pub fn configure_training_partition(&mut self, partition: &Partition) -> Result<()> {
        let scope = PartitionScope::PartitionedByModel {
            model_id: self.topology.model_id(),
            num_models: self.topology.num_models(),
        };
        self.training.reset_for_partition(partition, scope)
    }

    /// Give the validation and testing readers the full dataset.
    ///
    /// Evaluation data is never split across models so that every model is
    /// scored on the identical samples.
    pub fn configure_evaluation_partition(&mut self, partition: &Partition) -> Result<()> {
        self.validation
            .reset_for_partition(partition, PartitionScope::SharedFullSet)?;
        self.testing
            .reset_for_partition(partition, PartitionScope::SharedFullSet)
    }

    /// Snapshot of all six progress counters.
    pub fn progress_header(&self) -> DatasetHeader {
        DatasetHeader {
            train_processed: self.training.samples_processed(),
            train_total: self.training.total_samples(),
            test_processed: self.testing.samples_processed(),
            test_total: self.testing.total_samples(),
            validate_processed: self.validation.samples_processed(),
            validate_total: self.validation.total_samples(),
        }
    }

    /// Overwrite all six progress counters.
    pub fn apply_progress_header(&mut self, header: &DatasetHeader) {
        self.training
            .restore(header.train_processed, header.train_total);
        self.testing.restore(header.test_processed, header.test_total);
        self.validation
            .restore(header.validate_processed, header.validate_total);
    }

    /// Write the dataset progress counters. Only rank 0 of the store writes.
    pub fn save_to_checkpoint_shared(&self, store: &mut dyn PersistStore) -> Result<()> {
        checkpoint::save_dataset_progress(&self.progress_header(), store)
    }

    /// Restore the dataset progress counters from rank 0 of this model.
    ///
    /// Every rank of the model must call this; the counters are replaced
    /// unconditionally. The restart must use the topology of the save.
    pub fn load_from_checkpoint_shared(
        &mut self,
        store: &dyn PersistStore,
        comm: &dyn Communicator,
    ) -> Result<()> {
        let header = checkpoint::load_dataset_progress(store, comm)?;
        self.apply_progress_header(&header);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::InMemoryDataset;
    use ndarray::Array2;

    fn classification(name: &str, rows: usize, features: usize, classes: usize) -> Box<dyn Dataset> {
        Box::new(
            InMemoryDataset::classification(
                name,
                Array2::zeros((rows, features)),
                vec![0; rows],
                classes,
            )
            .unwrap(),
        )
    }

    fn coordinator(task: TaskKind) -> InputCoordinator {
        InputCoordinator::new(ProcessTopology::single(), task)
    }

    #[test]
    fn test_unset_sizes() {
        let coord = coordinator(TaskKind::Classification);
        assert_eq!(coord.linearized_feature_size().unwrap(), -1);
        assert_eq!(coord.linearized_label_size().unwrap(), -1);
    }

    #[test]
    fn test_consistent_sizes() {
        let mut coord = coordinator(TaskKind::Classification);
        coord.set_training_dataset(classification("train", 60, 784, 10));
        coord.set_testing_dataset(classification("test", 10, 784, 10));
        assert_eq!(coord.linearized_feature_size().unwrap(), 784);
        assert_eq!(coord.linearized_label_size().unwrap(), 10);
    }

    #[test]
    fn test_feature_mismatch_names_phase() {
        let mut coord = coordinator(TaskKind::Classification);
        coord.set_training_dataset(classification("train", 60, 784, 10));
        coord.set_validation_dataset(classification("val", 10, 100, 10));

        match coord.linearized_feature_size().unwrap_err() {
            GridError::DatasetShapeMismatch {
                phase,
                quantity,
                expected,
                actual,
            } => {
                assert_eq!(phase, "validation");
                assert_eq!(quantity, "feature");
                assert_eq!(expected, 784);
                assert_eq!(actual, 100);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_regression_label_size_bypass() {
        let mut coord = coordinator(TaskKind::Regression);
        coord.set_training_dataset(classification("train", 5, 4, 3));
        coord.set_testing_dataset(classification("test", 5, 4, 7));
        assert_eq!(coord.linearized_label_size().unwrap(), 1);
    }

    #[test]
    fn test_mode_selection() {
        let mut coord = coordinator(TaskKind::Classification);
        assert!(matches!(
            coord.select_active_dataset(),
            Err(GridError::InvalidMode { .. })
        ));
        assert!(matches!(
            coord.update_num_samples_processed(5),
            Err(GridError::InvalidMode { .. })
        ));

        coord.set_execution_mode(ExecutionMode::Validation);
        assert_eq!(
            coord.select_active_dataset().unwrap().mode(),
            ExecutionMode::Validation
        );

        coord.set_execution_mode(ExecutionMode::Prediction);
        assert!(matches!(
            coord.select_active_dataset(),
            Err(GridError::UnknownMode { .. })
        ));
    }

    #[test]
    fn test_update_targets_active_mode() {
        let mut coord = coordinator(TaskKind::Classification);
        coord.set_training_dataset(classification("train", 100, 2, 2));
        coord.set_testing_dataset(classification("test", 100, 2, 2));

        coord.set_execution_mode(ExecutionMode::Training);
        coord.update_num_samples_processed(16).unwrap();
        coord.set_execution_mode(ExecutionMode::Testing);
        assert_eq!(coord.update_num_samples_processed(4).unwrap(), 4);

        let header = coord.progress_header();
        assert_eq!(header.train_processed, 16);
        assert_eq!(header.test_processed, 4);
        assert_eq!(header.test_total, 100);
    }

    #[test]
    fn test_fetch_batch_advances_counter() {
        let mut coord = coordinator(TaskKind::Classification);
        coord.set_training_dataset(classification("train", 10, 2, 2));
        coord.set_execution_mode(ExecutionMode::Training);

        let batch = coord.fetch_batch(4).unwrap().unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(coord.select_active_dataset().unwrap().samples_processed(), 4);

        coord.set_execution_mode(ExecutionMode::Validation);
        assert!(coord.fetch_batch(4).is_err());
    }
}

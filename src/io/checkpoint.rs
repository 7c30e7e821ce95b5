//! Shared checkpoint protocol.
//!
//! Dataset progress: rank 0 of each model writes the six reader counters
//! under the `train` namespace. On restore rank 0 reads them into a
//! [`DatasetHeader`] and broadcasts its bytes to every rank of the same
//! model. Each model restores from its own rank 0.
//!
//! Optimizer state: rank 0 writes the learning rate of a layer as
//! `L<index>_learning_rate`; accumulator matrices go through the store's
//! matrix I/O as `L<index>_<name>_<rows>x<cols>`. On restore the learning
//! rate is broadcast from world rank 0 to every rank of every model, and
//! each matrix is looked up by the live matrix's exact shape.
//!
//! Both protocols assume the restart uses the grid layout of the save.

use crate::core::constants::*;
use crate::core::error::{GridError, Result};
use crate::core::network::{CommScope, Communicator};
use crate::core::types::{LayerIndex, PersistKind, SampleCount};
use crate::io::persist::{self, matrix_file_name, PersistStore};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

/// Fixed-layout record of the six dataset progress counters.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatasetHeader {
    pub train_processed: SampleCount,
    pub train_total: SampleCount,
    pub test_processed: SampleCount,
    pub test_total: SampleCount,
    pub validate_processed: SampleCount,
    pub validate_total: SampleCount,
}

const_assert_eq!(std::mem::size_of::<DatasetHeader>(), DatasetHeader::ENCODED_LEN);

impl DatasetHeader {
    /// Size of the header on the wire.
    pub const ENCODED_LEN: usize = 48;

    /// Counters in `DATASET_PROGRESS_KEYS` order.
    pub fn values(&self) -> [SampleCount; 6] {
        [
            self.train_processed,
            self.train_total,
            self.test_processed,
            self.test_total,
            self.validate_processed,
            self.validate_total,
        ]
    }

    fn from_values(values: [SampleCount; 6]) -> Self {
        Self {
            train_processed: values[0],
            train_total: values[1],
            test_processed: values[2],
            test_total: values[3],
            validate_processed: values[4],
            validate_total: values[5],
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        persist::encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(GridError::checkpoint(format!(
                "dataset header is {} bytes, expected {}",
                bytes.len(),
                Self::ENCODED_LEN
            )));
        }
        persist::decode(bytes)
    }
}

/// Write the dataset progress counters. A no-op on every rank but 0.
pub fn save_dataset_progress(header: &DatasetHeader, store: &mut dyn PersistStore) -> Result<()> {
    if store.rank() != 0 {
        return Ok(());
    }
    for (key, value) in DATASET_PROGRESS_KEYS.iter().zip(header.values()) {
        store.write_u64(PersistKind::Train, key, value)?;
    }
    log::info!("Saved dataset progress: {:?}", header);
    Ok(())
}

fn read_dataset_header(store: &dyn PersistStore) -> Result<DatasetHeader> {
    let mut values = [0; 6];
    for (slot, key) in values.iter_mut().zip(DATASET_PROGRESS_KEYS) {
        *slot = store.read_u64(PersistKind::Train, key)?;
        log::debug!("Read {} = {}", key, slot);
    }
    Ok(DatasetHeader::from_values(values))
}

/// Read the dataset progress counters on rank 0 and broadcast them within
/// the model. Every rank of the model must call this.
pub fn load_dataset_progress(
    store: &dyn PersistStore,
    comm: &dyn Communicator,
) -> Result<DatasetHeader> {
    let topology = comm.topology();
    // A mismatched store still joins the broadcast so its peers are not left
    // waiting, then fails.
    let mismatched = store.rank() != topology.rank_in_model();

    // An empty payload tells the other ranks that rank 0 failed to read.
    let mut failure = None;
    let payload = if topology.am_model_master() && !mismatched {
        match read_dataset_header(store).and_then(|header| header.to_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                failure = Some(e);
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let bytes = comm.broadcast_bytes(CommScope::Model, 0, &payload)?;
    if mismatched {
        return Err(GridError::checkpoint(format!(
            "store rank {} does not match {}",
            store.rank(),
            topology
        )));
    }
    if let Some(e) = failure {
        return Err(e);
    }
    if bytes.is_empty() {
        return Err(GridError::checkpoint(format!(
            "rank 0 of model {} could not read the dataset header",
            topology.model_id()
        )));
    }

    let header = DatasetHeader::from_bytes(&bytes)?;
    log::debug!("Restored dataset progress on {}: {:?}", topology, header);
    Ok(header)
}

/// Key of a layer's learning rate.
pub fn learning_rate_key(index: LayerIndex) -> String {
    format!("L{}_learning_rate", index)
}

/// Key of a layer's accumulator matrix; `name` is the optimizer name.
pub fn matrix_key(index: LayerIndex, name: &str, rows: usize, cols: usize) -> String {
    format!("L{}_{}_{}x{}", index, name, rows, cols)
}

/// Write a layer's optimizer state.
///
/// Only rank 0 writes the learning rate; every rank passes through the
/// matrix writes.
pub fn save_optimizer_state(
    store: &mut dyn PersistStore,
    index: LayerIndex,
    learning_rate: f32,
    accumulators: &[(&str, &Array2<f32>)],
) -> Result<()> {
    if store.rank() == 0 {
        store.write_f32(PersistKind::Train, &learning_rate_key(index), learning_rate)?;
    }
    for (name, matrix) in accumulators {
        let key = matrix_key(index, name, matrix.nrows(), matrix.ncols());
        store.write_matrix(PersistKind::Train, &key, matrix)?;
    }
    Ok(())
}

/// Read a layer's learning rate on the world master and broadcast it to every
/// rank. Every rank of every model must call this; only the world master's
/// store is read.
pub fn restore_learning_rate(
    store: &dyn PersistStore,
    comm: &dyn Communicator,
    index: LayerIndex,
) -> Result<f32> {
    let key = learning_rate_key(index);
    let read = comm
        .am_world_master()
        .then(|| store.read_f32(PersistKind::Train, &key));
    let payload = match &read {
        Some(Ok(value)) => value.to_le_bytes().to_vec(),
        _ => Vec::new(),
    };

    let bytes = comm.broadcast_bytes(CommScope::World, 0, &payload)?;
    if let Some(Err(e)) = read {
        return Err(e);
    }
    let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
        GridError::checkpoint(format!("world master could not read {}", key))
    })?;
    Ok(f32::from_le_bytes(raw))
}

/// Overwrite `live` with the stored accumulator of the same shape.
///
/// A stored matrix of this layer and optimizer with any other shape is a
/// `DimensionMismatchOnRestore`; nothing is resized or truncated.
pub fn restore_matrix(
    store: &dyn PersistStore,
    index: LayerIndex,
    name: &str,
    live: &mut Array2<f32>,
) -> Result<()> {
    let (rows, cols) = live.dim();
    let expected = format!("{}x{}", rows, cols);
    let file = matrix_file_name(&matrix_key(index, name, rows, cols));

    if !store.contains(PersistKind::Train, &file) {
        let prefix = format!("L{}_{}_", index, name);
        let suffix = format!(".{}", MATRIX_FILE_EXTENSION);
        let other = store.list(PersistKind::Train)?.into_iter().find_map(|key| {
            key.strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix))
                .map(str::to_string)
        });
        return Err(match other {
            Some(stored) => GridError::restore_mismatch(index, file, expected, stored),
            None => GridError::missing_entry(PersistKind::Train.as_str(), file),
        });
    }

    let stored = store.read_matrix(PersistKind::Train, &file)?;
    if stored.dim() != live.dim() {
        let actual = format!("{}x{}", stored.nrows(), stored.ncols());
        return Err(GridError::restore_mismatch(index, file, expected, actual));
    }
    live.assign(&stored);
    log::debug!("Restored {} for layer {}", name, index);
    Ok(())
}

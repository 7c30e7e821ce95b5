//! Checkpoint store held in memory and shared between rank threads.

use crate::core::error::{GridError, Result};
use crate::core::types::PersistKind;
use crate::io::persist::{self, matrix_file_name, MatrixBlob, PersistStore};
use ndarray::Array2;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type Entries = HashMap<(PersistKind, String), Vec<u8>>;

/// In-memory [`PersistStore`].
///
/// Every view created with [`MemoryPersist::view`] shares the same entries.
/// As on disk, only rank 0 writes; writes from other ranks are dropped.
#[derive(Debug, Clone)]
pub struct MemoryPersist {
    rank: usize,
    entries: Arc<Mutex<Entries>>,
}

impl MemoryPersist {
    /// Empty store seen from `rank`.
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Another rank's view of the same entries.
    pub fn view(&self, rank: usize) -> Self {
        Self {
            rank,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Number of stored entries across all namespaces.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn put(&self, kind: PersistKind, key: String, bytes: Vec<u8>) {
        if self.rank != 0 {
            log::trace!("Rank {} skips write of {}/{}", self.rank, kind, key);
            return;
        }
        self.entries.lock().insert((kind, key), bytes);
    }

    fn get(&self, kind: PersistKind, key: &str) -> Result<Vec<u8>> {
        self.entries
            .lock()
            .get(&(kind, key.to_string()))
            .cloned()
            .ok_or_else(|| GridError::missing_entry(kind.as_str(), key))
    }
}

impl PersistStore for MemoryPersist {
    fn rank(&self) -> usize {
        self.rank
    }

    fn write_u64(&mut self, kind: PersistKind, key: &str, value: u64) -> Result<()> {
        self.put(kind, key.to_string(), value.to_le_bytes().to_vec());
        Ok(())
    }

    fn read_u64(&self, kind: PersistKind, key: &str) -> Result<u64> {
        persist::decode_u64(kind, key, &self.get(kind, key)?)
    }

    fn write_f32(&mut self, kind: PersistKind, key: &str, value: f32) -> Result<()> {
        self.put(kind, key.to_string(), value.to_le_bytes().to_vec());
        Ok(())
    }

    fn read_f32(&self, kind: PersistKind, key: &str) -> Result<f32> {
        persist::decode_f32(kind, key, &self.get(kind, key)?)
    }

    fn write_matrix(&mut self, kind: PersistKind, name: &str, matrix: &Array2<f32>) -> Result<()> {
        let bytes = persist::encode(&MatrixBlob::from_matrix(matrix))?;
        self.put(kind, matrix_file_name(name), bytes);
        Ok(())
    }

    fn read_matrix(&self, kind: PersistKind, name: &str) -> Result<Array2<f32>> {
        let blob: MatrixBlob = persist::decode(&self.get(kind, name)?)?;
        blob.into_matrix()
    }

    fn contains(&self, kind: PersistKind, key: &str) -> bool {
        self.entries.lock().contains_key(&(kind, key.to_string()))
    }

    fn list(&self, kind: PersistKind) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views_share_entries() {
        let mut root = MemoryPersist::new(0);
        let worker = root.view(1);
        root.write_u64(PersistKind::Train, "steps", 12).unwrap();
        assert_eq!(worker.read_u64(PersistKind::Train, "steps").unwrap(), 12);
    }

    #[test]
    fn test_non_root_writes_are_dropped() {
        let root = MemoryPersist::new(0);
        let mut worker = root.view(3);
        worker.write_f32(PersistKind::Train, "lr", 0.5).unwrap();
        worker
            .write_matrix(PersistKind::Train, "m", &Array2::zeros((1, 1)))
            .unwrap();
        assert!(root.is_empty());
    }

    #[test]
    fn test_missing_entry() {
        let store = MemoryPersist::new(0);
        let err = store.read_u64(PersistKind::Train, "absent").unwrap_err();
        assert!(matches!(err, GridError::MissingCheckpointEntry { .. }));
    }

    #[test]
    fn test_matrix_names_and_namespaces() {
        let mut store = MemoryPersist::new(0);
        let matrix = Array2::from_elem((2, 2), 1.5f32);
        store.write_matrix(PersistKind::Train, "L1_rmsprop_2x2", &matrix).unwrap();
        store.write_u64(PersistKind::Model, "epoch", 3).unwrap();

        assert!(store.contains(PersistKind::Train, "L1_rmsprop_2x2.bin"));
        assert!(!store.contains(PersistKind::Train, "L1_rmsprop_2x2"));
        assert_eq!(
            store.read_matrix(PersistKind::Train, "L1_rmsprop_2x2.bin").unwrap(),
            matrix
        );
        assert_eq!(store.list(PersistKind::Train).unwrap(), vec!["L1_rmsprop_2x2.bin"]);
        assert_eq!(store.list(PersistKind::Model).unwrap(), vec!["epoch"]);
    }
}

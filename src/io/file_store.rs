//! Checkpoint store on a shared file system.
//!
//! Layout of one model's checkpoint:
//!
//! ```text
//! <root>/model<id>/manifest.json
//! <root>/model<id>/train/reader_train_processed
//! <root>/model<id>/train/L0_learning_rate
//! <root>/model<id>/train/L0_rmsprop_10x5.bin
//! ```
//!
//! Scalars are raw little-endian bytes, matrices are bincode `MatrixBlob`s.
//! Only rank 0 of the model touches disk when writing; every rank reads.

use crate::core::constants::{CHECKPOINT_FORMAT_VERSION, MANIFEST_FILE_NAME};
use crate::core::error::{GridError, Result};
use crate::core::network::ProcessTopology;
use crate::core::types::PersistKind;
use crate::io::persist::{self, matrix_file_name, MatrixBlob, PersistStore};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Metadata written next to a model's checkpoint entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub format_version: u32,
    pub num_models: usize,
    pub procs_per_model: usize,
    pub model_id: usize,
    pub created_at: DateTime<Utc>,
}

impl CheckpointManifest {
    fn for_topology(topology: &ProcessTopology) -> Self {
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            num_models: topology.num_models(),
            procs_per_model: topology.procs_per_model(),
            model_id: topology.model_id(),
            created_at: Utc::now(),
        }
    }

    /// True if the checkpoint was written by the same grid layout.
    pub fn matches(&self, topology: &ProcessTopology) -> bool {
        self.num_models == topology.num_models()
            && self.procs_per_model == topology.procs_per_model()
            && self.model_id == topology.model_id()
    }
}

/// File-backed [`PersistStore`] for one rank.
#[derive(Debug, Clone)]
pub struct FilePersist {
    dir: PathBuf,
    rank: usize,
    manifest: Option<CheckpointManifest>,
}

impl FilePersist {
    /// Directory holding the checkpoint of `topology`'s model.
    pub fn model_dir<P: AsRef<Path>>(root: P, topology: &ProcessTopology) -> PathBuf {
        root.as_ref().join(format!("model{}", topology.model_id()))
    }

    /// Start a new checkpoint under `root`.
    ///
    /// Rank 0 of the model creates the directories and writes the manifest.
    /// Other ranks only remember the location.
    pub fn create<P: AsRef<Path>>(root: P, topology: &ProcessTopology) -> Result<Self> {
        let dir = Self::model_dir(root, topology);
        let rank = topology.rank_in_model();
        let mut manifest = None;

        if rank == 0 {
            for kind in [PersistKind::Train, PersistKind::Model] {
                fs::create_dir_all(dir.join(kind.as_str()))?;
            }
            let written = CheckpointManifest::for_topology(topology);
            fs::write(
                dir.join(MANIFEST_FILE_NAME),
                serde_json::to_string_pretty(&written)?,
            )?;
            log::info!("Created checkpoint at {}", dir.display());
            manifest = Some(written);
        }

        Ok(Self {
            dir,
            rank,
            manifest,
        })
    }

    /// Open an existing checkpoint under `root` for restore.
    ///
    /// Restore assumes the grid layout of the save; a different layout is
    /// reported but not reconciled.
    pub fn open<P: AsRef<Path>>(root: P, topology: &ProcessTopology) -> Result<Self> {
        let dir = Self::model_dir(root, topology);
        let path = dir.join(MANIFEST_FILE_NAME);
        let content = fs::read_to_string(&path).map_err(|e| {
            GridError::checkpoint(format!("cannot read {}: {}", path.display(), e))
        })?;
        let manifest: CheckpointManifest = serde_json::from_str(&content)?;

        if manifest.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(GridError::checkpoint(format!(
                "unsupported checkpoint format version {} (expected {})",
                manifest.format_version, CHECKPOINT_FORMAT_VERSION
            )));
        }
        if !manifest.matches(topology) {
            log::warn!(
                "Checkpoint {} was written by {} models x {} ranks (model {}); restoring on {}",
                dir.display(),
                manifest.num_models,
                manifest.procs_per_model,
                manifest.model_id,
                topology
            );
        }

        Ok(Self {
            dir,
            rank: topology.rank_in_model(),
            manifest: Some(manifest),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Manifest written or read by this store, if any.
    pub fn manifest(&self) -> Option<&CheckpointManifest> {
        self.manifest.as_ref()
    }

    fn entry_path(&self, kind: PersistKind, key: &str) -> PathBuf {
        self.dir.join(kind.as_str()).join(key)
    }

    fn write_entry(&self, kind: PersistKind, key: &str, bytes: &[u8]) -> Result<()> {
        if self.rank != 0 {
            log::trace!("Rank {} skips write of {}/{}", self.rank, kind, key);
            return Ok(());
        }
        let path = self.entry_path(kind, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    fn read_entry(&self, kind: PersistKind, key: &str) -> Result<Vec<u8>> {
        match fs::read(self.entry_path(kind, key)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(GridError::missing_entry(kind.as_str(), key))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl PersistStore for FilePersist {
    fn rank(&self) -> usize {
        self.rank
    }

    fn write_u64(&mut self, kind: PersistKind, key: &str, value: u64) -> Result<()> {
        self.write_entry(kind, key, &value.to_le_bytes())
    }

    fn read_u64(&self, kind: PersistKind, key: &str) -> Result<u64> {
        persist::decode_u64(kind, key, &self.read_entry(kind, key)?)
    }

    fn write_f32(&mut self, kind: PersistKind, key: &str, value: f32) -> Result<()> {
        self.write_entry(kind, key, &value.to_le_bytes())
    }

    fn read_f32(&self, kind: PersistKind, key: &str) -> Result<f32> {
        persist::decode_f32(kind, key, &self.read_entry(kind, key)?)
    }

    fn write_matrix(&mut self, kind: PersistKind, name: &str, matrix: &Array2<f32>) -> Result<()> {
        let bytes = persist::encode(&MatrixBlob::from_matrix(matrix))?;
        self.write_entry(kind, &matrix_file_name(name), &bytes)
    }

    fn read_matrix(&self, kind: PersistKind, name: &str) -> Result<Array2<f32>> {
        let blob: MatrixBlob = persist::decode(&self.read_entry(kind, name)?)?;
        blob.into_matrix()
    }

    fn contains(&self, kind: PersistKind, key: &str) -> bool {
        self.entry_path(kind, key).is_file()
    }

    fn list(&self, kind: PersistKind) -> Result<Vec<String>> {
        let dir = self.dir.join(kind.as_str());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                keys.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

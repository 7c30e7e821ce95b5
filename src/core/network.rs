//! # Process grid communication
//!
//! The run is laid out as a two-level grid: `num_models` disjoint models,
//! each replicated across `procs_per_model` ranks. Three collective groups
//! exist over that grid:
//!
//! - the world group (every rank),
//! - one model group per model (the ranks of that model),
//! - the intermodel group (rank 0 of every model).
//!
//! Every collective is a synchronization point: all members of the group
//! must make the matching call or the run stalls. Transports report a
//! rendezvous that cannot complete as `GridError::CollectiveFailure`.

use crate::core::error::{GridError, Result};
use crate::core::types::ModelId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of one rank within the process grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessTopology {
    model_id: ModelId,
    rank_in_model: usize,
    procs_per_model: usize,
    num_models: usize,
}

impl ProcessTopology {
    /// Create a topology entry for one rank.
    pub fn new(
        model_id: ModelId,
        rank_in_model: usize,
        procs_per_model: usize,
        num_models: usize,
    ) -> Result<Self> {
        if num_models == 0 {
            return Err(GridError::invalid_parameter(
                "num_models",
                "0",
                "must be at least 1",
            ));
        }
        if procs_per_model == 0 {
            return Err(GridError::invalid_parameter(
                "procs_per_model",
                "0",
                "must be at least 1",
            ));
        }
        if model_id >= num_models {
            return Err(GridError::invalid_parameter(
                "model_id",
                model_id.to_string(),
                format!("must be less than num_models ({})", num_models),
            ));
        }
        if rank_in_model >= procs_per_model {
            return Err(GridError::invalid_parameter(
                "rank_in_model",
                rank_in_model.to_string(),
                format!("must be less than procs_per_model ({})", procs_per_model),
            ));
        }

        Ok(Self {
            model_id,
            rank_in_model,
            procs_per_model,
            num_models,
        })
    }

    /// Topology of a run with one model on one rank.
    pub fn single() -> Self {
        Self {
            model_id: 0,
            rank_in_model: 0,
            procs_per_model: 1,
            num_models: 1,
        }
    }

    /// Derive the grid position of a world rank.
    pub fn from_world_rank(world_rank: usize, procs_per_model: usize, num_models: usize) -> Result<Self> {
        if procs_per_model == 0 {
            return Err(GridError::invalid_parameter(
                "procs_per_model",
                "0",
                "must be at least 1",
            ));
        }
        Self::new(
            world_rank / procs_per_model,
            world_rank % procs_per_model,
            procs_per_model,
            num_models,
        )
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    pub fn rank_in_model(&self) -> usize {
        self.rank_in_model
    }

    pub fn procs_per_model(&self) -> usize {
        self.procs_per_model
    }

    pub fn num_models(&self) -> usize {
        self.num_models
    }

    /// Global rank; models occupy contiguous blocks of world ranks.
    pub fn world_rank(&self) -> usize {
        self.model_id * self.procs_per_model + self.rank_in_model
    }

    pub fn world_size(&self) -> usize {
        self.num_models * self.procs_per_model
    }

    /// Model 0's rank 0, the sole writer of global reports.
    pub fn am_world_master(&self) -> bool {
        self.world_rank() == 0
    }

    /// Rank 0 of this rank's model.
    pub fn am_model_master(&self) -> bool {
        self.rank_in_model == 0
    }

    /// Number of members in a collective group.
    pub fn group_size(&self, scope: CommScope) -> usize {
        match scope {
            CommScope::World => self.world_size(),
            CommScope::Model => self.procs_per_model,
            CommScope::Intermodel => self.num_models,
        }
    }

    /// This rank's index within a collective group, or `None` if the rank
    /// is not a member (only model masters join the intermodel group).
    pub fn group_index(&self, scope: CommScope) -> Option<usize> {
        match scope {
            CommScope::World => Some(self.world_rank()),
            CommScope::Model => Some(self.rank_in_model),
            CommScope::Intermodel if self.am_model_master() => Some(self.model_id),
            CommScope::Intermodel => None,
        }
    }
}

impl fmt::Display for ProcessTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rank {} (model {}/{}, rank {}/{})",
            self.world_rank(),
            self.model_id,
            self.num_models,
            self.rank_in_model,
            self.procs_per_model
        )
    }
}

/// Collective group a call is scoped to.
///
/// Roots are group indices: a world rank for `World`, a rank within the
/// model for `Model`, a model id for `Intermodel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommScope {
    /// Every rank in the run
    World,
    /// The ranks of the caller's model
    Model,
    /// Rank 0 of every model
    Intermodel,
}

impl fmt::Display for CommScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommScope::World => write!(f, "world"),
            CommScope::Model => write!(f, "model"),
            CommScope::Intermodel => write!(f, "intermodel"),
        }
    }
}

/// Collective transport over the process grid.
///
/// Implementors supply `exchange`, an all-gather of opaque payloads among the
/// members of a group. The typed collectives are built on top of it. Context
/// objects implementing this trait are passed explicitly into every call that
/// communicates, so tests can substitute an in-process grid.
pub trait Communicator: Send {
    /// Grid position of the calling rank.
    fn topology(&self) -> &ProcessTopology;

    /// All-gather `payload` among the members of `scope`.
    ///
    /// Returns one payload per member ordered by group index. `tag` names the
    /// operation; members that rendezvous with different tags fail the round.
    fn exchange(&self, scope: CommScope, tag: &str, payload: Vec<u8>) -> Result<Vec<Vec<u8>>>;

    fn am_world_master(&self) -> bool {
        self.topology().am_world_master()
    }

    fn am_model_master(&self) -> bool {
        self.topology().am_model_master()
    }

    fn num_models(&self) -> usize {
        self.topology().num_models()
    }

    /// Block until every member of `scope` has arrived.
    fn barrier(&self, scope: CommScope) -> Result<()> {
        self.exchange(scope, "barrier", Vec::new()).map(|_| ())
    }

    /// Broadcast `bytes` from `root` to every member of `scope`.
    ///
    /// The payload of non-root members is ignored; every member returns the
    /// root's bytes unchanged.
    fn broadcast_bytes(&self, scope: CommScope, root: usize, bytes: &[u8]) -> Result<Vec<u8>> {
        let size = self.topology().group_size(scope);
        if root >= size {
            return Err(GridError::invalid_parameter(
                "root",
                root.to_string(),
                format!("must be less than the {} group size ({})", scope, size),
            ));
        }
        let index = member_index(self.topology(), scope, "broadcast")?;
        let payload = if index == root { bytes.to_vec() } else { Vec::new() };
        let mut gathered = self.exchange(scope, "broadcast", payload)?;
        if gathered.len() != size {
            return Err(GridError::collective(
                scope.to_string(),
                "broadcast",
                format!("expected {} payloads, received {}", size, gathered.len()),
            ));
        }
        Ok(gathered.swap_remove(root))
    }

    /// Broadcast a scalar from `root`.
    fn broadcast_f32(&self, scope: CommScope, root: usize, value: f32) -> Result<f32> {
        let bytes = self.broadcast_bytes(scope, root, &value.to_le_bytes())?;
        let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
            GridError::collective(
                scope.to_string(),
                "broadcast",
                format!("expected 4 bytes for an f32, received {}", bytes.len()),
            )
        })?;
        Ok(f32::from_le_bytes(raw))
    }

    /// Gather one value per model at the world master.
    ///
    /// Must be called by every model master. Returns the values ordered by
    /// model id on the world master and `None` on the other model masters,
    /// which contribute without receiving.
    fn intermodel_gather_f64(&self, value: f64) -> Result<Option<Vec<f64>>> {
        if !self.am_model_master() {
            return Err(GridError::invalid_parameter(
                "rank_in_model",
                self.topology().rank_in_model().to_string(),
                "intermodel gather is restricted to model masters",
            ));
        }
        let gathered = self.exchange(
            CommScope::Intermodel,
            "intermodel_gather",
            value.to_le_bytes().to_vec(),
        )?;
        if !self.am_world_master() {
            return Ok(None);
        }

        let values = gathered
            .iter()
            .map(|bytes| {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    GridError::collective(
                        "intermodel",
                        "intermodel_gather",
                        format!("expected 8 bytes for an f64, received {}", bytes.len()),
                    )
                })?;
                Ok(f64::from_le_bytes(raw))
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Some(values))
    }
}

fn member_index(topology: &ProcessTopology, scope: CommScope, operation: &str) -> Result<usize> {
    topology.group_index(scope).ok_or_else(|| {
        GridError::collective(
            scope.to_string(),
            operation,
            format!("{} is not a member of the {} group", topology, scope),
        )
    })
}

/// Communicator for a run with one model on one rank.
///
/// Every group has exactly one member, so collectives complete immediately.
#[derive(Debug, Clone)]
pub struct SingleProcess {
    topology: ProcessTopology,
}

impl SingleProcess {
    pub fn new() -> Self {
        Self {
            topology: ProcessTopology::single(),
        }
    }
}

impl Default for SingleProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl Communicator for SingleProcess {
    fn topology(&self) -> &ProcessTopology {
        &self.topology
    }

    fn exchange(&self, _scope: CommScope, _tag: &str, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        Ok(vec![payload])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_ranks() {
        let topo = ProcessTopology::new(2, 1, 4, 3).unwrap();
        assert_eq!(topo.world_rank(), 9);
        assert_eq!(topo.world_size(), 12);
        assert!(!topo.am_world_master());
        assert!(!topo.am_model_master());
        assert_eq!(topo.group_index(CommScope::Model), Some(1));
        assert_eq!(topo.group_index(CommScope::Intermodel), None);

        let master = ProcessTopology::new(2, 0, 4, 3).unwrap();
        assert!(master.am_model_master());
        assert_eq!(master.group_index(CommScope::Intermodel), Some(2));
    }

    #[test]
    fn test_topology_from_world_rank() {
        let topo = ProcessTopology::from_world_rank(5, 2, 3).unwrap();
        assert_eq!(topo.model_id(), 2);
        assert_eq!(topo.rank_in_model(), 1);
        assert_eq!(topo.world_rank(), 5);
    }

    #[test]
    fn test_topology_validation() {
        assert!(ProcessTopology::new(0, 0, 0, 1).is_err());
        assert!(ProcessTopology::new(3, 0, 1, 3).is_err());
        assert!(ProcessTopology::new(0, 2, 2, 1).is_err());
        assert!(ProcessTopology::from_world_rank(6, 2, 3).is_err());
    }

    #[test]
    fn test_single_process_collectives() {
        let comm = SingleProcess::new();
        assert!(comm.am_world_master());
        assert!(comm.am_model_master());
        assert_eq!(comm.num_models(), 1);

        comm.barrier(CommScope::World).unwrap();
        assert_eq!(comm.broadcast_f32(CommScope::World, 0, 0.25).unwrap(), 0.25);
        assert_eq!(
            comm.broadcast_bytes(CommScope::Model, 0, &[1, 2, 3]).unwrap(),
            vec![1, 2, 3]
        );
        assert_eq!(comm.intermodel_gather_f64(0.5).unwrap(), Some(vec![0.5]));
    }

    #[test]
    fn test_broadcast_rejects_out_of_range_root() {
        let comm = SingleProcess::new();
        let err = comm.broadcast_bytes(CommScope::Model, 1, &[0]).unwrap_err();
        assert_eq!(err.category(), "invalid_parameter");
    }
}

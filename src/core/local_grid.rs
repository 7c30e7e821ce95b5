//! In-process process grid.
//!
//! `LocalGrid` builds one [`GridComm`] per rank of a `num_models x
//! procs_per_model` grid. Each rank is meant to run on its own thread; the
//! collective groups are generation-counted rendezvous points shared through
//! `Arc`. With a timeout configured, a rendezvous that does not complete in
//! time breaks its group and every current and future member call fails with
//! `CollectiveFailure`. Without one, a missing peer blocks forever.

use crate::core::error::{GridError, Result};
use crate::core::network::{CommScope, Communicator, ProcessTopology};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
enum RoundOutcome {
    Gathered(Vec<Vec<u8>>),
    Mismatch(String),
}

#[derive(Debug, Default)]
struct RoundState {
    generation: u64,
    arrived: usize,
    tag: Option<String>,
    mismatch: Option<String>,
    slots: Vec<Option<Vec<u8>>>,
    completed: Option<(u64, Arc<RoundOutcome>)>,
    broken: Option<String>,
}

/// One collective group: an all-gather rendezvous reused round after round.
#[derive(Debug)]
struct Rendezvous {
    scope: CommScope,
    size: usize,
    state: Mutex<RoundState>,
    cvar: Condvar,
}

impl Rendezvous {
    fn new(scope: CommScope, size: usize) -> Self {
        Self {
            scope,
            size,
            state: Mutex::new(RoundState {
                slots: vec![None; size],
                ..RoundState::default()
            }),
            cvar: Condvar::new(),
        }
    }

    fn failure<S: Into<String>>(&self, tag: &str, reason: S) -> GridError {
        GridError::collective(self.scope.to_string(), tag, reason)
    }

    fn exchange(
        &self,
        index: usize,
        tag: &str,
        payload: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Vec<u8>>> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.broken {
            return Err(self.failure(tag, format!("group is broken: {}", reason)));
        }

        let generation = state.generation;
        match state.tag.clone() {
            None => state.tag = Some(tag.to_string()),
            Some(expected) => {
                if expected != tag && state.mismatch.is_none() {
                    state.mismatch = Some(format!(
                        "member {} called `{}` while the round started with `{}`",
                        index, tag, expected
                    ));
                }
            }
        }
        if state.slots[index].is_some() && state.mismatch.is_none() {
            state.mismatch = Some(format!("member {} joined the same round twice", index));
        }
        state.slots[index] = Some(payload);
        state.arrived += 1;

        if state.arrived == self.size {
            let outcome = match state.mismatch.take() {
                Some(reason) => RoundOutcome::Mismatch(reason),
                None => RoundOutcome::Gathered(
                    state
                        .slots
                        .iter_mut()
                        .map(|slot| slot.take().unwrap_or_default())
                        .collect(),
                ),
            };
            let outcome = Arc::new(outcome);
            for slot in state.slots.iter_mut() {
                *slot = None;
            }
            state.completed = Some((generation, Arc::clone(&outcome)));
            state.generation = generation.wrapping_add(1);
            state.arrived = 0;
            state.tag = None;
            self.cvar.notify_all();
            return self.finish(&outcome, tag);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if state.generation != generation {
                break;
            }
            if let Some(reason) = &state.broken {
                return Err(self.failure(tag, format!("group is broken: {}", reason)));
            }
            match deadline {
                Some(deadline) => {
                    let timed_out = self.cvar.wait_until(&mut state, deadline).timed_out();
                    if timed_out && state.generation == generation {
                        let reason = format!(
                            "timed out after {:?} with {} of {} members arrived",
                            timeout.unwrap_or_default(),
                            state.arrived,
                            self.size
                        );
                        log::error!("{} collective `{}` {}", self.scope, tag, reason);
                        state.broken = Some(reason.clone());
                        self.cvar.notify_all();
                        return Err(self.failure(tag, reason));
                    }
                }
                None => self.cvar.wait(&mut state),
            }
        }

        let outcome = match &state.completed {
            Some((done, outcome)) if *done == generation => Some(Arc::clone(outcome)),
            _ => None,
        };
        drop(state);
        match outcome {
            Some(outcome) => self.finish(&outcome, tag),
            None => Err(self.failure(tag, "round result was lost")),
        }
    }

    fn finish(&self, outcome: &RoundOutcome, tag: &str) -> Result<Vec<Vec<u8>>> {
        match outcome {
            RoundOutcome::Gathered(payloads) => Ok(payloads.clone()),
            RoundOutcome::Mismatch(reason) => {
                Err(self.failure(tag, format!("mismatched participation: {}", reason)))
            }
        }
    }
}

/// Communicator handle for one rank of a [`LocalGrid`].
#[derive(Debug)]
pub struct GridComm {
    topology: ProcessTopology,
    world: Arc<Rendezvous>,
    model: Arc<Rendezvous>,
    intermodel: Option<Arc<Rendezvous>>,
    timeout: Option<Duration>,
}

impl Communicator for GridComm {
    fn topology(&self) -> &ProcessTopology {
        &self.topology
    }

    fn exchange(&self, scope: CommScope, tag: &str, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        let group = match scope {
            CommScope::World => &self.world,
            CommScope::Model => &self.model,
            CommScope::Intermodel => self.intermodel.as_ref().ok_or_else(|| {
                GridError::collective(
                    "intermodel",
                    tag,
                    format!("{} is not a model master", self.topology),
                )
            })?,
        };
        let index = self.topology.group_index(scope).ok_or_else(|| {
            GridError::collective(scope.to_string(), tag, "caller is not a group member")
        })?;
        group.exchange(index, tag, payload, self.timeout)
    }
}

/// A process grid whose ranks are threads of the current process.
#[derive(Debug)]
pub struct LocalGrid {
    comms: Vec<GridComm>,
}

impl LocalGrid {
    /// Build the communicators of a `num_models x procs_per_model` grid,
    /// ordered by world rank.
    pub fn new(num_models: usize, procs_per_model: usize, timeout: Option<Duration>) -> Result<Self> {
        let world_size = num_models * procs_per_model;
        if world_size == 0 {
            return Err(GridError::invalid_parameter(
                "world_size",
                world_size.to_string(),
                "grid needs at least one model with one rank",
            ));
        }

        let world = Arc::new(Rendezvous::new(CommScope::World, world_size));
        let intermodel = Arc::new(Rendezvous::new(CommScope::Intermodel, num_models));
        let mut comms = Vec::with_capacity(world_size);
        for model_id in 0..num_models {
            let model = Arc::new(Rendezvous::new(CommScope::Model, procs_per_model));
            for rank_in_model in 0..procs_per_model {
                let topology =
                    ProcessTopology::new(model_id, rank_in_model, procs_per_model, num_models)?;
                comms.push(GridComm {
                    topology,
                    world: Arc::clone(&world),
                    model: Arc::clone(&model),
                    intermodel: topology.am_model_master().then(|| Arc::clone(&intermodel)),
                    timeout,
                });
            }
        }

        log::debug!(
            "Created local grid with {} models x {} ranks",
            num_models,
            procs_per_model
        );
        Ok(Self { comms })
    }

    pub fn len(&self) -> usize {
        self.comms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comms.is_empty()
    }

    /// Hand out the per-rank communicators.
    pub fn into_communicators(self) -> Vec<GridComm> {
        self.comms
    }

    /// Run `f` once per rank on its own thread and collect the results in
    /// world-rank order.
    pub fn run<T, F>(self, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(GridComm) -> T + Sync,
    {
        let f = &f;
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .comms
                .into_iter()
                .map(|comm| scope.spawn(move || f(comm)))
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle
                        .join()
                        .map_err(|_| GridError::internal(format!("rank {} panicked", rank)))
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_broadcast() {
        let grid = LocalGrid::new(2, 2, Some(Duration::from_secs(5))).unwrap();
        let values = grid
            .run(|comm| {
                let mine = if comm.am_world_master() { 0.75 } else { -1.0 };
                comm.broadcast_f32(CommScope::World, 0, mine).unwrap()
            })
            .unwrap();
        assert_eq!(values, vec![0.75; 4]);
    }

    #[test]
    fn test_model_broadcast_stays_within_model() {
        let grid = LocalGrid::new(3, 2, Some(Duration::from_secs(5))).unwrap();
        let values = grid
            .run(|comm| {
                let topo = *comm.topology();
                let payload = vec![topo.model_id() as u8; 3];
                comm.broadcast_bytes(CommScope::Model, 0, &payload).unwrap()
            })
            .unwrap();
        assert_eq!(values[0], vec![0, 0, 0]);
        assert_eq!(values[1], vec![0, 0, 0]);
        assert_eq!(values[2], vec![1, 1, 1]);
        assert_eq!(values[5], vec![2, 2, 2]);
    }

    #[test]
    fn test_intermodel_gather_orders_by_model() {
        let grid = LocalGrid::new(3, 2, Some(Duration::from_secs(5))).unwrap();
        let results = grid
            .run(|comm| {
                if !comm.am_model_master() {
                    return None;
                }
                let value = comm.topology().model_id() as f64 + 0.5;
                comm.intermodel_gather_f64(value).unwrap()
            })
            .unwrap();
        assert_eq!(results[0], Some(vec![0.5, 1.5, 2.5]));
        assert!(results[1..].iter().all(Option::is_none));
    }

    #[test]
    fn test_repeated_rounds() {
        let grid = LocalGrid::new(1, 4, Some(Duration::from_secs(5))).unwrap();
        let sums = grid
            .run(|comm| {
                let mut total = 0.0f32;
                for round in 0..50 {
                    comm.barrier(CommScope::Model).unwrap();
                    let root = round % 4;
                    total += comm
                        .broadcast_f32(CommScope::Model, root, round as f32)
                        .unwrap();
                }
                total
            })
            .unwrap();
        assert!(sums.iter().all(|s| *s == sums[0]));
    }

    #[test]
    fn test_mismatched_operations_fail() {
        let grid = LocalGrid::new(1, 2, Some(Duration::from_secs(5))).unwrap();
        let results = grid
            .run(|comm| {
                if comm.topology().rank_in_model() == 0 {
                    comm.barrier(CommScope::Model)
                } else {
                    comm.broadcast_bytes(CommScope::Model, 0, &[]).map(|_| ())
                }
            })
            .unwrap();
        for result in results {
            let err = result.unwrap_err();
            assert_eq!(err.category(), "collective_failure");
        }
    }

    #[test]
    fn test_missing_peer_times_out() {
        let grid = LocalGrid::new(1, 2, Some(Duration::from_millis(50))).unwrap();
        let results = grid
            .run(|comm| {
                if comm.topology().rank_in_model() == 0 {
                    comm.barrier(CommScope::Model)
                } else {
                    Ok(())
                }
            })
            .unwrap();
        assert!(matches!(
            results[0],
            Err(GridError::CollectiveFailure { .. })
        ));
        assert!(results[1].is_ok());
    }

    #[test]
    fn test_non_master_cannot_join_intermodel() {
        let mut comms = LocalGrid::new(1, 2, None).unwrap().into_communicators();
        let worker = comms.pop().unwrap();
        assert!(worker.exchange(CommScope::Intermodel, "gather", vec![]).is_err());
        assert!(worker.intermodel_gather_f64(1.0).is_err());
    }
}

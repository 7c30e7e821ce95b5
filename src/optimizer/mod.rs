//! Optimizers and their checkpoint contract.
//!
//! Update rules are pluggable; what every optimizer shares is how its state
//! persists. The learning rate is a scalar written by rank 0 and broadcast
//! from world rank 0 on restore. Accumulator matrices are keyed by layer
//! index, optimizer name and exact shape.

pub mod rmsprop;
pub mod sgd;

pub use rmsprop::RmsProp;
pub use sgd::Sgd;

use crate::config::OptimizerConfig;
use crate::core::error::{GridError, Result};
use crate::core::network::{Communicator, ProcessTopology};
use crate::core::types::{LayerIndex, OptimizerKind};
use crate::io::checkpoint;
use crate::io::PersistStore;
use ndarray::Array2;

/// Weight update strategy for one layer.
pub trait Optimizer: Send {
    /// Name used in checkpoint keys
    fn name(&self) -> &'static str;

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, learning_rate: f32);

    /// Allocate zeroed state for a `num_neurons x input_dim` weight matrix.
    fn setup(&mut self, input_dim: usize, num_neurons: usize);

    /// Apply one gradient step to `weights`.
    fn update(&mut self, gradient: &Array2<f32>, weights: &mut Array2<f32>) -> Result<()>;

    /// Named accumulator matrices that persist across restarts.
    fn accumulators(&self) -> Vec<(&'static str, &Array2<f32>)>;

    fn accumulators_mut(&mut self) -> Vec<(&'static str, &mut Array2<f32>)>;

    /// Write this layer's optimizer state.
    fn save_to_checkpoint_shared(&self, store: &mut dyn PersistStore, index: LayerIndex) -> Result<()> {
        checkpoint::save_optimizer_state(store, index, self.learning_rate(), &self.accumulators())
    }

    /// Restore this layer's optimizer state. Every rank must call this.
    fn load_from_checkpoint_shared(
        &mut self,
        store: &dyn PersistStore,
        comm: &dyn Communicator,
        index: LayerIndex,
    ) -> Result<()> {
        let learning_rate = checkpoint::restore_learning_rate(store, comm, index)?;
        self.set_learning_rate(learning_rate);
        for (name, matrix) in self.accumulators_mut() {
            checkpoint::restore_matrix(store, index, name, matrix)?;
        }
        Ok(())
    }
}

pub(crate) fn check_shapes(
    optimizer: &str,
    expected: (usize, usize),
    gradient: &Array2<f32>,
    weights: &Array2<f32>,
) -> Result<()> {
    for (what, dim) in [("gradient", gradient.dim()), ("weights", weights.dim())] {
        if dim != expected {
            return Err(GridError::invalid_parameter(
                what,
                format!("{}x{}", dim.0, dim.1),
                format!(
                    "{} expects a {}x{} matrix",
                    optimizer, expected.0, expected.1
                ),
            ));
        }
    }
    Ok(())
}

/// Build the optimizer selected by `config`.
pub fn create_optimizer(
    config: &OptimizerConfig,
    topology: &ProcessTopology,
) -> Result<Box<dyn Optimizer>> {
    config.validate()?;
    let verbose = topology.am_model_master();
    Ok(match config.kind {
        OptimizerKind::Sgd => Box::new(Sgd::new(config.learning_rate, verbose)),
        OptimizerKind::RmsProp => Box::new(RmsProp::new(
            config.learning_rate,
            config.rho,
            config.epsilon,
            verbose,
        )),
    })
}

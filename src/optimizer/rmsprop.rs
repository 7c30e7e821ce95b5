//! RMSprop: gradient descent scaled by a running average of squared gradients.
//!
//! ```text
//! cache = rho * cache + (1 - rho) * g^2
//! w    -= lr * g / sqrt(cache + epsilon)
//! ```

use crate::core::error::Result;
use crate::core::types::OptimizerKind;
use crate::optimizer::{check_shapes, Optimizer};
use ndarray::{Array2, Zip};

#[derive(Debug, Clone)]
pub struct RmsProp {
    learning_rate: f32,
    rho: f32,
    epsilon: f32,
    cache: Array2<f32>,
    verbose: bool,
}

impl RmsProp {
    /// `verbose` enables setup logging; set it on model masters only.
    pub fn new(learning_rate: f32, rho: f32, epsilon: f32, verbose: bool) -> Self {
        if verbose {
            log::info!(
                "Initializing RMSprop optimizer with lr={}, rho={}, and epsilon={}",
                learning_rate,
                rho,
                epsilon
            );
        }
        Self {
            learning_rate,
            rho,
            epsilon,
            cache: Array2::zeros((0, 0)),
            verbose,
        }
    }

    pub fn rho(&self) -> f32 {
        self.rho
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Running average of squared gradients.
    pub fn cache(&self) -> &Array2<f32> {
        &self.cache
    }
}

impl Optimizer for RmsProp {
    fn name(&self) -> &'static str {
        OptimizerKind::RmsProp.key_name()
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    fn setup(&mut self, input_dim: usize, num_neurons: usize) {
        if self.verbose {
            log::info!(
                "Setting up RMSprop optimizer with cache size {} x {}",
                num_neurons,
                input_dim
            );
        }
        self.cache = Array2::zeros((num_neurons, input_dim));
    }

    fn update(&mut self, gradient: &Array2<f32>, weights: &mut Array2<f32>) -> Result<()> {
        check_shapes(self.name(), self.cache.dim(), gradient, weights)?;

        let (lr, rho, epsilon) = (self.learning_rate, self.rho, self.epsilon);
        Zip::from(&mut self.cache)
            .and(gradient)
            .and(weights)
            .for_each(|cache, &g, w| {
                *cache = rho * *cache + (1.0 - rho) * g * g;
                *w -= lr * g / (*cache + epsilon).sqrt();
            });
        Ok(())
    }

    fn accumulators(&self) -> Vec<(&'static str, &Array2<f32>)> {
        vec![(self.name(), &self.cache)]
    }

    fn accumulators_mut(&mut self) -> Vec<(&'static str, &mut Array2<f32>)> {
        vec![(OptimizerKind::RmsProp.key_name(), &mut self.cache)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GridError;
    use crate::core::network::SingleProcess;
    use crate::core::types::PersistKind;
    use crate::io::{MemoryPersist, PersistStore};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_setup_zeroes_cache() {
        let mut opt = RmsProp::new(0.001, 0.9, 1e-6, false);
        opt.setup(5, 10);
        assert_eq!(opt.cache().dim(), (10, 5));
        assert!(opt.cache().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_update_rule() {
        let mut opt = RmsProp::new(0.1, 0.9, 1e-6, false);
        opt.setup(1, 1);
        let mut weights = Array2::from_elem((1, 1), 1.0f32);
        let gradient = Array2::from_elem((1, 1), 2.0f32);
        opt.update(&gradient, &mut weights).unwrap();

        // cache = 0.1 * 4 = 0.4; step = 0.1 * 2 / sqrt(0.4 + 1e-6)
        assert_abs_diff_eq!(opt.cache()[[0, 0]], 0.4, epsilon = 1e-6);
        let expected = 1.0 - 0.2 / (0.4f32 + 1e-6).sqrt();
        assert_abs_diff_eq!(weights[[0, 0]], expected, epsilon = 1e-5);
    }

    #[test]
    fn test_update_rejects_wrong_shape() {
        let mut opt = RmsProp::new(0.1, 0.9, 1e-6, false);
        opt.setup(3, 2);
        let mut weights = Array2::zeros((2, 3));
        let gradient = Array2::zeros((3, 2));
        assert!(matches!(
            opt.update(&gradient, &mut weights),
            Err(GridError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let mut store = MemoryPersist::new(0);
        let mut opt = RmsProp::new(0.01, 0.9, 1e-6, false);
        opt.setup(3, 2);
        let mut weights = Array2::zeros((2, 3));
        let gradient = Array2::from_shape_fn((2, 3), |(r, c)| (r + c) as f32);
        opt.update(&gradient, &mut weights).unwrap();
        opt.set_learning_rate(0.005);
        opt.save_to_checkpoint_shared(&mut store, 1).unwrap();
        assert!(store.contains(PersistKind::Train, "L1_rmsprop_2x3.bin"));

        let mut restored = RmsProp::new(0.01, 0.9, 1e-6, false);
        restored.setup(3, 2);
        restored
            .load_from_checkpoint_shared(&store, &SingleProcess::new(), 1)
            .unwrap();
        assert_eq!(restored.learning_rate(), 0.005);
        assert_eq!(restored.cache(), opt.cache());
    }

    #[test]
    fn test_restore_into_different_layer_shape_fails() {
        let mut store = MemoryPersist::new(0);
        let mut opt = RmsProp::new(0.01, 0.9, 1e-6, false);
        opt.setup(3, 2);
        opt.save_to_checkpoint_shared(&mut store, 0).unwrap();

        let mut wider = RmsProp::new(0.01, 0.9, 1e-6, false);
        wider.setup(4, 2);
        let err = wider
            .load_from_checkpoint_shared(&store, &SingleProcess::new(), 0)
            .unwrap_err();
        assert!(matches!(err, GridError::DimensionMismatchOnRestore { layer: 0, .. }));
    }
}

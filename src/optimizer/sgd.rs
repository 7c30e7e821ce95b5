//! Plain stochastic gradient descent.

use crate::core::error::Result;
use crate::core::types::OptimizerKind;
use crate::optimizer::{check_shapes, Optimizer};
use ndarray::Array2;

/// `w -= lr * g`. Only the learning rate persists.
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f32,
    shape: Option<(usize, usize)>,
}

impl Sgd {
    pub fn new(learning_rate: f32, verbose: bool) -> Self {
        if verbose {
            log::info!("Initializing SGD optimizer with lr={}", learning_rate);
        }
        Self {
            learning_rate,
            shape: None,
        }
    }
}

impl Optimizer for Sgd {
    fn name(&self) -> &'static str {
        OptimizerKind::Sgd.key_name()
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    fn setup(&mut self, input_dim: usize, num_neurons: usize) {
        self.shape = Some((num_neurons, input_dim));
    }

    fn update(&mut self, gradient: &Array2<f32>, weights: &mut Array2<f32>) -> Result<()> {
        let expected = self.shape.unwrap_or_else(|| weights.dim());
        check_shapes(self.name(), expected, gradient, weights)?;
        weights.scaled_add(-self.learning_rate, gradient);
        Ok(())
    }

    fn accumulators(&self) -> Vec<(&'static str, &Array2<f32>)> {
        Vec::new()
    }

    fn accumulators_mut(&mut self) -> Vec<(&'static str, &mut Array2<f32>)> {
        Vec::new()
    }
}

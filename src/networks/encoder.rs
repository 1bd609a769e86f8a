//! Dense Stack
//!
//! A configurable chain of ReLU dense layers, the building block of each
//! input track of the actor and critic.

use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

/// Dense stack configuration
#[derive(Config, Debug)]
pub struct DenseStackConfig {
    /// Width of the incoming features
    pub input_dim: usize,
    /// Hidden widths, in order; empty passes the input through
    pub layers: Vec<usize>,
}

/// ReLU multilayer perceptron
#[derive(Module, Debug)]
pub struct DenseStack<B: Backend> {
    layers: Vec<Linear<B>>,
    activation: Relu,
}

impl DenseStackConfig {
    /// Width of the stack's output features
    pub fn output_dim(&self) -> usize {
        self.layers.last().copied().unwrap_or(self.input_dim)
    }

    /// Initialize the stack
    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseStack<B> {
        let mut layers = Vec::with_capacity(self.layers.len());
        let mut width = self.input_dim;
        for &hidden in &self.layers {
            layers.push(LinearConfig::new(width, hidden).init(device));
            width = hidden;
        }

        DenseStack {
            layers,
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> DenseStack<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.layers
            .iter()
            .fold(x, |x, layer| self.activation.forward(layer.forward(x)))
    }
}

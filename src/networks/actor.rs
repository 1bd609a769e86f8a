//! Actor Network (Policy)
//!
//! Two input tracks, the price window and the utility features, each run
//! through its own dense stack. The tracks are concatenated, passed through
//! a combined stack and a softmax head over the two logits.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::softmax;

use super::encoder::{DenseStack, DenseStackConfig};
use crate::core::{ACTION_DIM, UTILITY_FEATURES};

/// Actor network configuration
#[derive(Config, Debug)]
pub struct ActorConfig {
    /// Length of the price window track
    pub series_len: usize,
    pub series_layers: Vec<usize>,
    pub utility_layers: Vec<usize>,
    pub combined_layers: Vec<usize>,
    #[config(default = "UTILITY_FEATURES")]
    pub utility_dim: usize,
}

/// Policy network producing a probability vector over the two logits
#[derive(Module, Debug)]
pub struct Actor<B: Backend> {
    series: DenseStack<B>,
    utility: DenseStack<B>,
    combined: DenseStack<B>,
    head: Linear<B>,
}

impl ActorConfig {
    /// Initialize actor network
    pub fn init<B: Backend>(&self, device: &B::Device) -> Actor<B> {
        let series = DenseStackConfig::new(self.series_len, self.series_layers.clone());
        let utility = DenseStackConfig::new(self.utility_dim, self.utility_layers.clone());
        let combined = DenseStackConfig::new(
            series.output_dim() + utility.output_dim(),
            self.combined_layers.clone(),
        );
        let head = LinearConfig::new(combined.output_dim(), ACTION_DIM).init(device);

        Actor {
            series: series.init(device),
            utility: utility.init(device),
            combined: combined.init(device),
            head,
        }
    }
}

impl<B: Backend> Actor<B> {
    /// Forward pass returning `[batch, ACTION_DIM]` probabilities
    pub fn forward(&self, series: Tensor<B, 2>, utility: Tensor<B, 2>) -> Tensor<B, 2> {
        let series = self.series.forward(series);
        let utility = self.utility.forward(utility);
        let features = self.combined.forward(Tensor::cat(vec![series, utility], 1));
        softmax(self.head.forward(features), 1)
    }
}

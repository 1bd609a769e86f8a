//! Critic Network (Q-function)
//!
//! The state passes through the same two-track layout as the actor; the
//! action gets its own small stack. Both are concatenated and reduced to a
//! single Q value.

use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;

use super::encoder::{DenseStack, DenseStackConfig};
use crate::core::{ACTION_DIM, UTILITY_FEATURES};

/// Half-width of the uniform initializer of the Q head
pub const Q_HEAD_INIT: f64 = 0.003;

/// Critic network configuration
#[derive(Config, Debug)]
pub struct CriticConfig {
    /// Length of the price window track
    pub series_len: usize,
    pub series_layers: Vec<usize>,
    pub utility_layers: Vec<usize>,
    pub combined_layers: Vec<usize>,
    pub action_layers: Vec<usize>,
    pub final_layers: Vec<usize>,
    #[config(default = "UTILITY_FEATURES")]
    pub utility_dim: usize,
}

/// Q-Critic
///
/// Estimates the expected return of a state and an action probability vector.
#[derive(Module, Debug)]
pub struct Critic<B: Backend> {
    series: DenseStack<B>,
    utility: DenseStack<B>,
    combined: DenseStack<B>,
    action: DenseStack<B>,
    head: DenseStack<B>,
    q_head: Linear<B>,
}

impl CriticConfig {
    /// Initialize critic network
    pub fn init<B: Backend>(&self, device: &B::Device) -> Critic<B> {
        let series = DenseStackConfig::new(self.series_len, self.series_layers.clone());
        let utility = DenseStackConfig::new(self.utility_dim, self.utility_layers.clone());
        let combined = DenseStackConfig::new(
            series.output_dim() + utility.output_dim(),
            self.combined_layers.clone(),
        );
        let action = DenseStackConfig::new(ACTION_DIM, self.action_layers.clone());
        let head = DenseStackConfig::new(
            combined.output_dim() + action.output_dim(),
            self.final_layers.clone(),
        );
        let q_head = LinearConfig::new(head.output_dim(), 1)
            .with_initializer(Initializer::Uniform {
                min: -Q_HEAD_INIT,
                max: Q_HEAD_INIT,
            })
            .init(device);

        Critic {
            series: series.init(device),
            utility: utility.init(device),
            combined: combined.init(device),
            action: action.init(device),
            head: head.init(device),
            q_head,
        }
    }
}

impl<B: Backend> Critic<B> {
    /// Forward pass returning `[batch, 1]` Q values
    pub fn forward(
        &self,
        series: Tensor<B, 2>,
        utility: Tensor<B, 2>,
        action: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let series = self.series.forward(series);
        let utility = self.utility.forward(utility);
        let state = self.combined.forward(Tensor::cat(vec![series, utility], 1));
        let action = self.action.forward(action);
        let features = self.head.forward(Tensor::cat(vec![state, action], 1));
        self.q_head.forward(features)
    }

    /// Q value per batch element
    pub fn q_value(
        &self,
        series: Tensor<B, 2>,
        utility: Tensor<B, 2>,
        action: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        self.forward(series, utility, action).squeeze(1)
    }
}

//! Shared fixtures for integration tests
#![allow(dead_code)]

use ddpg_trader::config::RunConfig;
use ddpg_trader::core::{Observation, ObservationBatch, ACTION_DIM};
use ddpg_trader::error::{Result, RlError};
use ddpg_trader::networks::{Approximator, PolicyApproximator, ValueApproximator};
use ddpg_trader::RewardVariant;

/// Policy that always returns the same probabilities
#[derive(Debug, Clone)]
pub struct FixedPolicy {
    pub probs: [f32; ACTION_DIM],
    pub params: Vec<f32>,
    pub train_calls: usize,
}

impl FixedPolicy {
    pub fn new(probs: [f32; ACTION_DIM], params: Vec<f32>) -> Self {
        Self {
            probs,
            params,
            train_calls: 0,
        }
    }
}

impl Approximator for FixedPolicy {
    fn parameters(&self) -> Vec<f32> {
        self.params.clone()
    }

    fn set_parameters(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(RlError::ShapeMismatch {
                expected: self.params.len(),
                actual: params.len(),
            });
        }
        self.params = params.to_vec();
        Ok(())
    }
}

impl PolicyApproximator for FixedPolicy {
    fn predict(&self, _observation: &Observation) -> Result<[f32; ACTION_DIM]> {
        Ok(self.probs)
    }

    fn predict_batch(&self, states: &ObservationBatch) -> Result<Vec<f32>> {
        Ok(self.probs.repeat(states.len()))
    }

    fn train_with_action_gradients(
        &mut self,
        _states: &ObservationBatch,
        _action_gradients: &[f32],
    ) -> Result<f64> {
        self.train_calls += 1;
        Ok(0.25)
    }
}

/// Critic estimating zero everywhere
#[derive(Debug, Clone)]
pub struct ZeroCritic {
    pub params: Vec<f32>,
}

impl ZeroCritic {
    pub fn new(params: Vec<f32>) -> Self {
        Self { params }
    }
}

impl Approximator for ZeroCritic {
    fn parameters(&self) -> Vec<f32> {
        self.params.clone()
    }

    fn set_parameters(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(RlError::ShapeMismatch {
                expected: self.params.len(),
                actual: params.len(),
            });
        }
        self.params = params.to_vec();
        Ok(())
    }
}

impl ValueApproximator for ZeroCritic {
    fn predict_batch(&self, states: &ObservationBatch, _actions: &[f32]) -> Result<Vec<f32>> {
        Ok(vec![0.0; states.len()])
    }

    fn train_on_batch(
        &mut self,
        _states: &ObservationBatch,
        _actions: &[f32],
        targets: &[f32],
    ) -> Result<f64> {
        let n = targets.len().max(1) as f64;
        Ok(targets.iter().map(|y| (*y as f64).powi(2)).sum::<f64>() / n)
    }

    fn action_gradients(&self, states: &ObservationBatch, _actions: &[f32]) -> Result<Vec<f32>> {
        Ok(vec![0.0; states.len() * ACTION_DIM])
    }
}

/// Small, fully seeded configuration
pub fn small_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.agent.buffer_size = 50;
    config.agent.batch_size = 8;
    config.agent.trade_cost = 0.0;
    config.agent.trade_cost_actual = 0.0;
    config.agent.early_termination = false;
    config.agent.seed = Some(7);
    config.reward.variant = RewardVariant::Unclamped;
    config.state.window_size = 3;
    config.sampler.offset = 10;
    config.sampler.expand = 2;
    config.sampler.episode_window = 5;
    config.sampler.episodes_per_step = 1;
    config.training.episodes = 2;
    config.training.checkpoint_frequency = 1;
    config
}

/// Gently rising series with a wobble
pub fn wavy_prices(len: usize) -> Vec<f64> {
    (0..len)
        .map(|t| 100.0 + t as f64 * 0.5 + if t % 3 == 0 { 2.0 } else { -1.0 })
        .collect()
}

//! Function approximator contracts
//!
//! The learner only talks to its networks through these traits. Parameters
//! are exchanged as one flat `f32` vector so soft updates and checkpoints
//! stay independent of the network library.

use serde::{Deserialize, Serialize};

use crate::core::{Observation, ObservationBatch, ACTION_DIM};
use crate::error::Result;

/// Flat parameter access shared by policy and value networks
pub trait Approximator {
    /// All trainable parameters in a stable order
    fn parameters(&self) -> Vec<f32>;

    /// Overwrite all parameters; the length must match `parameters()`
    fn set_parameters(&mut self, params: &[f32]) -> Result<()>;
}

/// Policy network: observation to a probability vector over the two logits
pub trait PolicyApproximator: Approximator {
    fn predict(&self, observation: &Observation) -> Result<[f32; ACTION_DIM]>;

    /// Row-major `[len x ACTION_DIM]` probabilities
    fn predict_batch(&self, states: &ObservationBatch) -> Result<Vec<f32>>;

    /// One ascent step along the critic's action gradients; returns the actor loss
    fn train_with_action_gradients(
        &mut self,
        states: &ObservationBatch,
        action_gradients: &[f32],
    ) -> Result<f64>;
}

/// Value network: (observation, action) to a scalar Q estimate
pub trait ValueApproximator: Approximator {
    /// One Q value per row
    fn predict_batch(&self, states: &ObservationBatch, actions: &[f32]) -> Result<Vec<f32>>;

    /// One regression step toward `targets`; returns the loss
    fn train_on_batch(
        &mut self,
        states: &ObservationBatch,
        actions: &[f32],
        targets: &[f32],
    ) -> Result<f64>;

    /// dQ/da at the given actions, row-major `[len x ACTION_DIM]`
    fn action_gradients(&self, states: &ObservationBatch, actions: &[f32]) -> Result<Vec<f32>>;
}

/// Parameters of all four networks, keyed by role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub actor_local: Vec<f32>,
    pub actor_target: Vec<f32>,
    pub critic_local: Vec<f32>,
    pub critic_target: Vec<f32>,
}

impl NetworkParams {
    /// File stem and parameters for each role
    pub fn roles(&self) -> [(&'static str, &[f32]); 4] {
        [
            ("actor_local", &self.actor_local),
            ("actor_target", &self.actor_target),
            ("critic_local", &self.critic_local),
            ("critic_target", &self.critic_target),
        ]
    }
}

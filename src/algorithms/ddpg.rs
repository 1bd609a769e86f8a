//! Deep Deterministic Policy Gradient (DDPG)
//!
//! Local/target actor-critic pairs. Each learning step regresses the local
//! critic onto bootstrapped TD targets, pushes the local policy along the
//! critic's action gradients and then soft-updates both targets.

use tracing::trace;

use crate::core::{Observation, ACTION_DIM};
use crate::error::{Result, RlError};
use crate::memory::Batch;
use crate::networks::{Approximator, NetworkParams, PolicyApproximator, ValueApproximator};

/// DDPG hyperparameters
#[derive(Debug, Clone, Copy)]
pub struct DdpgConfig {
    /// Discount factor
    pub gamma: f64,
    /// Soft update rate
    pub tau: f64,
}

/// Losses of one learning step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LearnOutput {
    pub critic_loss: f64,
    pub actor_loss: f64,
}

/// `target <- (1 - tau) * target + tau * local`, element-wise
pub fn soft_update(target: &mut [f32], local: &[f32], tau: f64) -> Result<()> {
    if target.len() != local.len() {
        return Err(RlError::ShapeMismatch {
            expected: target.len(),
            actual: local.len(),
        });
    }
    for (t, &l) in target.iter_mut().zip(local) {
        *t = ((1.0 - tau) * *t as f64 + tau * l as f64) as f32;
    }
    Ok(())
}

/// Soft-update a target approximator toward its local twin
pub fn soft_update_approximator<A: Approximator>(target: &mut A, local: &A, tau: f64) -> Result<()> {
    let mut params = target.parameters();
    soft_update(&mut params, &local.parameters(), tau)?;
    target.set_parameters(&params)
}

/// Copy local parameters into the target exactly
pub fn sync_target<A: Approximator>(target: &mut A, local: &A) -> Result<()> {
    target.set_parameters(&local.parameters())
}

/// `y = r + gamma * (1 - done) * next_q`
pub fn td_targets(rewards: &[f32], dones: &[f32], next_q: &[f32], gamma: f64) -> Result<Vec<f32>> {
    if next_q.len() != rewards.len() {
        return Err(RlError::ShapeMismatch {
            expected: rewards.len(),
            actual: next_q.len(),
        });
    }
    Ok(rewards
        .iter()
        .zip(dones)
        .zip(next_q)
        .map(|((&r, &d), &q)| (r as f64 + gamma * (1.0 - d as f64) * q as f64) as f32)
        .collect())
}

/// Owner of the four networks
#[derive(Debug)]
pub struct DdpgLearner<P, V> {
    actor_local: P,
    actor_target: P,
    critic_local: V,
    critic_target: V,
    config: DdpgConfig,
    last_actor_loss: f64,
    learn_steps: u64,
}

impl<P: PolicyApproximator, V: ValueApproximator> DdpgLearner<P, V> {
    /// Build a learner; targets start as exact copies of the locals
    pub fn new(
        actor_local: P,
        mut actor_target: P,
        critic_local: V,
        mut critic_target: V,
        config: DdpgConfig,
    ) -> Result<Self> {
        sync_target(&mut actor_target, &actor_local)?;
        sync_target(&mut critic_target, &critic_local)?;
        Ok(Self {
            actor_local,
            actor_target,
            critic_local,
            critic_target,
            config,
            last_actor_loss: 1.0,
            learn_steps: 0,
        })
    }

    pub fn config(&self) -> &DdpgConfig {
        &self.config
    }

    /// Action probabilities from the local policy
    pub fn act(&self, observation: &Observation) -> Result<[f32; ACTION_DIM]> {
        self.actor_local.predict(observation)
    }

    /// Actor loss of the most recent learning step
    pub fn last_actor_loss(&self) -> f64 {
        self.last_actor_loss
    }

    pub fn learn_steps(&self) -> u64 {
        self.learn_steps
    }

    /// One actor-critic update on a replay minibatch
    pub fn learn(&mut self, batch: &Batch) -> Result<LearnOutput> {
        let next_actions = self.actor_target.predict_batch(&batch.next_states)?;
        if next_actions.len() != batch.len() * ACTION_DIM {
            return Err(RlError::ShapeMismatch {
                expected: batch.len() * ACTION_DIM,
                actual: next_actions.len(),
            });
        }
        let next_q = self
            .critic_target
            .predict_batch(&batch.next_states, &next_actions)?;
        let targets = td_targets(&batch.rewards, &batch.dones, &next_q, self.config.gamma)?;

        let critic_loss = self
            .critic_local
            .train_on_batch(&batch.states, &batch.actions, &targets)?;
        let action_gradients = self
            .critic_local
            .action_gradients(&batch.states, &batch.actions)?;
        let actor_loss = self
            .actor_local
            .train_with_action_gradients(&batch.states, &action_gradients)?;

        soft_update_approximator(&mut self.actor_target, &self.actor_local, self.config.tau)?;
        soft_update_approximator(&mut self.critic_target, &self.critic_local, self.config.tau)?;

        self.last_actor_loss = actor_loss;
        self.learn_steps += 1;
        trace!(
            step = self.learn_steps,
            critic_loss,
            actor_loss,
            "DDPG update"
        );

        Ok(LearnOutput {
            critic_loss,
            actor_loss,
        })
    }

    /// Parameters of all four networks
    pub fn network_params(&self) -> NetworkParams {
        NetworkParams {
            actor_local: self.actor_local.parameters(),
            actor_target: self.actor_target.parameters(),
            critic_local: self.critic_local.parameters(),
            critic_target: self.critic_target.parameters(),
        }
    }

    pub fn load_network_params(&mut self, params: &NetworkParams) -> Result<()> {
        self.actor_local.set_parameters(&params.actor_local)?;
        self.actor_target.set_parameters(&params.actor_target)?;
        self.critic_local.set_parameters(&params.critic_local)?;
        self.critic_target.set_parameters(&params.critic_target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ObservationBatch, UTILITY_FEATURES};
    use mockall::{mock, Sequence};

    mock! {
        pub Policy {}
        impl Approximator for Policy {
            fn parameters(&self) -> Vec<f32>;
            fn set_parameters(&mut self, params: &[f32]) -> Result<()>;
        }
        impl PolicyApproximator for Policy {
            fn predict(&self, observation: &Observation) -> Result<[f32; ACTION_DIM]>;
            fn predict_batch(&self, states: &ObservationBatch) -> Result<Vec<f32>>;
            fn train_with_action_gradients(
                &mut self,
                states: &ObservationBatch,
                action_gradients: &[f32],
            ) -> Result<f64>;
        }
    }

    mock! {
        pub Critic {}
        impl Approximator for Critic {
            fn parameters(&self) -> Vec<f32>;
            fn set_parameters(&mut self, params: &[f32]) -> Result<()>;
        }
        impl ValueApproximator for Critic {
            fn predict_batch(&self, states: &ObservationBatch, actions: &[f32]) -> Result<Vec<f32>>;
            fn train_on_batch(
                &mut self,
                states: &ObservationBatch,
                actions: &[f32],
                targets: &[f32],
            ) -> Result<f64>;
            fn action_gradients(&self, states: &ObservationBatch, actions: &[f32]) -> Result<Vec<f32>>;
        }
    }

    /// Parameter holder for soft-update checks
    struct Params(Vec<f32>);

    impl Approximator for Params {
        fn parameters(&self) -> Vec<f32> {
            self.0.clone()
        }

        fn set_parameters(&mut self, params: &[f32]) -> Result<()> {
            self.0 = params.to_vec();
            Ok(())
        }
    }

    fn batch() -> Batch {
        let mut states = ObservationBatch::with_capacity(2, 2);
        for _ in 0..2 {
            states.push(&Observation {
                series: vec![0.1, 0.2],
                utility: vec![0.0; UTILITY_FEATURES],
            });
        }
        Batch {
            next_states: states.clone(),
            states,
            actions: vec![1.0, 0.0, 0.0, 1.0],
            rewards: vec![1.0, -2.0],
            dones: vec![0.0, 1.0],
        }
    }

    #[test]
    fn test_soft_update_tau_zero_is_identity() {
        let mut target = Params(vec![0.5, -1.25, 3.0]);
        let local = Params(vec![9.0, 9.0, 9.0]);
        for _ in 0..100 {
            soft_update_approximator(&mut target, &local, 0.0).unwrap();
        }
        assert_eq!(target.0, vec![0.5, -1.25, 3.0]);
    }

    #[test]
    fn test_soft_update_tau_one_copies_local() {
        let mut target = Params(vec![0.5, -1.25, 3.0]);
        let local = Params(vec![0.1, 0.7, -3.3]);
        soft_update_approximator(&mut target, &local, 1.0).unwrap();
        assert_eq!(target.0, local.0);
    }

    #[test]
    fn test_soft_update_interpolates() {
        let mut target = vec![0.0, 10.0];
        soft_update(&mut target, &[10.0, 0.0], 0.25).unwrap();
        assert_eq!(target, vec![2.5, 7.5]);
    }

    #[test]
    fn test_soft_update_shape_mismatch() {
        let mut target = vec![0.0; 3];
        assert!(matches!(
            soft_update(&mut target, &[1.0; 2], 0.5),
            Err(RlError::ShapeMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_td_targets_mask_terminal_steps() {
        let y = td_targets(&[1.0, -2.0], &[0.0, 1.0], &[10.0, 10.0], 0.5).unwrap();
        assert_eq!(y, vec![6.0, -2.0]);
    }

    #[test]
    fn test_targets_initialized_from_locals() {
        let mut actor_local = MockPolicy::new();
        actor_local.expect_parameters().return_const(vec![1.0f32, 2.0]);
        let mut actor_target = MockPolicy::new();
        actor_target
            .expect_set_parameters()
            .withf(|params| params.to_vec() == vec![1.0f32, 2.0])
            .times(1)
            .returning(|_| Ok(()));

        let mut critic_local = MockCritic::new();
        critic_local.expect_parameters().return_const(vec![3.0f32]);
        let mut critic_target = MockCritic::new();
        critic_target
            .expect_set_parameters()
            .withf(|params| params.to_vec() == vec![3.0f32])
            .times(1)
            .returning(|_| Ok(()));

        let learner = DdpgLearner::new(
            actor_local,
            actor_target,
            critic_local,
            critic_target,
            DdpgConfig { gamma: 0.9, tau: 0.1 },
        );
        assert!(learner.is_ok());
    }

    #[test]
    fn test_learn_step_order_and_targets() {
        let mut seq = Sequence::new();

        let mut actor_local = MockPolicy::new();
        let mut actor_target = MockPolicy::new();
        let mut critic_local = MockCritic::new();
        let mut critic_target = MockCritic::new();

        actor_local.expect_parameters().return_const(vec![1.0f32]);
        critic_local.expect_parameters().return_const(vec![1.0f32]);
        actor_target.expect_parameters().return_const(vec![0.0f32]);
        critic_target.expect_parameters().return_const(vec![0.0f32]);
        actor_target.expect_set_parameters().returning(|_| Ok(()));
        critic_target.expect_set_parameters().returning(|_| Ok(()));

        actor_target
            .expect_predict_batch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![0.5, 0.5, 0.5, 0.5]));
        critic_target
            .expect_predict_batch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(vec![4.0, 4.0]));
        critic_local
            .expect_train_on_batch()
            .withf(|_, actions, targets| {
                actions.to_vec() == vec![1.0f32, 0.0, 0.0, 1.0] && targets.to_vec() == vec![3.0f32, -2.0]
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(0.25));
        critic_local
            .expect_action_gradients()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(vec![0.1, -0.1, 0.2, -0.2]));
        actor_local
            .expect_train_with_action_gradients()
            .withf(|_, grads| grads.to_vec() == vec![0.1f32, -0.1, 0.2, -0.2])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(-0.75));

        let mut learner = DdpgLearner::new(
            actor_local,
            actor_target,
            critic_local,
            critic_target,
            DdpgConfig { gamma: 0.5, tau: 0.01 },
        )
        .unwrap();

        let out = learner.learn(&batch()).unwrap();
        assert_eq!(out.critic_loss, 0.25);
        assert_eq!(out.actor_loss, -0.75);
        assert_eq!(learner.last_actor_loss(), -0.75);
        assert_eq!(learner.learn_steps(), 1);
    }
}

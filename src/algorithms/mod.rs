//! RL Algorithms
//!
//! Actor-critic learning and exploration aids.

pub mod ddpg;
pub mod exploration;

pub use ddpg::{
    soft_update, soft_update_approximator, sync_target, td_targets, DdpgConfig, DdpgLearner,
    LearnOutput,
};
pub use exploration::DeadlockBreaker;

//! Core RL abstractions
//!
//! Fundamental types for observations, actions, and rewards.

pub mod action;
pub mod reward;
pub mod state;

pub use action::{argmax, select_decision, Action, ACTION_DIM, TRADE_LOGIT};
pub use reward::{
    RewardContext, RewardEngine, RewardFunction, RewardParams, RewardSwitch, RewardVariant,
};
pub use state::{Observation, ObservationBatch, PositionSnapshot, StateBuilder, UTILITY_FEATURES};

//! Single-asset DDPG trading agent
//!
//! A discrete two-logit policy and an action-value critic, each with a
//! soft-updated target copy, learn from a circular replay buffer while an
//! environment enforces FLAT/HOLDING trading rules and shapes rewards.
//!
//! The `nn` feature (on by default) provides Burn-backed networks; without
//! it any type implementing the approximator traits can drive the agent.

pub mod algorithms;
pub mod config;
pub mod core;
pub mod environment;
pub mod error;
pub mod logging;
pub mod memory;
pub mod networks;
pub mod training;

pub use algorithms::{DdpgConfig, DdpgLearner, DeadlockBreaker, LearnOutput};
pub use config::RunConfig;
pub use core::{
    Action, Observation, ObservationBatch, RewardEngine, RewardFunction, RewardParams,
    RewardSwitch, RewardVariant, StateBuilder,
};
pub use environment::{EpisodeSampler, PriceSeries, TradingEnvironment};
pub use error::{Result, RlError};
pub use memory::{ReplayBuffer, Transition};
pub use networks::{Approximator, NetworkParams, PolicyApproximator, ValueApproximator};
pub use training::{
    Agent, CheckpointStore, EpisodeSummary, EpisodeTrace, EvaluationReport, Persistence,
    RunStatistics,
};

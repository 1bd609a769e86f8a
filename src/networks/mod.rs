//! Neural Networks
//!
//! Approximator contracts used by the learner, and their Burn
//! implementations behind the `nn` feature.

pub mod approximator;

#[cfg(feature = "nn")]
pub mod actor;
#[cfg(feature = "nn")]
pub mod burn_impl;
#[cfg(feature = "nn")]
pub mod critic;
#[cfg(feature = "nn")]
pub mod encoder;

pub use approximator::{Approximator, NetworkParams, PolicyApproximator, ValueApproximator};

#[cfg(feature = "nn")]
pub use actor::{Actor, ActorConfig};
#[cfg(feature = "nn")]
pub use burn_impl::{build_networks, BurnCritic, BurnPolicy, Networks, TrainingBackend};
#[cfg(feature = "nn")]
pub use critic::{Critic, CriticConfig};
#[cfg(feature = "nn")]
pub use encoder::{DenseStack, DenseStackConfig};

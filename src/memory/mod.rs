//! Experience Memory
//!
//! Fixed-capacity replay of past transitions.

pub mod replay_buffer;

pub use replay_buffer::{Batch, ReplayBuffer, ReplaySnapshot, Transition};

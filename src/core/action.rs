//! Action Space
//!
//! The policy decides between two logits; the trading environment acts on
//! three actions. Logit 1 means "trade": BUY when flat, SELL when holding.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Width of the policy output (and of the critic's action input)
pub const ACTION_DIM: usize = 2;

/// Index of the trade logit in the policy output
pub const TRADE_LOGIT: usize = 1;

/// Trading action applied to the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Action {
    /// Keep the current position
    #[default]
    Hold = 0,
    /// Open the single unit position
    Buy = 1,
    /// Close the single unit position
    Sell = 2,
}

impl Action {
    /// Convert from action index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Hold),
            1 => Some(Self::Buy),
            2 => Some(Self::Sell),
            _ => None,
        }
    }

    /// Convert to action index
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// Map a binary policy decision onto the three-way action space
    pub fn from_decision(logit: usize, holding: bool) -> Self {
        match (logit == TRADE_LOGIT, holding) {
            (false, _) => Self::Hold,
            (true, false) => Self::Buy,
            (true, true) => Self::Sell,
        }
    }

    /// Whether this is a BUY or SELL
    pub fn is_trade(self) -> bool {
        matches!(self, Self::Buy | Self::Sell)
    }

    /// Direction used by the dense reward terms: BUY +1, SELL -1, HOLD 0
    pub fn sign(self) -> f64 {
        match self {
            Self::Hold => 0.0,
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }

    /// One-hot encoding over the policy's two logits
    pub fn one_hot(self) -> [f32; ACTION_DIM] {
        if self.is_trade() {
            [0.0, 1.0]
        } else {
            [1.0, 0.0]
        }
    }
}

/// Index of the highest probability (first on ties)
pub fn argmax(probs: &[f32]) -> usize {
    probs
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_p), (i, &p)| {
            if p > best_p {
                (i, p)
            } else {
                (best, best_p)
            }
        })
        .0
}

/// Pick a logit: sample from the categorical distribution while exploring,
/// take the arg-max otherwise.
pub fn select_decision<R: Rng + ?Sized>(probs: &[f32], explore: bool, rng: &mut R) -> usize {
    if !explore {
        return argmax(probs);
    }
    match WeightedIndex::new(probs.iter().map(|p| p.max(0.0))) {
        Ok(dist) => dist.sample(rng),
        // All-zero or non-finite output; fall back to the greedy choice
        Err(_) => argmax(probs),
    }
}

//! Reward Functions
//!
//! Eight mutually exclusive reward variants evaluated from a named
//! per-step context. The active variant may only change between episodes.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::action::{Action, ACTION_DIM};
use crate::error::{Result, RlError};

/// Terminal reward when net growth over buy-and-hold is exactly zero
pub const FLAT_GROWTH_PENALTY: f64 = -1000.0;

/// Floor applied to the shaped reward before scaling
pub const SHAPED_REWARD_FLOOR: f64 = -50_000.0;

/// Raw reward of an episode abandoned by the termination check
pub const TERMINATED_PENALTY: f64 = -100_000.0;

/// Divisor bringing shaped rewards to network scale
pub const REWARD_SCALE: f64 = 1000.0;

/// Multiplier for positive rewards earned by an illegal action
pub const ILLEGAL_GAIN_DAMPING: f64 = 0.1;

/// Multiplier for negative rewards earned by an illegal action
pub const ILLEGAL_LOSS_AMPLIFICATION: f64 = 1.1;

/// Reward variant selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum RewardVariant {
    /// `max(profit, 0)`
    Clamped = 0,
    /// `profit`
    Unclamped = 1,
    /// `profit`, open positions marked to close on the last step
    NeutralizedClose = 2,
    /// Terminal growth only, doubled when positive
    TerminalGrowth = 3,
    /// Dense price-move term with a terminal growth override
    DenseWithTerminal = 4,
    /// Dense price-move term only
    Dense = 5,
    /// Confidence-weighted clamped profit on trades
    Confident = 6,
    /// Hold/profit shaping with illegal-action damping
    ShapedHoldProfit = 7,
}

impl RewardVariant {
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Get human-readable description
    pub fn description(self) -> &'static str {
        match self {
            Self::Clamped => "clamped profit max(profit, 0)",
            Self::Unclamped => "unclamped profit",
            Self::NeutralizedClose => "profit with unclosed positions neutralized",
            Self::TerminalGrowth => "terminal growth only, penalty for buy-and-hold",
            Self::DenseWithTerminal => "dense price-move reward with terminal growth",
            Self::Dense => "dense price-move reward only",
            Self::Confident => "confidence-weighted trade profit",
            Self::ShapedHoldProfit => "hold and profit shaping with soft penalties",
        }
    }
}

impl TryFrom<u8> for RewardVariant {
    type Error = String;

    fn try_from(id: u8) -> std::result::Result<Self, Self::Error> {
        match id {
            0 => Ok(Self::Clamped),
            1 => Ok(Self::Unclamped),
            2 => Ok(Self::NeutralizedClose),
            3 => Ok(Self::TerminalGrowth),
            4 => Ok(Self::DenseWithTerminal),
            5 => Ok(Self::Dense),
            6 => Ok(Self::Confident),
            7 => Ok(Self::ShapedHoldProfit),
            other => Err(format!("unknown reward variant {other} (expected 0-7)")),
        }
    }
}

impl From<RewardVariant> for u8 {
    fn from(variant: RewardVariant) -> Self {
        variant.id()
    }
}

/// Tunable scalars shared by the shaping variants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardParams {
    pub hold_scale: f64,
    pub max_holds: f64,
    pub prob_power: f64,
}

impl Default for RewardParams {
    fn default() -> Self {
        Self {
            hold_scale: 10.0,
            max_holds: 100.0,
            prob_power: 0.2,
        }
    }
}

/// Directive to change the reward variant at an episode boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewardSwitch {
    pub from: RewardVariant,
    pub to: RewardVariant,
    pub at_episode: usize,
}

/// Everything a reward variant may read for one step
#[derive(Debug, Clone)]
pub struct RewardContext<'a> {
    /// Realized (or conjugate) profit of this step
    pub profit: f64,
    /// Price at the decision step
    pub price: f64,
    /// Price one step earlier
    pub prev_price: f64,
    /// Price one step later (horizon price)
    pub next_price: f64,
    /// Action after legality resolution
    pub action: Action,
    /// Policy output that produced the action
    pub action_probs: [f32; ACTION_DIM],
    pub n_trades: usize,
    /// Hold streak after this step
    pub n_holds: usize,
    pub illegal: bool,
    pub series_len: usize,
    /// Episode abandoned by the termination check
    pub terminated: bool,
    /// Last step of the episode
    pub last: bool,
    pub balance: f64,
    pub inventory_value: f64,
    pub n_budget: usize,
    /// Purchase prices of open units
    pub held_prices: &'a [f64],
}

impl RewardContext<'_> {
    /// Arg-max probability raised to `power`
    fn confidence(&self, power: f64) -> f64 {
        let max = self
            .action_probs
            .iter()
            .fold(f32::NEG_INFINITY, |acc, &p| acc.max(p));
        (max as f64).powf(power)
    }

    /// Portfolio value over buy-and-hold at the current price
    fn terminal_growth(&self) -> f64 {
        self.balance + self.inventory_value - self.n_budget as f64 * self.price
    }

    fn dense_term(&self) -> f64 {
        (1.0 + self.action.sign() * (self.price - self.prev_price) / self.prev_price)
            * (self.prev_price / self.next_price)
    }
}

/// Trait for computing rewards
pub trait RewardFunction: Send + Sync {
    /// Compute the scalar reward of one step
    fn compute(&self, ctx: &RewardContext<'_>, params: &RewardParams) -> f64;
}

impl RewardFunction for RewardVariant {
    fn compute(&self, ctx: &RewardContext<'_>, params: &RewardParams) -> f64 {
        match self {
            Self::Clamped => ctx.profit.max(0.0),
            Self::Unclamped => ctx.profit,
            Self::NeutralizedClose => {
                if ctx.last {
                    let closed: f64 = ctx.held_prices.iter().map(|bought| bought - ctx.price).sum();
                    ctx.profit + closed
                } else {
                    ctx.profit
                }
            }
            Self::TerminalGrowth => {
                if !ctx.last {
                    return 0.0;
                }
                let growth = ctx.terminal_growth();
                if growth > 0.0 {
                    growth * 2.0
                } else if growth == 0.0 {
                    FLAT_GROWTH_PENALTY
                } else {
                    growth
                }
            }
            Self::DenseWithTerminal => {
                if !ctx.last {
                    return ctx.dense_term();
                }
                let growth = ctx.terminal_growth();
                if growth == 0.0 {
                    FLAT_GROWTH_PENALTY
                } else {
                    growth
                }
            }
            Self::Dense => ctx.dense_term(),
            Self::Confident => {
                if ctx.action.is_trade() {
                    ctx.profit.max(0.0) * ctx.confidence(params.prob_power) / REWARD_SCALE
                } else {
                    0.0
                }
            }
            Self::ShapedHoldProfit => shaped_hold_profit(ctx, params),
        }
    }
}

fn shaped_hold_profit(ctx: &RewardContext<'_>, params: &RewardParams) -> f64 {
    if ctx.terminated {
        return TERMINATED_PENALTY / REWARD_SCALE;
    }

    let prob = ctx.confidence(params.prob_power);

    let mut reward = if ctx.action == Action::Hold || ctx.illegal {
        let hold_penalty = 1.0
            - ((ctx.n_holds as f64 - params.max_holds) / ctx.series_len as f64 * params.hold_scale)
                .exp();
        let move_since = ctx.next_price - ctx.price;
        let held = ctx.held_prices.len();
        if held != 0 {
            (move_since * held as f64 + hold_penalty) * prob
        } else {
            // Opportunity cost (or gain) of staying flat
            (-move_since + hold_penalty) * prob
        }
    } else {
        ctx.profit * prob
    };

    if ctx.illegal && reward > 0.0 {
        reward *= ILLEGAL_GAIN_DAMPING;
    }
    if ctx.illegal && reward < 0.0 {
        reward *= ILLEGAL_LOSS_AMPLIFICATION;
    }

    reward.max(SHAPED_REWARD_FLOOR) / REWARD_SCALE
}

/// Stateful reward selector owned by the trading environment
#[derive(Debug, Clone)]
pub struct RewardEngine {
    variant: RewardVariant,
    params: RewardParams,
    in_episode: bool,
}

impl RewardEngine {
    pub fn new(variant: RewardVariant, params: RewardParams) -> Self {
        info!(
            "Reward function {}: {}",
            variant.id(),
            variant.description()
        );
        Self {
            variant,
            params,
            in_episode: false,
        }
    }

    /// Active variant
    pub fn variant(&self) -> RewardVariant {
        self.variant
    }

    pub fn params(&self) -> &RewardParams {
        &self.params
    }

    pub fn in_episode(&self) -> bool {
        self.in_episode
    }

    /// Mark the start of an episode; switches are rejected until it ends
    pub fn begin_episode(&mut self) {
        self.in_episode = true;
    }

    pub fn end_episode(&mut self) {
        self.in_episode = false;
    }

    /// Apply a switch directive for `episode`
    ///
    /// Returns whether the variant changed. A directive for another episode
    /// is a no-op.
    pub fn apply_switch(&mut self, switch: &RewardSwitch, episode: usize) -> Result<bool> {
        if self.in_episode {
            return Err(RlError::RewardSwitch(format!(
                "cannot switch from {} to {} in the middle of an episode",
                switch.from.id(),
                switch.to.id()
            )));
        }
        if episode != switch.at_episode {
            return Ok(false);
        }
        if switch.from != self.variant {
            return Err(RlError::RewardSwitch(format!(
                "directive expects variant {} but {} is active",
                switch.from.id(),
                self.variant.id()
            )));
        }

        info!(
            episode,
            "Switching reward variant {} -> {} ({})",
            switch.from.id(),
            switch.to.id(),
            switch.to.description()
        );
        self.variant = switch.to;
        Ok(true)
    }

    /// Reward of one step under the active variant
    pub fn compute(&self, ctx: &RewardContext<'_>) -> f64 {
        self.variant.compute(ctx, &self.params)
    }
}

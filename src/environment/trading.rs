//! Trading Environment
//!
//! Single-asset, single-unit market simulation over a fixed price series.
//! The environment is either FLAT or HOLDING one unit; actions that the
//! current position does not permit are counted as impossible and leave
//! the portfolio untouched.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::series::PriceSeries;
use crate::core::{
    argmax, Action, Observation, PositionSnapshot, RewardContext, RewardEngine, RewardSwitch,
    StateBuilder, ACTION_DIM, TRADE_LOGIT,
};
use crate::error::Result;

/// Cash and open positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub balance: f64,
    /// Purchase prices of open units
    pub inventory: Vec<f64>,
    /// Sale prices awaiting the next purchase
    pub inventory_conj: Vec<f64>,
    /// Mark-to-market value of open units
    pub inventory_value: f64,
    pub n_budget: usize,
    /// Buy-and-hold baseline fixed at reset
    pub budget: f64,
}

impl Portfolio {
    pub fn new(n_budget: usize, start_price: f64) -> Self {
        let mut portfolio = Self {
            balance: 0.0,
            inventory: Vec::new(),
            inventory_conj: Vec::new(),
            inventory_value: 0.0,
            n_budget,
            budget: 0.0,
        };
        portfolio.reset(start_price);
        portfolio
    }

    /// Open the episode holding `n_budget` units bought at `start_price`
    pub fn reset(&mut self, start_price: f64) {
        self.balance = 0.0;
        self.inventory = vec![start_price; self.n_budget];
        self.inventory_conj.clear();
        self.inventory_value = start_price * self.n_budget as f64;
        self.budget = start_price * self.n_budget as f64;
    }

    pub fn holding(&self) -> bool {
        !self.inventory.is_empty()
    }

    pub fn mark(&mut self, price: f64) {
        self.inventory_value = self.inventory.len() as f64 * price;
    }
}

/// Per-episode counters driving shaping, termination and statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeCounters {
    pub n_trades: usize,
    /// Hold streak, reset by every executed trade
    pub n_holds: usize,
    pub n_impossible: usize,
    pub n_positive_profits: usize,
    /// BUY/SELL attempts, legal or not
    pub n_decisions: usize,
    /// Cash recorded by evaluation cash corrections
    pub extra_cash: f64,
}

/// Why an episode was abandoned early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    TooManyImpossibles,
    /// Flat and unable to afford any remaining price
    InsufficientBalance,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyImpossibles => write!(f, "too many impossibles"),
            Self::InsufficientBalance => write!(f, "too low balance for rest of trial"),
        }
    }
}

/// Inputs of one environment step
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    pub t: usize,
    pub action: Action,
    /// Policy output the action was chosen from
    pub action_probs: [f32; ACTION_DIM],
    /// Last step of the episode
    pub last: bool,
}

/// Result of one environment step
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub action: Action,
    pub profit: f64,
    pub illegal: bool,
    pub cash_corrected: bool,
    pub termination: Option<TerminationReason>,
    pub reward: f64,
}

impl StepOutcome {
    pub fn terminated(&self) -> bool {
        self.termination.is_some()
    }
}

/// Environment settings fixed for a run
#[derive(Debug, Clone)]
pub struct TradingEnvConfig {
    pub trade_cost: f64,
    pub n_budget: usize,
    pub terminal_threshold: usize,
    pub early_termination: bool,
}

/// Trading environment over one price series
#[derive(Debug)]
pub struct TradingEnvironment {
    series: PriceSeries,
    config: TradingEnvConfig,
    portfolio: Portfolio,
    counters: EpisodeCounters,
    reward: RewardEngine,
    state_builder: StateBuilder,
    training: bool,
}

impl TradingEnvironment {
    pub fn new(
        series: PriceSeries,
        config: TradingEnvConfig,
        reward: RewardEngine,
        state_builder: StateBuilder,
        training: bool,
    ) -> Self {
        let portfolio = Portfolio::new(config.n_budget, series.price(0));
        Self {
            series,
            config,
            portfolio,
            counters: EpisodeCounters::default(),
            reward,
            state_builder,
            training,
        }
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn config(&self) -> &TradingEnvConfig {
        &self.config
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn counters(&self) -> &EpisodeCounters {
        &self.counters
    }

    pub fn reward_engine(&self) -> &RewardEngine {
        &self.reward
    }

    pub fn state_builder(&self) -> &StateBuilder {
        &self.state_builder
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    /// Reset portfolio and counters for an episode starting at `start`
    pub fn begin_episode(&mut self, start: usize) {
        self.portfolio.reset(self.series.price(start));
        self.counters = EpisodeCounters::default();
        self.reward.begin_episode();
    }

    pub fn end_episode(&mut self) {
        self.reward.end_episode();
    }

    /// Fund the episode with `extra` cash; call right after `begin_episode`
    pub fn inject_cash(&mut self, extra: f64) {
        self.portfolio.balance = extra;
        self.portfolio.budget += extra;
    }

    /// Apply a reward switch directive between episodes
    pub fn apply_reward_switch(&mut self, switch: &RewardSwitch, episode: usize) -> Result<bool> {
        self.reward.apply_switch(switch, episode)
    }

    pub fn position(&self) -> PositionSnapshot {
        PositionSnapshot {
            balance: self.portfolio.balance,
            bought_price: self.portfolio.inventory.first().copied(),
            sold_price: self.portfolio.inventory_conj.first().copied(),
            n_holds: self.counters.n_holds,
        }
    }

    /// Observation at step `t` for the current position
    pub fn observe(&self, t: usize) -> Observation {
        self.state_builder.build(
            self.series.prices(),
            self.series.predata(),
            t,
            &self.position(),
        )
    }

    fn can_buy(&self, price: f64) -> bool {
        !self.portfolio.holding() && self.portfolio.balance - self.config.trade_cost > price
    }

    /// Whether `action` would execute at step `t`
    pub fn is_legal(&self, action: Action, t: usize) -> bool {
        match action {
            Action::Hold => true,
            Action::Buy => self.can_buy(self.series.price(t)),
            Action::Sell => self.portfolio.holding(),
        }
    }

    /// Apply one action and compute its reward
    pub fn step(&mut self, ctx: &StepContext) -> StepOutcome {
        let price = self.series.price(ctx.t);
        let cost = self.config.trade_cost;
        let mut profit = 0.0;
        let mut change = 0.0;
        let mut illegal = false;

        match ctx.action {
            Action::Hold => self.counters.n_holds += 1,
            Action::Buy => {
                self.counters.n_decisions += 1;
                if self.can_buy(price) {
                    self.portfolio.inventory.push(price);
                    if !self.portfolio.inventory_conj.is_empty() {
                        let sold = self.portfolio.inventory_conj.remove(0);
                        profit = sold - price - cost;
                    }
                    change = -price - cost;
                    self.record_trade();
                    debug!(t = ctx.t, price, profit, "BUY");
                } else {
                    illegal = true;
                }
            }
            Action::Sell => {
                self.counters.n_decisions += 1;
                if self.portfolio.holding() {
                    let bought = self.portfolio.inventory.remove(0);
                    self.portfolio.inventory_conj.push(price);
                    profit = price - bought - cost;
                    change = price - cost;
                    self.record_trade();
                    debug!(t = ctx.t, price, profit, "SELL");
                } else {
                    illegal = true;
                }
            }
        }

        if illegal {
            self.counters.n_impossible += 1;
            self.counters.n_holds += 1;
        }

        let mut cash_corrected = false;
        if !self.training
            && illegal
            && ctx.action == Action::Buy
            && !self.portfolio.holding()
            && self.portfolio.balance - cost < price
            && argmax(&ctx.action_probs) == TRADE_LOGIT
        {
            let shortfall = price - self.portfolio.balance - cost;
            warn!(t = ctx.t, shortfall, "Cash correction: resetting portfolio");
            self.counters.extra_cash += shortfall;
            self.counters.n_impossible -= 1;
            self.portfolio.reset(price);
            self.record_trade();
            profit = 0.0;
            illegal = false;
            cash_corrected = true;
        }

        if profit > 0.0 {
            self.counters.n_positive_profits += 1;
        }

        self.portfolio.balance += change;
        self.portfolio.mark(price);

        let termination = if self.training && self.config.early_termination {
            self.check_termination(ctx.t)
        } else {
            None
        };
        if let Some(reason) = termination {
            warn!(t = ctx.t, %reason, "Episode terminated early");
        }

        let reward = self.reward.compute(&RewardContext {
            profit,
            price,
            prev_price: self.series.prev_price(ctx.t),
            next_price: self.series.next_price(ctx.t),
            action: ctx.action,
            action_probs: ctx.action_probs,
            n_trades: self.counters.n_trades,
            n_holds: self.counters.n_holds,
            illegal,
            series_len: self.series.len(),
            terminated: termination.is_some(),
            last: ctx.last,
            balance: self.portfolio.balance,
            inventory_value: self.portfolio.inventory_value,
            n_budget: self.portfolio.n_budget,
            held_prices: &self.portfolio.inventory,
        });

        StepOutcome {
            action: ctx.action,
            profit,
            illegal,
            cash_corrected,
            termination,
            reward,
        }
    }

    fn record_trade(&mut self) {
        self.counters.n_trades += 1;
        self.counters.n_holds = 0;
    }

    fn check_termination(&self, t: usize) -> Option<TerminationReason> {
        if self.counters.n_impossible >= self.config.terminal_threshold {
            return Some(TerminationReason::TooManyImpossibles);
        }
        let min_future = self.series.min_future(t)?;
        if !self.portfolio.holding() && self.portfolio.balance - self.config.trade_cost < min_future
        {
            return Some(TerminationReason::InsufficientBalance);
        }
        None
    }
}

//! Episode statistics
//!
//! Per-step traces of one episode and per-episode summaries across a run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::checkpointing::episode_name;
use crate::core::Action;
use crate::environment::{EpisodeCounters, Portfolio, StepOutcome, TerminationReason};

/// Action code recorded for padded steps
pub const PADDED_ACTION: i32 = -1;

/// Per-step traces of a single episode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeTrace {
    pub start: usize,
    pub total_reward: f64,
    pub profits: Vec<f64>,
    pub balances: Vec<f64>,
    pub rewards: Vec<f64>,
    /// Mark-to-market inventory value
    pub inventories: Vec<f64>,
    pub actor_losses: Vec<f64>,
    pub actions: Vec<i32>,
    /// Portfolio growth net of budget, extra cash and trade costs
    pub growth: Vec<f64>,
    /// Growth minus buy-and-hold growth
    pub compete: Vec<f64>,
    pub buy_indices: Vec<usize>,
    pub sell_indices: Vec<usize>,
    pub impossible_indices: Vec<usize>,
    pub extra_cash_indices: Vec<usize>,
    pub n_trades: usize,
    pub n_impossible: usize,
    pub n_positive_profits: usize,
    pub extra_cash: f64,
    pub termination: Option<TerminationReason>,
}

/// Collects one episode step by step
#[derive(Debug)]
pub struct EpisodeRecorder {
    trace: EpisodeTrace,
    budget: f64,
    buy_and_hold: Vec<f64>,
    trade_cost_actual: f64,
}

impl EpisodeRecorder {
    /// `budget` is the portfolio baseline after reset and any cash injection;
    /// `buy_and_hold[i]` is the baseline growth at step `start + i`
    pub fn new(start: usize, budget: f64, buy_and_hold: Vec<f64>, trade_cost_actual: f64) -> Self {
        Self {
            trace: EpisodeTrace {
                start,
                ..Default::default()
            },
            budget,
            buy_and_hold,
            trade_cost_actual,
        }
    }

    pub fn record(
        &mut self,
        t: usize,
        outcome: &StepOutcome,
        portfolio: &Portfolio,
        counters: &EpisodeCounters,
        actor_loss: f64,
    ) {
        let trace = &mut self.trace;
        trace.total_reward += outcome.reward;
        trace.balances.push(portfolio.balance);
        trace.inventories.push(portfolio.inventory_value);
        trace.profits.push(outcome.profit);
        trace.rewards.push(outcome.reward);
        trace.actor_losses.push(actor_loss);
        trace.actions.push(outcome.action.to_index() as i32);

        if outcome.cash_corrected {
            trace.extra_cash_indices.push(t);
        } else if outcome.illegal {
            trace.impossible_indices.push(t);
        } else {
            match outcome.action {
                Action::Buy => trace.buy_indices.push(t),
                Action::Sell => trace.sell_indices.push(t),
                Action::Hold => {}
            }
        }

        let growth = portfolio.balance + portfolio.inventory_value
            - self.budget
            - 2.0 * counters.extra_cash
            - self.trade_cost_actual * counters.n_trades as f64;
        let baseline = self
            .buy_and_hold
            .get(t.saturating_sub(trace.start))
            .copied()
            .unwrap_or(0.0);
        trace.growth.push(growth);
        trace.compete.push(growth - baseline);

        trace.n_trades = counters.n_trades;
        trace.n_impossible = counters.n_impossible;
        trace.n_positive_profits = counters.n_positive_profits;
        trace.extra_cash = counters.extra_cash;
        trace.termination = outcome.termination;
    }

    /// Pad every trace to `len` steps after an early termination
    ///
    /// Balances, inventories, losses, growth and compete carry their last
    /// value forward; profits and rewards pad with zero; actions with
    /// [`PADDED_ACTION`].
    pub fn pad_to(&mut self, len: usize) {
        fn carry(values: &mut Vec<f64>, len: usize) {
            let last = values.last().copied().unwrap_or(0.0);
            values.resize(len.max(values.len()), last);
        }

        let trace = &mut self.trace;
        carry(&mut trace.balances, len);
        carry(&mut trace.inventories, len);
        carry(&mut trace.actor_losses, len);
        carry(&mut trace.growth, len);
        carry(&mut trace.compete, len);
        let target = len.max(trace.profits.len());
        trace.profits.resize(target, 0.0);
        trace.rewards.resize(target, 0.0);
        trace.actions.resize(len.max(trace.actions.len()), PADDED_ACTION);
    }

    pub fn trace(&self) -> &EpisodeTrace {
        &self.trace
    }

    pub fn finish(self) -> EpisodeTrace {
        self.trace
    }
}

/// Condensed result of one episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub start: usize,
    pub total_reward: f64,
    pub last_loss: f64,
    pub n_impossible: usize,
    pub n_trades: usize,
    /// Share of trades that realized a positive profit
    pub trade_ratio: f64,
    pub final_growth: f64,
    pub final_compete: f64,
    pub termination: Option<TerminationReason>,
}

impl EpisodeSummary {
    pub fn from_trace(episode: usize, trace: &EpisodeTrace) -> Self {
        Self {
            episode,
            start: trace.start,
            total_reward: trace.total_reward,
            last_loss: trace.actor_losses.last().copied().unwrap_or(0.0),
            n_impossible: trace.n_impossible,
            n_trades: trace.n_trades,
            trade_ratio: trace.n_positive_profits as f64 / trace.n_trades.max(1) as f64,
            final_growth: trace.growth.last().copied().unwrap_or(0.0),
            final_compete: trace.compete.last().copied().unwrap_or(0.0),
            termination: trace.termination,
        }
    }
}

/// Statistics of a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStatistics {
    pub summaries: Vec<EpisodeSummary>,
    /// Per-episode traces keyed `e{episode}`
    pub episodes: BTreeMap<String, EpisodeTrace>,
}

impl RunStatistics {
    pub fn push(&mut self, episode: usize, trace: EpisodeTrace) -> &EpisodeSummary {
        let summary = EpisodeSummary::from_trace(episode, &trace);
        self.episodes.insert(episode_name(episode), trace);
        self.summaries.push(summary);
        &self.summaries[self.summaries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    /// Drop every episode after `episode`
    pub fn truncate_after(&mut self, episode: usize) {
        self.summaries.retain(|s| s.episode <= episode);
        let kept: Vec<String> = self
            .summaries
            .iter()
            .map(|s| episode_name(s.episode))
            .collect();
        self.episodes.retain(|name, _| kept.contains(name));
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn total_rewards(&self) -> Vec<f64> {
        self.summaries.iter().map(|s| s.total_reward).collect()
    }

    /// Mean total reward over the last `n` episodes
    pub fn recent_mean_reward(&self, n: usize) -> f64 {
        let recent: Vec<f64> = self
            .summaries
            .iter()
            .rev()
            .take(n)
            .map(|s| s.total_reward)
            .collect();
        if recent.is_empty() {
            0.0
        } else {
            recent.iter().sum::<f64>() / recent.len() as f64
        }
    }
}

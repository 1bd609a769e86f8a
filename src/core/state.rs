//! State Representation
//!
//! Renders a trailing price window plus the portfolio position into the
//! two-channel observation consumed by the approximators: a squashed
//! time-series channel and a flat utility channel.

use serde::{Deserialize, Serialize};

use crate::config::StateConfig;

/// Number of scalar utility features
pub const UTILITY_FEATURES: usize = 6;

/// Hold streak normalization never divides by less than this
const MIN_HOLD_NORMALIZER: f64 = 100.0;

/// Observation of one decision step
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    /// Squashed returns (or levels), oldest first, `window_size - 1` long
    pub series: Vec<f32>,
    /// `[can_afford, hold_norm, holding, buy_signal, sell_signal, profit_norm]`
    pub utility: Vec<f32>,
}

impl Observation {
    pub fn holding(&self) -> bool {
        self.utility.get(2).is_some_and(|&h| h > 0.0)
    }
}

/// Row-major stack of observations
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservationBatch {
    /// `[len x series_len]`
    pub series: Vec<f32>,
    /// `[len x UTILITY_FEATURES]`
    pub utility: Vec<f32>,
    pub series_len: usize,
}

impl ObservationBatch {
    pub fn with_capacity(len: usize, series_len: usize) -> Self {
        Self {
            series: Vec::with_capacity(len * series_len),
            utility: Vec::with_capacity(len * UTILITY_FEATURES),
            series_len,
        }
    }

    /// Batch holding a single observation
    pub fn single(observation: &Observation) -> Self {
        let mut batch = Self::with_capacity(1, observation.series.len());
        batch.push(observation);
        batch
    }

    pub fn push(&mut self, observation: &Observation) {
        self.series.extend_from_slice(&observation.series);
        self.utility.extend_from_slice(&observation.utility);
    }

    /// Number of stacked observations
    pub fn len(&self) -> usize {
        self.utility.len() / UTILITY_FEATURES
    }

    pub fn is_empty(&self) -> bool {
        self.utility.is_empty()
    }
}

/// Raw portfolio fields the builder reads
///
/// Captured from the environment before each observation is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionSnapshot {
    pub balance: f64,
    /// Purchase price of the open unit, if holding
    pub bought_price: Option<f64>,
    /// Price of the most recent sale, if flat
    pub sold_price: Option<f64>,
    /// Current hold streak
    pub n_holds: usize,
}

/// Builds fixed-shape observations from prices and position
#[derive(Debug, Clone)]
pub struct StateBuilder {
    window_size: usize,
    tanh_scale: f64,
    use_returns: bool,
    mask_input: bool,
    trade_cost: f64,
    max_holds: f64,
}

impl StateBuilder {
    pub fn new(config: &StateConfig, trade_cost: f64, max_holds: f64) -> Self {
        Self {
            window_size: config.window_size,
            tanh_scale: config.tanh_scale,
            use_returns: config.use_returns,
            mask_input: config.mask_input,
            trade_cost,
            max_holds,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Length of the time-series channel
    pub fn series_len(&self) -> usize {
        self.window_size - 1
    }

    /// Render the observation at step `t`
    ///
    /// Windows reaching before the first price are left-padded with the
    /// tail of `predata`, then with the first price.
    pub fn build(
        &self,
        prices: &[f64],
        predata: &[f64],
        t: usize,
        position: &PositionSnapshot,
    ) -> Observation {
        let window = self.raw_window(prices, predata, t);

        let mut series: Vec<f32> = if self.use_returns {
            window.windows(2).map(|w| self.squash(w[1] - w[0])).collect()
        } else {
            window[1..].iter().map(|&p| self.squash(p)).collect()
        };

        if self.mask_input {
            let keep = position
                .n_holds
                .min(self.window_size)
                .clamp(1, self.series_len());
            let cutoff = series.len() - keep;
            series[..cutoff].iter_mut().for_each(|v| *v = 0.0);
        }

        Observation {
            series,
            utility: self.utility(prices[t], position).to_vec(),
        }
    }

    fn raw_window(&self, prices: &[f64], predata: &[f64], t: usize) -> Vec<f64> {
        let mut window = Vec::with_capacity(self.window_size);
        let missing = self.window_size.saturating_sub(t + 1);
        if missing > 0 {
            let from_predata = missing.min(predata.len());
            window.extend(std::iter::repeat(prices[0]).take(missing - from_predata));
            window.extend_from_slice(&predata[predata.len() - from_predata..]);
        }
        window.extend_from_slice(&prices[(t + 1).saturating_sub(self.window_size)..=t]);
        window
    }

    fn squash(&self, value: f64) -> f32 {
        (value / self.tanh_scale).tanh() as f32
    }

    fn utility(&self, price: f64, position: &PositionSnapshot) -> [f32; UTILITY_FEATURES] {
        let holding = position.bought_price.is_some();
        let can_afford = !holding && position.balance - self.trade_cost > price;
        let hold_norm =
            (position.n_holds as f64 / self.max_holds.max(MIN_HOLD_NORMALIZER)).min(1.0);

        let (profit, buy_signal, sell_signal) = match (position.bought_price, position.sold_price) {
            (Some(bought), _) => {
                let profit = price - bought - self.trade_cost;
                (profit, false, bought + self.trade_cost < price)
            }
            (None, Some(sold)) => {
                let profit = sold - price - self.trade_cost;
                (profit, sold - self.trade_cost > price, false)
            }
            (None, None) => (0.0, false, false),
        };

        [
            flag(can_afford),
            hold_norm as f32,
            flag(holding),
            flag(buy_signal),
            flag(sell_signal),
            (profit / price) as f32,
        ]
    }
}

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

//! Price series provider

use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::error::{Result, RlError};

/// Closing prices, oldest first, plus the lookback used only for
/// initial observation context
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    prices: Vec<f64>,
    predata: Vec<f64>,
}

/// On-disk layouts accepted by [`PriceSeries::load_json`]
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceFile {
    Closes(Vec<f64>),
    Table {
        close: Vec<f64>,
        #[serde(default)]
        newest_first: bool,
    },
}

impl PriceSeries {
    pub fn new(prices: Vec<f64>, predata: Vec<f64>) -> Result<Self> {
        if prices.len() < 2 {
            return Err(RlError::Configuration(format!(
                "price series needs at least 2 prices, got {}",
                prices.len()
            )));
        }
        if let Some(bad) = prices
            .iter()
            .chain(predata.iter())
            .find(|p| !p.is_finite() || **p <= 0.0)
        {
            return Err(RlError::Configuration(format!(
                "prices must be positive and finite, found {bad}"
            )));
        }
        Ok(Self { prices, predata })
    }

    /// Split the first `lookback` closes off as predata
    pub fn from_closes(mut closes: Vec<f64>, lookback: usize) -> Result<Self> {
        if closes.len() <= lookback {
            return Err(RlError::Configuration(format!(
                "{} closes cannot cover a lookback of {}",
                closes.len(),
                lookback
            )));
        }
        let prices = closes.split_off(lookback);
        Self::new(prices, closes)
    }

    /// Load closes from a JSON array or a `{ "close": [...], "newest_first": bool }` table
    pub fn load_json<P: AsRef<Path>>(path: P, lookback: usize) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut closes = match serde_json::from_str::<PriceFile>(&raw)? {
            PriceFile::Closes(closes) => closes,
            PriceFile::Table {
                mut close,
                newest_first,
            } => {
                if newest_first {
                    close.reverse();
                }
                close
            }
        };
        closes.shrink_to_fit();

        let series = Self::from_closes(closes, lookback)?;
        info!(
            path = %path.display(),
            prices = series.len(),
            predata = series.predata.len(),
            "Loaded price series"
        );
        Ok(series)
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn predata(&self) -> &[f64] {
        &self.predata
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn price(&self, t: usize) -> f64 {
        self.prices[t]
    }

    /// Price one step earlier, reaching into predata at `t = 0`
    pub fn prev_price(&self, t: usize) -> f64 {
        match t.checked_sub(1) {
            Some(prev) => self.prices[prev],
            None => self.predata.last().copied().unwrap_or(self.prices[0]),
        }
    }

    /// Price one step later, clamped at the end of the series
    pub fn next_price(&self, t: usize) -> f64 {
        self.prices[(t + 1).min(self.prices.len() - 1)]
    }

    /// Cheapest price strictly after `t`
    pub fn min_future(&self, t: usize) -> Option<f64> {
        self.prices
            .get(t + 1..)
            .and_then(|rest| rest.iter().copied().reduce(f64::min))
    }

    /// Growth of holding `n_budget` units bought at `start`, for each step in `start..end`
    pub fn buy_and_hold(&self, start: usize, end: usize, n_budget: usize) -> Vec<f64> {
        let entry = self.prices[start];
        self.prices[start..end]
            .iter()
            .map(|p| n_budget as f64 * (p - entry))
            .collect()
    }
}

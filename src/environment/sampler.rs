//! Curriculum episode-start sampler
//!
//! Training episodes start inside a window around `offset` that widens by
//! `expand` every curriculum step. Freshly unlocked edges of the window are
//! boosted so new regions get sampled right after they open up.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::config::SamplerConfig;
use crate::error::{Result, RlError};

/// Curriculum steps beyond this one sample like this one
pub const MAX_CURRICULUM_STEP: usize = 10;

/// Half-open range of admissible start indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRange {
    pub start: usize,
    pub end: usize,
}

impl StartRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }
}

#[derive(Debug, Clone)]
pub struct EpisodeSampler {
    offset: usize,
    expand: usize,
    episode_window: usize,
    episodes_per_step: usize,
    /// Earliest start with a full observation window behind it
    min_start: usize,
}

impl EpisodeSampler {
    pub fn new(config: &SamplerConfig, window_size: usize) -> Self {
        Self {
            offset: config.offset,
            expand: config.expand,
            episode_window: config.episode_window,
            episodes_per_step: config.episodes_per_step.max(1),
            min_start: window_size.saturating_sub(1),
        }
    }

    pub fn episode_window(&self) -> usize {
        self.episode_window
    }

    /// Curriculum step of a training episode, starting at 1
    pub fn curriculum_step(&self, episode: usize) -> usize {
        1 + episode / self.episodes_per_step
    }

    /// Admissible start range at curriculum `step`
    pub fn range(&self, step: usize, series_len: usize) -> Result<StartRange> {
        let step = step.min(MAX_CURRICULUM_STEP);
        let reach = step * self.expand;
        let center = self.min_start.max(self.offset);
        let extra = reach.saturating_sub(self.offset);
        let last_start = self.last_start(series_len)?;

        let range = StartRange {
            start: center.saturating_sub(reach).max(self.min_start),
            end: (center + reach + extra).min(last_start),
        };
        if range.is_empty() {
            return Err(RlError::Configuration(format!(
                "empty episode start range [{}, {}) for a series of {} prices",
                range.start, range.end, series_len
            )));
        }
        Ok(range)
    }

    /// Starts must leave a full episode plus one horizon price
    fn last_start(&self, series_len: usize) -> Result<usize> {
        series_len
            .checked_sub(self.episode_window + 1)
            .ok_or_else(|| {
                RlError::Configuration(format!(
                    "series of {} prices is shorter than an episode of {}",
                    series_len, self.episode_window
                ))
            })
    }

    /// Normalized sampling weights over `range(step)`
    pub fn weights(&self, step: usize, series_len: usize) -> Result<(StartRange, Vec<f64>)> {
        let step = step.min(MAX_CURRICULUM_STEP);
        let range = self.range(step, series_len)?;
        let n = range.len();
        let boost = step;
        let base = 1.0 / (n + 2 * self.expand * boost) as f64;
        let mut weights = vec![base; n];

        let extra = (step * self.expand).saturating_sub(self.offset);
        let clamped = range.start == self.min_start || range.end == self.last_start(series_len)?;
        if !clamped {
            if extra == 0 {
                let edge = self.expand.min(n);
                weights[..edge].iter_mut().for_each(|w| *w *= boost as f64);
                weights[n - edge..].iter_mut().for_each(|w| *w *= boost as f64);
            } else {
                let edge = (2 * self.expand).min(n);
                weights[n - edge..].iter_mut().for_each(|w| *w *= boost as f64);
            }
        }

        let total: f64 = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= total);
        Ok((range, weights))
    }

    /// Draw the start index for training `episode`
    pub fn sample<R: Rng + ?Sized>(
        &self,
        episode: usize,
        series_len: usize,
        rng: &mut R,
    ) -> Result<usize> {
        let step = self.curriculum_step(episode);
        let (range, weights) = self.weights(step, series_len)?;
        let dist = WeightedIndex::new(&weights)
            .map_err(|e| RlError::Configuration(format!("invalid start weights: {e}")))?;
        Ok(range.start + dist.sample(rng))
    }
}

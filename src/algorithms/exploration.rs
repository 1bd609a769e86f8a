//! Deadlock breaking exploration
//!
//! A policy that settles on HOLD stops producing trade transitions. During
//! training a HOLD can be swapped for a random trade, but only one the
//! environment would accept, so the swap never earns an impossible-action
//! penalty.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use tracing::trace;

use crate::core::Action;

#[derive(Debug, Clone, Copy)]
pub struct DeadlockBreaker {
    /// Probability of each of BUY and SELL
    trade_prob: f64,
}

impl DeadlockBreaker {
    pub fn new(trade_prob: f64) -> Self {
        Self {
            trade_prob: trade_prob.clamp(0.0, 0.5),
        }
    }

    /// Resample a HOLD among `[HOLD, BUY, SELL]` with weights `[1 - 2p, p, p]`
    ///
    /// Other actions pass through. A drawn trade that `is_legal` rejects
    /// falls back to HOLD.
    pub fn apply<R, F>(&self, action: Action, is_legal: F, rng: &mut R) -> Action
    where
        R: Rng + ?Sized,
        F: Fn(Action) -> bool,
    {
        if action != Action::Hold {
            return action;
        }
        let p = self.trade_prob;
        let drawn = WeightedIndex::new([1.0 - 2.0 * p, p, p])
            .ok()
            .and_then(|dist| Action::from_index(dist.sample(rng)))
            .unwrap_or(Action::Hold);

        if drawn != Action::Hold && is_legal(drawn) {
            trace!(?drawn, "Deadlock breaker replaced HOLD");
            drawn
        } else {
            Action::Hold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_trades_pass_through() {
        let breaker = DeadlockBreaker::new(0.5);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(breaker.apply(Action::Buy, |_| false, &mut rng), Action::Buy);
        assert_eq!(breaker.apply(Action::Sell, |_| false, &mut rng), Action::Sell);
    }

    #[test]
    fn test_zero_probability_keeps_hold() {
        let breaker = DeadlockBreaker::new(0.0);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(breaker.apply(Action::Hold, |_| true, &mut rng), Action::Hold);
        }
    }

    #[test]
    fn test_illegal_draws_fall_back_to_hold() {
        let breaker = DeadlockBreaker::new(0.5);
        let mut rng = StdRng::seed_from_u64(2);
        let mut sells = 0;
        for _ in 0..200 {
            let action = breaker.apply(Action::Hold, |a| a == Action::Sell, &mut rng);
            assert_ne!(action, Action::Buy);
            if action == Action::Sell {
                sells += 1;
            }
        }
        assert!(sells > 50);
    }
}

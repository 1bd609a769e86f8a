//! Simulated Trading Environment
//!
//! Price series, the FLAT/HOLDING portfolio state machine and the
//! curriculum sampler choosing where training episodes start.

mod sampler;
mod series;
mod trading;

pub use sampler::{EpisodeSampler, StartRange, MAX_CURRICULUM_STEP};
pub use series::PriceSeries;
pub use trading::{
    EpisodeCounters, Portfolio, StepContext, StepOutcome, TerminationReason, TradingEnvConfig,
    TradingEnvironment,
};

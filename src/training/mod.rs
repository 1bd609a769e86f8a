//! Training
//!
//! Episode loop, statistics and checkpoint persistence.

pub mod checkpointing;
pub mod stats;
pub mod trainer;

pub use checkpointing::{episode_name, timestamped_name, CheckpointStore, Persistence};
pub use stats::{EpisodeRecorder, EpisodeSummary, EpisodeTrace, RunStatistics, PADDED_ACTION};
pub use trainer::{Agent, EvaluationReport};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::reward::{RewardParams, RewardSwitch, RewardVariant};
use crate::error::{Result, RlError};

/// Main run configuration
///
/// Every recognized option is declared here; unknown keys are rejected when
/// the configuration is deserialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub agent: AgentConfig,
    pub reward: RewardConfig,
    pub state: StateConfig,
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    pub training: TrainingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Replay buffer capacity
    pub buffer_size: usize,
    /// Minibatch size for learning steps
    pub batch_size: usize,
    /// Discount factor (gamma)
    pub gamma: f64,
    /// Soft update rate for target networks
    pub tau: f64,
    /// Cost charged by the environment per executed trade
    pub trade_cost: f64,
    /// Cost reported in growth statistics per executed trade
    #[serde(default)]
    pub trade_cost_actual: f64,
    /// Units bought at episode start
    #[serde(default = "default_n_budget")]
    pub n_budget: usize,
    /// Impossible actions tolerated before an episode is abandoned
    pub terminal_threshold: usize,
    /// Enable the training-time termination check
    #[serde(default)]
    pub early_termination: bool,
    /// Probability mass for each trade action when breaking HOLD deadlocks
    #[serde(default)]
    pub deadlock_prob: Option<f64>,
    /// Seed for exploration, replay sampling and episode starts
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_n_budget() -> usize {
    1
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100_000,
            batch_size: 32,
            gamma: 0.99,
            tau: 0.001,
            trade_cost: 3.0,
            trade_cost_actual: 3.0,
            n_budget: 1,
            terminal_threshold: 50,
            early_termination: true,
            deadlock_prob: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewardConfig {
    /// Active reward variant (0-7)
    pub variant: RewardVariant,
    /// Hold penalty scale
    pub hold_scale: f64,
    /// Hold streak after which the hold penalty turns negative
    pub max_holds: f64,
    /// Exponent applied to the policy's arg-max probability
    pub prob_power: f64,
    /// Optional variant switch at an episode boundary
    #[serde(default)]
    pub switch: Option<RewardSwitch>,
}

impl RewardConfig {
    pub fn params(&self) -> RewardParams {
        RewardParams {
            hold_scale: self.hold_scale,
            max_holds: self.max_holds,
            prob_power: self.prob_power,
        }
    }

    /// Variant in force at `start_episode`
    ///
    /// A run resumed after the switch episode starts on `switch.to`.
    pub fn active_variant(&self, start_episode: usize) -> RewardVariant {
        match &self.switch {
            Some(switch) if start_episode > switch.at_episode => switch.to,
            _ => self.variant,
        }
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            variant: RewardVariant::ShapedHoldProfit,
            hold_scale: 10.0,
            max_holds: 100.0,
            prob_power: 0.2,
            switch: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    /// Trailing price window; the series channel holds `window_size - 1` values
    pub window_size: usize,
    /// Divisor applied before the tanh squashing
    pub tanh_scale: f64,
    /// Use first differences instead of price levels
    #[serde(default = "default_true")]
    pub use_returns: bool,
    /// Zero out window entries older than the current hold streak
    #[serde(default)]
    pub mask_input: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            window_size: 11,
            tanh_scale: 80.0,
            use_returns: true,
            mask_input: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplerConfig {
    /// Center of the initial start range
    pub offset: usize,
    /// Radius increment per curriculum step
    pub expand: usize,
    /// Steps per training episode
    pub episode_window: usize,
    /// Episodes per curriculum step
    pub episodes_per_step: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            offset: 300,
            expand: 25,
            episode_window: 100,
            episodes_per_step: 10,
        }
    }
}

/// Layer sizes and learning rates of the Burn approximators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub actor_series_layers: Vec<usize>,
    pub actor_utility_layers: Vec<usize>,
    pub actor_combined_layers: Vec<usize>,
    pub critic_series_layers: Vec<usize>,
    pub critic_utility_layers: Vec<usize>,
    pub critic_combined_layers: Vec<usize>,
    pub critic_action_layers: Vec<usize>,
    pub critic_final_layers: Vec<usize>,
    pub actor_lr: f64,
    pub critic_lr: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            actor_series_layers: vec![64, 32],
            actor_utility_layers: vec![16],
            actor_combined_layers: vec![32],
            critic_series_layers: vec![64, 32],
            critic_utility_layers: vec![16],
            critic_combined_layers: vec![32],
            critic_action_layers: vec![16],
            critic_final_layers: vec![32],
            actor_lr: 1e-5,
            critic_lr: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    /// Episode index to stop before
    pub episodes: usize,
    /// Episode index to resume from (0 = fresh run)
    #[serde(default)]
    pub start_episode: usize,
    /// Directory for network, buffer and statistics checkpoints
    pub checkpoint_dir: String,
    /// Checkpoint frequency in episodes (0 disables periodic saves)
    #[serde(default)]
    pub checkpoint_frequency: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 500,
            start_episode: 0,
            checkpoint_dir: "./checkpoints".to_string(),
            checkpoint_frequency: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directives used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Also write daily-rolling logs under the checkpoint directory
    #[serde(default)]
    pub file: bool,
}

fn default_log_level() -> String {
    "info,ddpg_trader=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: false,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            reward: RewardConfig::default(),
            state: StateConfig::default(),
            sampler: SamplerConfig::default(),
            network: NetworkConfig::default(),
            training: TrainingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load run-specific config (e.g., config/experiment.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DDPG_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (DDPG__AGENT__TAU, etc.)
            .add_source(
                Environment::with_prefix("DDPG")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: RunConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(RlError::invalid_config)?;
        Ok(config)
    }

    /// Load configuration from a single file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: RunConfig = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        config.validate().map_err(RlError::invalid_config)?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let agent = &self.agent;

        if agent.batch_size == 0 {
            errors.push("batch_size must be positive".to_string());
        }
        if agent.buffer_size < agent.batch_size {
            errors.push(format!(
                "buffer_size ({}) must be at least batch_size ({})",
                agent.buffer_size, agent.batch_size
            ));
        }
        if !(0.0..=1.0).contains(&agent.gamma) {
            errors.push("gamma must be between 0 and 1".to_string());
        }
        if !(0.0..=1.0).contains(&agent.tau) {
            errors.push("tau must be between 0 and 1".to_string());
        }
        if agent.trade_cost < 0.0 || agent.trade_cost_actual < 0.0 {
            errors.push("trade costs must be non-negative".to_string());
        }
        if agent.n_budget != 1 {
            errors.push(format!(
                "n_budget must be 1 for single-unit trading, got {}",
                agent.n_budget
            ));
        }
        if agent.early_termination && agent.terminal_threshold == 0 {
            errors.push(
                "terminal_threshold must be positive when early_termination is enabled"
                    .to_string(),
            );
        }
        if let Some(p) = agent.deadlock_prob {
            if !(0.0..=0.5).contains(&p) {
                errors.push("deadlock_prob must be between 0 and 0.5".to_string());
            }
        }

        if self.reward.hold_scale < 0.0 {
            errors.push("hold_scale must be non-negative".to_string());
        }
        if self.reward.prob_power < 0.0 {
            errors.push("prob_power must be non-negative".to_string());
        }
        if let Some(switch) = &self.reward.switch {
            let variant = self.reward.variant;
            let already_switched = self.training.start_episode > switch.at_episode;
            if variant != switch.from && !(already_switched && variant == switch.to) {
                errors.push(format!(
                    "reward switch expects variant {} but run starts with {}",
                    switch.from.id(),
                    variant.id()
                ));
            }
        }

        if self.state.window_size < 2 {
            errors.push("window_size must be at least 2".to_string());
        }
        if self.state.tanh_scale <= 0.0 {
            errors.push("tanh_scale must be positive".to_string());
        }

        if self.sampler.expand == 0 {
            errors.push("sampler.expand must be positive".to_string());
        }
        if self.sampler.episode_window == 0 {
            errors.push("sampler.episode_window must be positive".to_string());
        }
        if self.sampler.episodes_per_step == 0 {
            errors.push("sampler.episodes_per_step must be positive".to_string());
        }

        if self.network.actor_lr <= 0.0 || self.network.critic_lr <= 0.0 {
            errors.push("learning rates must be positive".to_string());
        }

        if self.training.start_episode > self.training.episodes {
            errors.push("start_episode must not exceed episodes".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

//! Training Loop
//!
//! The agent owns the learner, replay buffer and trading environment and
//! drives them step by step: act, apply, store, learn, soft-update.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::checkpointing::Persistence;
use super::stats::{EpisodeRecorder, EpisodeSummary, EpisodeTrace, RunStatistics};
use crate::algorithms::{DdpgConfig, DdpgLearner, DeadlockBreaker};
use crate::config::RunConfig;
use crate::core::{argmax, select_decision, Action, RewardEngine, RewardSwitch, StateBuilder};
use crate::environment::{
    EpisodeSampler, PriceSeries, StepContext, TradingEnvConfig, TradingEnvironment,
};
use crate::error::{Result, RlError};
use crate::memory::{ReplayBuffer, Transition};
use crate::networks::{PolicyApproximator, ValueApproximator};

/// Result of evaluating the greedy policy over a full series
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    /// Cash the first pass needed to keep trading
    pub extra_cash: f64,
    /// 1, or 2 when the run was repeated with the extra cash injected
    pub passes: usize,
    pub summary: EpisodeSummary,
    pub trace: EpisodeTrace,
}

/// DDPG trading agent
pub struct Agent<P, V> {
    learner: DdpgLearner<P, V>,
    memory: ReplayBuffer,
    env: TradingEnvironment,
    sampler: EpisodeSampler,
    deadlock: Option<DeadlockBreaker>,
    reward_switch: Option<RewardSwitch>,
    rng: StdRng,
    batch_size: usize,
    trade_cost_actual: f64,
    checkpoint_frequency: usize,
    stats: RunStatistics,
}

impl<P: PolicyApproximator, V: ValueApproximator> Agent<P, V> {
    /// Build an agent training on `series`
    ///
    /// Targets are synchronized to the locals before the first step.
    pub fn new(
        config: &RunConfig,
        series: PriceSeries,
        actor_local: P,
        actor_target: P,
        critic_local: V,
        critic_target: V,
    ) -> Result<Self> {
        config.validate().map_err(RlError::invalid_config)?;

        let agent = &config.agent;
        let learner = DdpgLearner::new(
            actor_local,
            actor_target,
            critic_local,
            critic_target,
            DdpgConfig {
                gamma: agent.gamma,
                tau: agent.tau,
            },
        )?;

        let variant = config.reward.active_variant(config.training.start_episode);
        if variant != config.reward.variant {
            info!(
                configured = config.reward.variant.id(),
                active = variant.id(),
                start_episode = config.training.start_episode,
                "Resuming after reward switch"
            );
        }
        let env = TradingEnvironment::new(
            series,
            env_config(config),
            RewardEngine::new(variant, config.reward.params()),
            StateBuilder::new(&config.state, agent.trade_cost, config.reward.max_holds),
            true,
        );
        let sampler = EpisodeSampler::new(&config.sampler, config.state.window_size);

        let rng = match agent.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            buffer_size = agent.buffer_size,
            batch_size = agent.batch_size,
            gamma = agent.gamma,
            tau = agent.tau,
            reward = variant.id(),
            "Agent initialized"
        );

        Ok(Self {
            learner,
            memory: ReplayBuffer::new(agent.buffer_size),
            env,
            sampler,
            deadlock: agent.deadlock_prob.map(DeadlockBreaker::new),
            reward_switch: config.reward.switch,
            rng,
            batch_size: agent.batch_size,
            trade_cost_actual: agent.trade_cost_actual,
            checkpoint_frequency: config.training.checkpoint_frequency,
            stats: RunStatistics::default(),
        })
    }

    pub fn learner(&self) -> &DdpgLearner<P, V> {
        &self.learner
    }

    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    pub fn environment(&self) -> &TradingEnvironment {
        &self.env
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    /// Run one training episode starting at a curriculum-sampled index
    pub fn run_episode(&mut self, episode: usize) -> Result<EpisodeSummary> {
        let start = self
            .sampler
            .sample(episode, self.env.series().len(), &mut self.rng)?;
        let trace = self.run_training_episode(episode, start)?;
        let summary = self.stats.push(episode, trace).clone();

        info!(
            episode,
            start,
            total_reward = summary.total_reward,
            trades = summary.n_trades,
            impossible = summary.n_impossible,
            trade_ratio = summary.trade_ratio,
            growth = summary.final_growth,
            loss = summary.last_loss,
            "Episode complete"
        );
        Ok(summary)
    }

    /// Training episode over `[start, start + episode_window)`
    pub fn run_training_episode(&mut self, episode: usize, start: usize) -> Result<EpisodeTrace> {
        if let Some(switch) = self.reward_switch {
            self.env.apply_reward_switch(&switch, episode)?;
        }

        let end = start + self.sampler.episode_window();
        if end >= self.env.series().len() {
            return Err(RlError::Configuration(format!(
                "episode [{start}, {end}) leaves no horizon price in a series of {}",
                self.env.series().len()
            )));
        }

        self.env.set_training(true);
        self.env.begin_episode(start);
        let mut recorder = EpisodeRecorder::new(
            start,
            self.env.portfolio().budget,
            self.env
                .series()
                .buy_and_hold(start, end, self.env.portfolio().n_budget),
            self.trade_cost_actual,
        );

        let mut state = self.env.observe(start);
        for t in start..end {
            let probs = self.learner.act(&state)?;
            let decision = select_decision(&probs, true, &mut self.rng);
            let mut action = Action::from_decision(decision, self.env.portfolio().holding());
            if let Some(breaker) = self.deadlock {
                let env = &self.env;
                action = breaker.apply(action, |a| env.is_legal(a, t), &mut self.rng);
            }

            let last = t + 1 == end;
            let outcome = self.env.step(&StepContext {
                t,
                action,
                action_probs: probs,
                last,
            });
            let next_state = self.env.observe(t + 1);
            let done = last || outcome.terminated();

            self.memory.add(Transition::new(
                state,
                outcome.action,
                outcome.reward,
                next_state.clone(),
                done,
            ));

            if self.memory.has_enough_samples(self.batch_size) {
                let batch = self.memory.sample(self.batch_size, &mut self.rng)?;
                self.learner.learn(&batch)?;
            } else {
                trace!(
                    available = self.memory.len(),
                    batch_size = self.batch_size,
                    "Replay warm-up, skipping update"
                );
            }

            recorder.record(
                t,
                &outcome,
                self.env.portfolio(),
                self.env.counters(),
                self.learner.last_actor_loss(),
            );

            if let Some(reason) = outcome.termination {
                debug!(episode, t, %reason, "Padding terminated episode");
                recorder.pad_to(end - start);
                break;
            }
            state = next_state;
        }

        self.env.end_episode();
        Ok(recorder.finish())
    }

    /// Train episodes `[start_episode, episodes)`, checkpointing periodically
    /// and after the last episode
    pub fn train(
        &mut self,
        start_episode: usize,
        episodes: usize,
        mut persistence: Option<&mut dyn Persistence>,
    ) -> Result<Vec<EpisodeSummary>> {
        info!(start_episode, episodes, "Starting training");
        let mut summaries = Vec::with_capacity(episodes.saturating_sub(start_episode));

        for episode in start_episode..episodes {
            summaries.push(self.run_episode(episode)?);

            let periodic = self.checkpoint_frequency > 0
                && (episode + 1) % self.checkpoint_frequency == 0;
            if let Some(store) = persistence.as_deref_mut() {
                if periodic || episode + 1 == episodes {
                    self.save_checkpoint(store, episode)?;
                }
            }
        }

        info!(
            episodes = summaries.len(),
            mean_reward = self.stats.recent_mean_reward(summaries.len()),
            learn_steps = self.learner.learn_steps(),
            "Training complete"
        );
        Ok(summaries)
    }

    /// Persist networks, replay buffer and statistics after `episode`
    pub fn save_checkpoint(&self, store: &mut dyn Persistence, episode: usize) -> Result<()> {
        store.save_networks(episode, &self.learner.network_params())?;
        store.save_buffer(&self.memory.snapshot())?;
        store.save_statistics(&self.stats)?;
        debug!(episode, "Checkpoint saved");
        Ok(())
    }

    /// Restore networks saved at `episode`, the replay buffer and the run
    /// statistics up to `episode`
    pub fn resume_from(&mut self, store: &dyn Persistence, episode: usize) -> Result<()> {
        let params = store.load_networks(episode)?;
        self.learner.load_network_params(&params)?;
        self.memory.restore(store.load_buffer()?)?;
        let mut stats = store.load_statistics()?;
        stats.truncate_after(episode);
        self.stats = stats;
        info!(
            episode,
            transitions = self.memory.total_added(),
            episodes = self.stats.len(),
            "Resumed from checkpoint"
        );
        Ok(())
    }

    /// Load networks only, for evaluating a saved episode
    pub fn load_networks(&mut self, store: &dyn Persistence, episode: usize) -> Result<()> {
        let params = store.load_networks(episode)?;
        self.learner.load_network_params(&params)
    }

    /// Greedy evaluation over all of `series`
    ///
    /// Runs once; if cash corrections were needed the run is repeated with
    /// the recorded extra cash injected up front, and the second pass is
    /// reported.
    pub fn evaluate(&mut self, series: &PriceSeries) -> Result<EvaluationReport> {
        let mut env = TradingEnvironment::new(
            series.clone(),
            TradingEnvConfig {
                early_termination: false,
                ..self.env_config()
            },
            self.env.reward_engine().clone(),
            self.env.state_builder().clone(),
            false,
        );

        let first = self.evaluation_pass(&mut env, 0.0)?;
        let (trace, passes) = if first.extra_cash > 0.0 {
            warn!(
                extra_cash = first.extra_cash,
                "Evaluation needed extra cash, repeating with cash injected"
            );
            (self.evaluation_pass(&mut env, first.extra_cash)?, 2)
        } else {
            (first.clone(), 1)
        };

        let summary = EpisodeSummary::from_trace(0, &trace);
        info!(
            passes,
            extra_cash = first.extra_cash,
            trades = summary.n_trades,
            growth = summary.final_growth,
            compete = summary.final_compete,
            "Evaluation complete"
        );
        Ok(EvaluationReport {
            extra_cash: first.extra_cash,
            passes,
            summary,
            trace,
        })
    }

    fn evaluation_pass(&self, env: &mut TradingEnvironment, extra_cash: f64) -> Result<EpisodeTrace> {
        let len = env.series().len();
        env.begin_episode(0);
        if extra_cash > 0.0 {
            env.inject_cash(extra_cash);
        }
        let mut recorder = EpisodeRecorder::new(
            0,
            env.portfolio().budget,
            env.series().buy_and_hold(0, len, env.portfolio().n_budget),
            self.trade_cost_actual,
        );

        for t in 0..len {
            let state = env.observe(t);
            let probs = self.learner.act(&state)?;
            let decision = argmax(&probs);
            let action = Action::from_decision(decision, env.portfolio().holding());
            let outcome = env.step(&StepContext {
                t,
                action,
                action_probs: probs,
                last: t + 1 == len,
            });
            recorder.record(
                t,
                &outcome,
                env.portfolio(),
                env.counters(),
                self.learner.last_actor_loss(),
            );
        }

        env.end_episode();
        Ok(recorder.finish())
    }

    fn env_config(&self) -> TradingEnvConfig {
        self.env.config().clone()
    }
}

fn env_config(config: &RunConfig) -> TradingEnvConfig {
    TradingEnvConfig {
        trade_cost: config.agent.trade_cost,
        n_budget: config.agent.n_budget,
        terminal_threshold: config.agent.terminal_threshold,
        early_termination: config.agent.early_termination,
    }
}

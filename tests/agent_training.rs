//! Agent-level training, checkpointing and evaluation

mod common;

use common::{small_config, wavy_prices, FixedPolicy, ZeroCritic};
use ddpg_trader::algorithms::soft_update;
use ddpg_trader::core::{RewardSwitch, RewardVariant};
use ddpg_trader::environment::{EpisodeSampler, TerminationReason};
use ddpg_trader::training::{Persistence, PADDED_ACTION};
use ddpg_trader::{Agent, CheckpointStore, PriceSeries, RunConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::env::temp_dir;
use std::fs;
use std::path::PathBuf;

fn scratch(name: &str) -> PathBuf {
    let dir = temp_dir().join(format!("ddpg-it-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn agent(
    config: &RunConfig,
    prices: Vec<f64>,
    probs: [f32; 2],
) -> Agent<FixedPolicy, ZeroCritic> {
    Agent::new(
        config,
        PriceSeries::new(prices, vec![]).unwrap(),
        FixedPolicy::new(probs, vec![0.1, 0.2, 0.3]),
        FixedPolicy::new(probs, vec![0.0, 0.0, 0.0]),
        ZeroCritic::new(vec![1.0, -1.0]),
        ZeroCritic::new(vec![0.0, 0.0]),
    )
    .unwrap()
}

#[test]
fn targets_start_synchronized() {
    let config = small_config();
    let agent = agent(&config, wavy_prices(40), [0.6, 0.4]);
    let params = agent.learner().network_params();
    assert_eq!(params.actor_target, params.actor_local);
    assert_eq!(params.critic_target, params.critic_local);
}

#[test]
fn learning_waits_for_a_full_batch() {
    let config = small_config();
    let mut agent = agent(&config, wavy_prices(40), [0.6, 0.4]);

    agent.run_episode(0).unwrap();
    assert_eq!(agent.memory().len(), 5);
    assert_eq!(agent.learner().learn_steps(), 0);

    agent.run_episode(1).unwrap();
    assert_eq!(agent.memory().len(), 10);
    // Transitions 8, 9 and 10 each trigger an update
    assert_eq!(agent.learner().learn_steps(), 3);
    assert_eq!(agent.learner().last_actor_loss(), 0.25);
}

#[test]
fn episode_statistics_are_recorded() {
    let config = small_config();
    let mut agent = agent(&config, wavy_prices(40), [0.3, 0.7]);
    let summaries = agent.train(0, 3, None).unwrap();

    assert_eq!(summaries.len(), 3);
    let stats = agent.statistics();
    assert_eq!(stats.len(), 3);
    for key in ["e0", "e1", "e2"] {
        let trace = &stats.episodes[key];
        assert_eq!(trace.actions.len(), 5);
        assert_eq!(trace.balances.len(), 5);
        assert_eq!(trace.growth.len(), 5);
    }
}

#[test]
fn checkpoint_and_resume_roundtrip() {
    let dir = scratch("resume");
    let config = small_config();

    let mut store = CheckpointStore::create(&dir).unwrap();
    let mut first = agent(&config, wavy_prices(40), [0.5, 0.5]);
    first.train(0, 2, Some(&mut store)).unwrap();
    assert_eq!(store.list_episodes(), vec![0, 1]);

    let saved = store.load_networks(1).unwrap();
    assert_eq!(saved, first.learner().network_params());

    let reopened = CheckpointStore::open(&dir).unwrap();
    let mut resumed = agent(&config, wavy_prices(40), [0.5, 0.5]);
    resumed.resume_from(&reopened, 1).unwrap();

    assert_eq!(resumed.learner().network_params(), saved);
    assert_eq!(resumed.memory().total_added(), 10);
    assert_eq!(resumed.memory().len(), first.memory().len());
    let episodes = |agent: &Agent<FixedPolicy, ZeroCritic>| -> Vec<(usize, usize)> {
        agent
            .statistics()
            .summaries
            .iter()
            .map(|s| (s.episode, s.start))
            .collect()
    };
    assert_eq!(episodes(&resumed), episodes(&first));

    resumed.train(2, 3, Some(&mut store)).unwrap();
    assert_eq!(store.latest_episode(), Some(2));

    // The saved statistics keep the episodes trained before the resume
    let stats = store.load_statistics().unwrap();
    assert_eq!(stats.len(), 3);
    for key in ["e0", "e1", "e2"] {
        assert!(stats.episodes.contains_key(key), "missing {key}");
    }
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn resume_from_earlier_checkpoint_drops_later_statistics() {
    let dir = scratch("rewind");
    let config = small_config();

    let mut store = CheckpointStore::create(&dir).unwrap();
    let mut first = agent(&config, wavy_prices(40), [0.5, 0.5]);
    first.train(0, 3, Some(&mut store)).unwrap();

    let mut resumed = agent(&config, wavy_prices(40), [0.5, 0.5]);
    resumed.resume_from(&store, 0).unwrap();
    assert_eq!(resumed.statistics().len(), 1);
    assert!(resumed.statistics().episodes.contains_key("e0"));
    assert!(!resumed.statistics().episodes.contains_key("e2"));
    fs::remove_dir_all(&dir).unwrap();
}

fn switched_config(configured: RewardVariant, start_episode: usize) -> RunConfig {
    let mut config = small_config();
    config.reward.variant = configured;
    config.reward.switch = Some(RewardSwitch {
        from: RewardVariant::Clamped,
        to: RewardVariant::Unclamped,
        at_episode: 1,
    });
    config.training.start_episode = start_episode;
    config.training.episodes = 5;
    config
}

#[test]
fn fresh_run_switches_reward_at_the_directive_episode() {
    let config = switched_config(RewardVariant::Clamped, 0);
    let mut agent = agent(&config, wavy_prices(40), [0.5, 0.5]);
    assert_eq!(
        agent.environment().reward_engine().variant(),
        RewardVariant::Clamped
    );

    agent.train(0, 1, None).unwrap();
    assert_eq!(
        agent.environment().reward_engine().variant(),
        RewardVariant::Clamped
    );
    agent.train(1, 2, None).unwrap();
    assert_eq!(
        agent.environment().reward_engine().variant(),
        RewardVariant::Unclamped
    );
}

#[test]
fn resume_after_switch_episode_uses_switched_reward() {
    for configured in [RewardVariant::Clamped, RewardVariant::Unclamped] {
        let config = switched_config(configured, 3);
        let mut agent = agent(&config, wavy_prices(40), [0.5, 0.5]);
        assert_eq!(
            agent.environment().reward_engine().variant(),
            RewardVariant::Unclamped,
            "configured {configured:?}"
        );

        let summaries = agent.train(3, 5, None).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(
            agent.environment().reward_engine().variant(),
            RewardVariant::Unclamped
        );
    }
}

#[test]
fn early_termination_pads_the_training_trace() {
    let mut config = small_config();
    config.agent.early_termination = true;
    config.agent.terminal_threshold = 1;
    // Flat prices: the opening unit sells at 100, then 100 in cash cannot buy
    let mut agent = agent(&config, vec![100.0; 40], [0.0, 1.0]);

    let trace = agent.run_training_episode(0, 10).unwrap();
    assert_eq!(trace.termination, Some(TerminationReason::TooManyImpossibles));
    assert_eq!(trace.sell_indices, vec![10]);
    assert_eq!(trace.impossible_indices, vec![11]);
    assert_eq!(trace.actions.len(), 5);
    assert!(trace.actions[2..].iter().all(|a| *a == PADDED_ACTION));
    assert_eq!(trace.balances, vec![100.0; 5]);
    assert_eq!(trace.rewards.len(), 5);
    assert!(trace.rewards[2..].iter().all(|r| *r == 0.0));
    // Steps after the termination never reach the replay buffer
    assert_eq!(agent.memory().len(), 2);
    assert!(!agent.environment().reward_engine().in_episode());
}

#[test]
fn early_termination_when_balance_cannot_cover_future_prices() {
    let mut config = small_config();
    config.agent.early_termination = true;
    config.agent.terminal_threshold = 1;
    let rising: Vec<f64> = (0..40).map(|t| 100.0 + t as f64).collect();
    let mut agent = agent(&config, rising, [0.0, 1.0]);

    let trace = agent.run_training_episode(0, 10).unwrap();
    assert_eq!(trace.termination, Some(TerminationReason::InsufficientBalance));
    assert_eq!(trace.actions, vec![2, -1, -1, -1, -1]);
    assert_eq!(agent.memory().len(), 1);

    let summary = agent.run_episode(1).unwrap();
    assert_eq!(summary.termination, Some(TerminationReason::InsufficientBalance));
    assert_eq!(agent.statistics().episodes["e1"].actions.len(), 5);
}

#[test]
fn fresh_run_refuses_used_checkpoint_dir() {
    let dir = scratch("used");
    let mut store = CheckpointStore::create(&dir).unwrap();
    let config = small_config();
    let mut agent = agent(&config, wavy_prices(40), [0.5, 0.5]);
    agent.train(0, 1, Some(&mut store)).unwrap();

    assert!(CheckpointStore::create(&dir).is_err());
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn sampled_starts_leave_room_for_the_episode() {
    let config = small_config();
    let sampler = EpisodeSampler::new(&config.sampler, config.state.window_size);
    let mut rng = StdRng::seed_from_u64(3);
    let len = 40;

    for episode in 0..200 {
        let start = sampler.sample(episode, len, &mut rng).unwrap();
        assert!(start >= config.state.window_size - 1);
        assert!(start + sampler.episode_window() < len);
    }
}

#[test]
fn soft_update_extremes() {
    let local = [1.0f32, -2.0, 3.5];

    let mut target = [0.5f32, 0.5, 0.5];
    soft_update(&mut target, &local, 0.0).unwrap();
    assert_eq!(target, [0.5, 0.5, 0.5]);

    soft_update(&mut target, &local, 1.0).unwrap();
    assert_eq!(target, local);
}

#[test]
fn evaluation_repeats_with_extra_cash() {
    let config = small_config();
    let prices: Vec<f64> = (1..=10).map(f64::from).collect();
    // Always pick the trade logit: sell when holding, buy when flat
    let mut agent = agent(&config, wavy_prices(40), [0.1, 0.9]);

    let report = agent
        .evaluate(&PriceSeries::new(prices, vec![]).unwrap())
        .unwrap();

    // Every buy of the first pass is short by exactly one
    assert_eq!(report.passes, 2);
    assert_eq!(report.extra_cash, 5.0);
    assert_eq!(report.trace.extra_cash, 0.0);
    assert!(report.trace.extra_cash_indices.is_empty());
    assert_eq!(report.trace.sell_indices, vec![0, 2, 4, 6, 8]);
    assert_eq!(report.trace.buy_indices, vec![1, 3, 5, 7]);
    // Cash equal to the price does not cover a buy, and is not corrected either
    assert_eq!(report.trace.impossible_indices, vec![9]);
}

#[test]
fn evaluation_without_shortfall_runs_once() {
    let config = small_config();
    let prices: Vec<f64> = (1..=10).map(f64::from).collect();
    let mut agent = agent(&config, wavy_prices(40), [0.9, 0.1]);

    let report = agent
        .evaluate(&PriceSeries::new(prices, vec![]).unwrap())
        .unwrap();

    assert_eq!(report.passes, 1);
    assert_eq!(report.extra_cash, 0.0);
    assert_eq!(report.summary.n_trades, 0);
    // Held the opening unit from 1 to 10
    assert_eq!(report.summary.final_growth, 9.0);
    assert_eq!(report.summary.final_compete, 0.0);
}

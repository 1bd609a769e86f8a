//! Configuration files shipped with the crate and rejected inputs

use ddpg_trader::{RewardVariant, RlError, RunConfig};
use std::env::temp_dir;
use std::fs;
use std::path::PathBuf;

fn write_config(name: &str, contents: &str) -> PathBuf {
    let dir = temp_dir().join(format!("ddpg-config-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("run.toml");
    fs::write(&path, contents).unwrap();
    path
}

const MINIMAL: &str = r#"
[agent]
buffer_size = 1000
batch_size = 16
gamma = 0.95
tau = 0.01
trade_cost = 1.5
terminal_threshold = 20

[reward]
variant = 6
hold_scale = 5.0
max_holds = 50.0
prob_power = 0.5

[reward.switch]
from = 6
to = 5
at_episode = 40

[state]
window_size = 21
tanh_scale = 40.0

[sampler]
offset = 200
expand = 10
episode_window = 50
episodes_per_step = 5

[training]
episodes = 100
checkpoint_dir = "./runs/minimal"
"#;

#[test]
fn shipped_defaults_load() {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/config");
    let config = RunConfig::load_from(dir).unwrap();
    assert_eq!(config.reward.variant, RewardVariant::ShapedHoldProfit);
    assert_eq!(config.agent.n_budget, 1);
    assert_eq!(config.network.critic_action_layers, vec![16]);
}

#[test]
fn minimal_file_fills_optional_sections() {
    let path = write_config("minimal", MINIMAL);
    let config = RunConfig::from_file(&path).unwrap();

    assert_eq!(config.reward.variant, RewardVariant::Confident);
    let switch = config.reward.switch.unwrap();
    assert_eq!(switch.to, RewardVariant::Dense);
    assert_eq!(switch.at_episode, 40);
    assert!(config.state.use_returns);
    assert!(!config.agent.early_termination);
    assert_eq!(config.agent.n_budget, 1);
    assert_eq!(config.network.actor_series_layers, vec![64, 32]);
    assert_eq!(config.logging.level, "info,ddpg_trader=debug");
    fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn unknown_keys_are_rejected() {
    let contents = MINIMAL.replace("tau = 0.01", "tau = 0.01\nepsilon = 0.2");
    let path = write_config("unknown", &contents);
    assert!(matches!(RunConfig::from_file(&path), Err(RlError::Config(_))));
    fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn out_of_range_variant_is_rejected() {
    let contents = MINIMAL.replace("variant = 6", "variant = 8");
    let path = write_config("variant", &contents);
    assert!(RunConfig::from_file(&path).is_err());
    fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn invalid_values_are_reported_together() {
    let contents = MINIMAL
        .replace("gamma = 0.95", "gamma = 1.5")
        .replace("window_size = 21", "window_size = 1");
    let path = write_config("invalid", &contents);
    match RunConfig::from_file(&path) {
        Err(RlError::Configuration(message)) => {
            assert!(message.contains("gamma"));
            assert!(message.contains("window_size"));
        }
        other => panic!("expected a configuration error, got {:?}", other.map(|_| ())),
    }
    fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

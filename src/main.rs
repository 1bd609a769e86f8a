use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use ddpg_trader::logging::init_logging;
use ddpg_trader::networks::build_networks;
use ddpg_trader::training::timestamped_name;
use ddpg_trader::{Agent, CheckpointStore, PriceSeries, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "ddpg-trader", version, about = "Single-asset DDPG trading agent")]
struct Cli {
    /// Configuration file; defaults to config/default.toml plus DDPG_ENV and DDPG__* overrides
    #[arg(short, long, global = true, env = "DDPG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train on a price series, checkpointing as configured
    Train {
        /// Price file: a JSON array of closes or {"close": [...], "newest_first": bool}
        #[arg(short, long)]
        prices: PathBuf,
        /// Override the configured checkpoint directory
        #[arg(long)]
        checkpoint_dir: Option<String>,
        /// Override the configured episode count
        #[arg(short, long)]
        episodes: Option<usize>,
        /// Resume after this saved episode; restores networks and replay buffer
        #[arg(long)]
        resume: Option<usize>,
    },
    /// Evaluate saved networks greedily over a price series
    Evaluate {
        #[arg(short, long)]
        prices: PathBuf,
        /// Checkpoint directory of the trained run
        #[arg(long)]
        checkpoint_dir: Option<String>,
        /// Saved episode to load; defaults to the latest
        #[arg(long)]
        episode: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RunConfig::load().context("loading configuration")?,
    };

    match cli.command {
        Commands::Train {
            prices,
            checkpoint_dir,
            episodes,
            resume,
        } => {
            if let Some(dir) = checkpoint_dir {
                config.training.checkpoint_dir = dir;
            }
            if let Some(episodes) = episodes {
                config.training.episodes = episodes;
            }
            if let Some(episode) = resume {
                config.training.start_episode = episode + 1;
            }
            let _guard = init_logging(&config.logging, Path::new(&config.training.checkpoint_dir));
            run_train(&config, &prices, resume)
        }
        Commands::Evaluate {
            prices,
            checkpoint_dir,
            episode,
        } => {
            if let Some(dir) = checkpoint_dir {
                config.training.checkpoint_dir = dir;
            }
            let _guard = init_logging(&config.logging, Path::new(&config.training.checkpoint_dir));
            run_evaluate(&config, &prices, episode)
        }
    }
}

fn run_train(config: &RunConfig, prices: &Path, resume: Option<usize>) -> anyhow::Result<()> {
    let series = PriceSeries::load_json(prices, config.state.window_size)
        .with_context(|| format!("loading prices from {}", prices.display()))?;
    info!(prices = series.len(), "Loaded training series");

    let series_len = config.state.window_size - 1;
    let nets = build_networks(&config.network, series_len, config.agent.seed)?;
    let mut agent = Agent::new(
        config,
        series,
        nets.actor_local,
        nets.actor_target,
        nets.critic_local,
        nets.critic_target,
    )?;

    let mut store = match resume {
        Some(episode) => {
            let store = CheckpointStore::open(&config.training.checkpoint_dir)?;
            agent.resume_from(&store, episode)?;
            store
        }
        None => CheckpointStore::create(&config.training.checkpoint_dir)?,
    };

    let summaries = agent.train(
        config.training.start_episode,
        config.training.episodes,
        Some(&mut store),
    )?;

    if let Some(last) = summaries.last() {
        println!(
            "Trained {} episodes; last: reward {:.3}, trades {}, growth {:.3}",
            summaries.len(),
            last.total_reward,
            last.n_trades,
            last.final_growth
        );
    }
    Ok(())
}

fn run_evaluate(config: &RunConfig, prices: &Path, episode: Option<usize>) -> anyhow::Result<()> {
    let store = CheckpointStore::open(&config.training.checkpoint_dir)?;
    let episode = match episode.or_else(|| store.latest_episode()) {
        Some(episode) => episode,
        None => bail!(
            "no saved episodes under {}",
            config.training.checkpoint_dir
        ),
    };

    let series = PriceSeries::load_json(prices, config.state.window_size)
        .with_context(|| format!("loading prices from {}", prices.display()))?;

    let series_len = config.state.window_size - 1;
    let nets = build_networks(&config.network, series_len, config.agent.seed)?;
    let mut agent = Agent::new(
        config,
        series.clone(),
        nets.actor_local,
        nets.actor_target,
        nets.critic_local,
        nets.critic_target,
    )?;
    agent.load_networks(&store, episode)?;

    let report = agent.evaluate(&series)?;
    let path = store.save_report(&timestamped_name(&format!("eval_e{episode}")), &report)?;

    println!(
        "Episode {} evaluation ({} pass{}): trades {}, growth {:.3}, vs buy-and-hold {:.3}",
        episode,
        report.passes,
        if report.passes == 1 { "" } else { "es" },
        report.summary.n_trades,
        report.summary.final_growth,
        report.summary.final_compete
    );
    println!("Report written to {}", path.display());
    Ok(())
}

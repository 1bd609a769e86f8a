//! Checkpointing
//!
//! Network parameters, the replay buffer and run statistics persisted as
//! JSON under a checkpoint directory:
//!
//! ```text
//! <dir>/e{episode}/{actor_local,actor_target,critic_local,critic_target}.json
//! <dir>/replay_buffer.json
//! <dir>/statistics.json
//! <dir>/reports/<name>.json
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

use super::stats::RunStatistics;
use crate::error::{Result, RlError};
use crate::memory::ReplaySnapshot;
use crate::networks::NetworkParams;

const REPLAY_FILE: &str = "replay_buffer.json";
const STATISTICS_FILE: &str = "statistics.json";
const REPORTS_DIR: &str = "reports";
/// Created by file logging before the store is opened
const LOGS_DIR: &str = "logs";

/// Storage for everything a resumed run needs
pub trait Persistence {
    fn save_networks(&mut self, episode: usize, params: &NetworkParams) -> Result<()>;

    /// Parameters saved for `episode`; missing files are `CheckpointNotFound`
    fn load_networks(&self, episode: usize) -> Result<NetworkParams>;

    fn save_buffer(&mut self, snapshot: &ReplaySnapshot) -> Result<()>;

    fn load_buffer(&self) -> Result<ReplaySnapshot>;

    fn save_statistics(&mut self, stats: &RunStatistics) -> Result<()>;

    fn load_statistics(&self) -> Result<RunStatistics>;
}

/// JSON file store rooted at a checkpoint directory
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    /// Store for a fresh run; refuses a directory that already holds results
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        if root.exists() {
            let occupied = fs::read_dir(&root)?
                .flatten()
                .any(|entry| entry.file_name() != LOGS_DIR);
            if occupied {
                return Err(RlError::CheckpointDirNotEmpty(root.display().to_string()));
            }
        } else {
            fs::create_dir_all(&root)?;
        }
        info!("Models will be saved to {:?}", root);
        Ok(Self { root })
    }

    /// Store of an existing run, for resuming or evaluation
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(RlError::CheckpointNotFound(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn episode_dir(&self, episode: usize) -> PathBuf {
        self.root.join(episode_name(episode))
    }

    /// Episodes with saved networks, ascending
    pub fn list_episodes(&self) -> Vec<usize> {
        let mut episodes: Vec<usize> = fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|entry| entry.path().is_dir())
                    .filter_map(|entry| {
                        entry
                            .file_name()
                            .to_str()
                            .and_then(|name| name.strip_prefix('e'))
                            .and_then(|n| n.parse().ok())
                    })
                    .collect()
            })
            .unwrap_or_default();
        episodes.sort_unstable();
        episodes
    }

    pub fn latest_episode(&self) -> Option<usize> {
        self.list_episodes().into_iter().last()
    }

    /// Write an arbitrary report to `reports/<name>.json`
    pub fn save_report<T: Serialize>(&self, name: &str, report: &T) -> Result<PathBuf> {
        let dir = self.root.join(REPORTS_DIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{name}.json"));
        write_json(&path, report)?;
        info!("Saved report to {:?}", path);
        Ok(path)
    }
}

impl Persistence for CheckpointStore {
    fn save_networks(&mut self, episode: usize, params: &NetworkParams) -> Result<()> {
        let dir = self.episode_dir(episode);
        fs::create_dir_all(&dir)?;
        for (role, values) in params.roles() {
            write_json(&dir.join(format!("{role}.json")), &values)?;
        }
        info!("Saved e{} networks to {:?}", episode, dir);
        Ok(())
    }

    fn load_networks(&self, episode: usize) -> Result<NetworkParams> {
        let dir = self.episode_dir(episode);
        let load = |role: &str| read_json::<Vec<f32>>(&dir.join(format!("{role}.json")));
        let params = NetworkParams {
            actor_local: load("actor_local")?,
            actor_target: load("actor_target")?,
            critic_local: load("critic_local")?,
            critic_target: load("critic_target")?,
        };
        info!("Loaded e{} networks from {:?}", episode, dir);
        Ok(params)
    }

    fn save_buffer(&mut self, snapshot: &ReplaySnapshot) -> Result<()> {
        write_json(&self.root.join(REPLAY_FILE), snapshot)
    }

    fn load_buffer(&self) -> Result<ReplaySnapshot> {
        read_json(&self.root.join(REPLAY_FILE))
    }

    fn save_statistics(&mut self, stats: &RunStatistics) -> Result<()> {
        write_json(&self.root.join(STATISTICS_FILE), stats)
    }

    fn load_statistics(&self) -> Result<RunStatistics> {
        read_json(&self.root.join(STATISTICS_FILE))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer(writer, value)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(RlError::CheckpointNotFound(path.display().to_string()));
    }
    let reader = BufReader::new(fs::File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Generate a name with timestamp
pub fn timestamped_name(prefix: &str) -> String {
    let now = chrono::Utc::now();
    format!("{}_{}", prefix, now.format("%Y%m%d_%H%M%S"))
}

/// Directory and statistics key of an episode
pub fn episode_name(episode: usize) -> String {
    format!("e{}", episode)
}

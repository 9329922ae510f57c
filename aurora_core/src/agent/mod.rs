//! Learning agents.
//!
//! Drivers only see [`Agent`] (learn, save, load, predict) and [`Exportable`];
//! [`ppo1::Ppo1Agent`] is the burn implementation.

pub mod buffer;
pub mod gaussian;
pub mod networks;
pub mod ppo1;
pub mod schedule;

use std::path::{Path, PathBuf};

pub use buffer::RolloutBuffer;
pub use ppo1::{Ppo1Agent, Ppo1Config};
pub use schedule::Schedule;

use crate::env::Environment;
use crate::error::Result;
use crate::export::ServingPolicy;

/// Summary of one `learn` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearnStats {
    pub timesteps: u64,
    pub episodes: usize,
    /// Mean return of episodes that finished during the call.
    pub mean_episode_reward: Option<f32>,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub action: Vec<f32>,
    /// Recurrent state; always `None` for feed-forward policies.
    pub state: Option<Vec<f32>>,
}

pub trait Agent {
    fn learn(&mut self, env: &mut dyn Environment, total_timesteps: u64) -> Result<LearnStats>;

    /// Persists the parameters at `path` (see [`checkpoint_file`]).
    fn save(&self, path: &Path) -> Result<()>;

    /// Loads parameters saved by [`Agent::save`], validated against `env`.
    fn load(&mut self, path: &Path, env: &dyn Environment) -> Result<()>;

    fn predict(&mut self, observation: &[f32], deterministic: bool) -> Result<Prediction>;
}

pub trait Exportable {
    fn serving_policy(&self) -> Result<ServingPolicy>;
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// File whose existence marks a saved checkpoint at `path`. The extension is
/// appended, so `run.v2` and `run.v3` stay distinct.
pub fn checkpoint_file(path: &Path) -> PathBuf {
    with_suffix(path, ".json")
}

/// Sidecar metadata written next to the checkpoint record.
pub fn checkpoint_meta_file(path: &Path) -> PathBuf {
    with_suffix(path, ".meta.json")
}

use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::agent::{checkpoint_file, Agent, Exportable, Ppo1Config, Schedule};
use crate::cli::RunConfig;
use crate::drivers::print_spaces;
use crate::env::{Environment, SessionGuard};
use crate::error::Result;
use crate::export::export_policy;

/// Timesteps of one learning iteration, one PPO1 actor batch.
pub const TIMESTEPS_PER_ACTORBATCH: usize = 8192;
pub const OPTIM_BATCHSIZE: usize = 2048;

/// Everything the agent builder gets; the builder captures nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub arch: Vec<usize>,
    pub gamma: f32,
    pub timesteps_per_actorbatch: usize,
    pub optim_batchsize: usize,
    pub schedule: Schedule,
    pub seed: u64,
    pub log_dir: PathBuf,
}

impl AgentSettings {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            arch: config.arch.clone(),
            gamma: config.gamma,
            timesteps_per_actorbatch: TIMESTEPS_PER_ACTORBATCH,
            optim_batchsize: OPTIM_BATCHSIZE,
            schedule: Schedule::Constant,
            seed: config.seed,
            log_dir: config.log_dir(),
        }
    }

    /// PPO1 hyperparameters with these settings over the library defaults.
    pub fn ppo1_config(&self) -> Ppo1Config {
        Ppo1Config {
            gamma: self.gamma,
            timesteps_per_actorbatch: self.timesteps_per_actorbatch,
            optim_batchsize: self.optim_batchsize,
            schedule: self.schedule,
            seed: self.seed,
            ..Ppo1Config::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveReport {
    pub iterations_run: usize,
    pub loaded_checkpoint: bool,
    pub evaluation_reward: Option<f32>,
    pub export_dir: Option<PathBuf>,
}

/// Train (or resume), optionally evaluate and export, then close the session.
///
/// The session is closed on every path: explicitly at the end, or by the
/// guard when an error returns early.
pub fn run_solver<E, A, F>(config: &RunConfig, env: E, build_agent: F, now: DateTime<Local>) -> Result<SolveReport>
where
    E: Environment,
    A: Agent + Exportable,
    F: FnOnce(&AgentSettings, &dyn Environment) -> Result<A>,
{
    let mut env = SessionGuard::new(env);
    let mut report = SolveReport::default();

    print_spaces(&*env);
    env.reset()?;

    let settings = AgentSettings::from_config(config);
    println!("gamma = {:.6}", settings.gamma);
    let mut agent = build_agent(&settings, &*env)?;

    let checkpoint = config.checkpoint_path();
    if checkpoint_file(&checkpoint).exists() {
        println!(">> Load SB Model... {}", checkpoint.display());
        agent.load(&checkpoint, &*env)?;
        report.loaded_checkpoint = true;
    }

    for iteration in 0..config.iterations {
        let stats = agent.learn(&mut *env, settings.timesteps_per_actorbatch as u64)?;
        tracing::info!(
            "iteration {}/{}: {} episodes, mean reward {:?}",
            iteration + 1,
            config.iterations,
            stats.episodes,
            stats.mean_episode_reward
        );
        println!(">> Save SB Model... {}", checkpoint.display());
        agent.save(&checkpoint)?;
        report.iterations_run += 1;
    }

    if config.test {
        let mut obs = env.reset()?;
        let mut acc_reward = 0.0f32;
        loop {
            let prediction = agent.predict(&obs, true)?;
            let step = env.step(&prediction.action)?;
            acc_reward += step.reward;
            if step.done {
                break;
            }
            obs = step.observation;
        }
        println!("Total reward: {}", acc_reward);
        report.evaluation_reward = Some(acc_reward);
    }

    if let Some(model_dir) = &config.model_dir {
        let policy = agent.serving_policy()?;
        let export_dir = export_policy(model_dir, &policy, &now)?;
        println!(">> Exported serving model to {}", export_dir.display());
        report.export_dir = Some(export_dir);
    }

    env.close()?;
    Ok(report)
}

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use aurora_core::agent::{Agent, Exportable, LearnStats, Prediction};
use aurora_core::env::{Dtype, Environment, Space, StepResult};
use aurora_core::export::{Activation, DenseLayer, ServingPolicy};
use aurora_core::utils::Interrupt;
use aurora_core::{AuroraError, Result};

#[derive(Debug, Default)]
pub struct EnvCalls {
    pub resets: usize,
    pub steps: usize,
    pub closes: usize,
    pub actions: Vec<Vec<f32>>,
}

/// Scripted environment: every episode lasts `episode_len` steps and pays
/// `reward` per step.
pub struct MockEnv {
    pub observation_space: Space,
    pub action_space: Space,
    pub episode_len: usize,
    pub reward: f32,
    pub calls: Arc<Mutex<EnvCalls>>,
    /// `(episode, step, token)`: the step-th step of the episode-th reset
    /// (both 1-based) fires the token and fails like an interrupted read.
    pub interrupt_at: Option<(usize, usize, Interrupt)>,
    /// Fail with a simulator error on this global step.
    pub fail_at_step: Option<usize>,
    step_in_episode: usize,
}

impl MockEnv {
    pub fn new(episode_len: usize, reward: f32) -> Self {
        Self {
            observation_space: Space::uniform_box(-10.0, 10.0, vec![2], Dtype::Float32),
            action_space: Space::uniform_box(-1.0, 1.0, vec![1], Dtype::Float32),
            episode_len,
            reward,
            calls: Arc::new(Mutex::new(EnvCalls::default())),
            interrupt_at: None,
            fail_at_step: None,
            step_in_episode: 0,
        }
    }

    pub fn calls(&self) -> Arc<Mutex<EnvCalls>> {
        self.calls.clone()
    }
}

impl Environment for MockEnv {
    fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    fn action_space(&self) -> &Space {
        &self.action_space
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        let mut calls = self.calls.lock().unwrap();
        calls.resets += 1;
        self.step_in_episode = 0;
        Ok(vec![0.0, 1.0])
    }

    fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        let mut calls = self.calls.lock().unwrap();
        self.step_in_episode += 1;
        if let Some((episode, step, token)) = &self.interrupt_at {
            if calls.resets == *episode && self.step_in_episode == *step {
                token.trigger();
                return Err(AuroraError::Interrupted);
            }
        }
        calls.steps += 1;
        if self.fail_at_step == Some(calls.steps) {
            return Err(AuroraError::Simulator("scripted crash".into()));
        }
        calls.actions.push(action.to_vec());
        Ok(StepResult {
            observation: vec![self.step_in_episode as f32, 1.0],
            reward: self.reward,
            done: self.step_in_episode >= self.episode_len,
            info: String::new(),
        })
    }

    fn close(&mut self) -> Result<()> {
        self.calls.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Agent that records the order of calls it receives.
pub struct MockAgent {
    pub log: Arc<Mutex<Vec<String>>>,
    pub fail_learn_at: Option<usize>,
    learns: usize,
}

impl MockAgent {
    pub fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            log,
            fail_learn_at: None,
            learns: 0,
        }
    }
}

impl Agent for MockAgent {
    fn learn(&mut self, env: &mut dyn Environment, total_timesteps: u64) -> Result<LearnStats> {
        self.learns += 1;
        if self.fail_learn_at == Some(self.learns) {
            return Err(AuroraError::Simulator("learn failed".into()));
        }
        env.reset()?;
        self.log.lock().unwrap().push(format!("learn:{}", total_timesteps));
        Ok(LearnStats {
            timesteps: total_timesteps,
            ..LearnStats::default()
        })
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.log.lock().unwrap().push(format!("save:{}", path.display()));
        Ok(())
    }

    fn load(&mut self, path: &Path, _env: &dyn Environment) -> Result<()> {
        self.log.lock().unwrap().push(format!("load:{}", path.display()));
        Ok(())
    }

    fn predict(&mut self, _observation: &[f32], deterministic: bool) -> Result<Prediction> {
        self.log.lock().unwrap().push(format!("predict:{}", deterministic));
        Ok(Prediction {
            action: vec![0.25],
            state: None,
        })
    }
}

impl Exportable for MockAgent {
    fn serving_policy(&self) -> Result<ServingPolicy> {
        Ok(ServingPolicy {
            layers: vec![DenseLayer::from_flat(&[1.0, 0.0], 2, vec![0.0], Activation::Identity)?],
            log_std: vec![0.0],
            observation_shape: vec![2],
            action_shape: vec![1],
            action_low: vec![-1.0],
            action_high: vec![1.0],
        })
    }
}

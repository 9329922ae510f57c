//! PPO1: single-process PPO with fixed-size actor batches.
//!
//! Each `learn` call resets the environment and collects segments of
//! `timesteps_per_actorbatch` steps. Episodes run across segment boundaries;
//! finished episodes reset the environment inside the segment. Every segment
//! is optimised for `optim_epochs` passes of shuffled minibatches with the
//! clipped surrogate, the value MSE and an entropy bonus.

use std::fs;
use std::path::Path;

use burn::module::{AutodiffModule, Module};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::record::{FullPrecisionSettings, PrettyJsonFileRecorder, Recorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::agent::buffer::RolloutBuffer;
use crate::agent::networks::ActorCritic;
use crate::agent::schedule::Schedule;
use crate::agent::{checkpoint_file, checkpoint_meta_file, gaussian, Agent, Exportable, LearnStats, Prediction};
use crate::env::{Environment, Space};
use crate::error::{AuroraError, Result};
use crate::export::{Activation, DenseLayer, ServingPolicy};
use crate::utils::ScalarLog;

const LN_2PI: f32 = 1.837_877_1;
const META_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ppo1Config {
    pub gamma: f32,
    pub lambda: f32,
    pub clip_param: f32,
    pub entcoeff: f32,
    pub optim_epochs: usize,
    pub optim_stepsize: f64,
    pub adam_epsilon: f32,
    pub timesteps_per_actorbatch: usize,
    pub optim_batchsize: usize,
    pub schedule: Schedule,
    pub seed: u64,
    pub verbose: u8,
}

impl Default for Ppo1Config {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            lambda: 0.95,
            clip_param: 0.2,
            entcoeff: 0.01,
            optim_epochs: 4,
            optim_stepsize: 1e-3,
            adam_epsilon: 1e-5,
            timesteps_per_actorbatch: 8192,
            optim_batchsize: 2048,
            schedule: Schedule::Constant,
            seed: 12,
            verbose: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointMeta {
    version: u32,
    arch: Vec<usize>,
    observation_space: Space,
    action_space: Space,
    config: Ppo1Config,
    num_timesteps: u64,
    episodes: u64,
}

type Adaptor<B> = OptimizerAdaptor<Adam, ActorCritic<B>, B>;

pub struct Ppo1Agent<B: AutodiffBackend> {
    config: Ppo1Config,
    arch: Vec<usize>,
    observation_space: Space,
    action_space: Space,
    model: ActorCritic<B>,
    optim: Adaptor<B>,
    device: B::Device,
    rng: StdRng,
    num_timesteps: u64,
    episodes: u64,
    scalars: Option<ScalarLog>,
}

fn tensor_readback<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| AuroraError::Recorder(format!("tensor readback failed: {:?}", e)))
}

fn tensor2<B: Backend>(values: Vec<f32>, shape: [usize; 2], device: &B::Device) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(values, shape).convert::<B::FloatElem>(), device)
}

fn gather(rows: &[Vec<f32>], idx: &[usize]) -> Vec<f32> {
    idx.iter().flat_map(|&i| rows[i].iter().copied()).collect()
}

fn gather_scalar(values: &[f32], idx: &[usize]) -> Vec<f32> {
    idx.iter().map(|&i| values[i]).collect()
}

/// Action mean and state value for one observation.
fn evaluate<B: Backend>(model: &ActorCritic<B>, obs: &[f32], device: &B::Device) -> Result<(Vec<f32>, f32)> {
    let x = tensor2::<B>(obs.to_vec(), [1, obs.len()], device);
    let mean = tensor_readback(model.actor.forward(x.clone()))?;
    let value = tensor_readback(model.critic.forward(x))?;
    Ok((mean, value.first().copied().unwrap_or(0.0)))
}

impl<B: AutodiffBackend> Ppo1Agent<B> {
    pub fn new(
        config: Ppo1Config,
        arch: &[usize],
        observation_space: &Space,
        action_space: &Space,
        log_dir: Option<&Path>,
        device: &B::Device,
    ) -> Result<Self> {
        if matches!(action_space, Space::Discrete { .. }) {
            return Err(AuroraError::UnsupportedSpace(format!(
                "{}: the Gaussian policy needs a Box action space",
                action_space
            )));
        }
        let model = ActorCritic::new(observation_space.flat_dim(), arch, action_space.flat_dim(), device);
        let optim = Self::optimizer(&config);
        let scalars = log_dir.map(ScalarLog::create).transpose()?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            arch: arch.to_vec(),
            observation_space: observation_space.clone(),
            action_space: action_space.clone(),
            model,
            optim,
            device: device.clone(),
            num_timesteps: 0,
            episodes: 0,
            scalars,
        })
    }

    /// Builds an agent for the spaces of `env`.
    pub fn for_env(
        config: Ppo1Config,
        arch: &[usize],
        env: &dyn Environment,
        log_dir: Option<&Path>,
        device: &B::Device,
    ) -> Result<Self> {
        Self::new(config, arch, env.observation_space(), env.action_space(), log_dir, device)
    }

    fn optimizer(config: &Ppo1Config) -> Adaptor<B> {
        AdamConfig::new().with_epsilon(config.adam_epsilon).init()
    }

    pub fn config(&self) -> &Ppo1Config {
        &self.config
    }

    pub fn arch(&self) -> &[usize] {
        &self.arch
    }

    pub fn num_timesteps(&self) -> u64 {
        self.num_timesteps
    }

    pub fn model(&self) -> &ActorCritic<B> {
        &self.model
    }

    fn log_scalar(&mut self, tag: &str, value: f64) {
        let step = self.num_timesteps;
        if let Some(scalars) = self.scalars.as_mut() {
            if let Err(e) = scalars.record(step, tag, value) {
                tracing::warn!("failed to write scalar {}: {}", tag, e);
            }
        }
    }

    fn flush_scalars(&mut self) {
        if let Some(scalars) = self.scalars.as_mut() {
            if let Err(e) = scalars.flush() {
                tracing::warn!("failed to flush {}: {}", scalars.path().display(), e);
            }
        }
    }

    fn check_observation(&self, obs: &[f32]) -> Result<()> {
        if obs.len() != self.observation_space.flat_dim() {
            return Err(AuroraError::protocol(format!(
                "observation has {} values, {} expects {}",
                obs.len(),
                self.observation_space,
                self.observation_space.flat_dim()
            )));
        }
        Ok(())
    }

    /// One clipped-surrogate step on the minibatch `idx`.
    fn update_minibatch(&mut self, buffer: &RolloutBuffer, idx: &[usize], lr: f64, clip: f32) -> Result<(f32, f32, f32)> {
        let m = idx.len();
        let obs_dim = self.observation_space.flat_dim();
        let act_dim = self.action_space.flat_dim();

        let obs = tensor2::<B>(gather(&buffer.observations, idx), [m, obs_dim], &self.device);
        let actions = tensor2::<B>(gather(&buffer.actions, idx), [m, act_dim], &self.device);
        let adv = tensor2::<B>(gather_scalar(&buffer.advantages, idx), [m, 1], &self.device);
        let ret = tensor2::<B>(gather_scalar(&buffer.returns, idx), [m, 1], &self.device);
        let old_logp = tensor2::<B>(gather_scalar(&buffer.log_probs, idx), [m, 1], &self.device);

        let model = self.model.clone();
        let mean = model.actor.forward(obs.clone());
        let log_std = model.actor.log_std().unsqueeze::<2>();
        let z = (actions - mean) / log_std.clone().exp();
        let logp = z
            .powf_scalar(2.0)
            .sum_dim(1)
            .mul_scalar(-0.5)
            .sub(log_std.clone().sum_dim(1))
            .sub_scalar(0.5 * act_dim as f32 * LN_2PI);

        let ratio = (logp - old_logp).exp();
        let surr1 = ratio.clone() * adv.clone();
        let surr2 = ratio.clamp(1.0 - clip, 1.0 + clip) * adv;
        let pol_surr = surr1.min_pair(surr2).mean().neg();

        let entropy = log_std.add_scalar(0.5 * (LN_2PI + 1.0)).sum();
        let pol_entpen = entropy.clone().mul_scalar(-self.config.entcoeff);

        let vpred = model.critic.forward(obs);
        let vf_loss = (vpred - ret).powf_scalar(2.0).mean();

        let loss = pol_surr.clone() + pol_entpen + vf_loss.clone();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        self.model = self.optim.step(lr, model, grads);

        let first = |v: Vec<f32>| v.first().copied().unwrap_or(0.0);
        Ok((
            first(tensor_readback(pol_surr)?),
            first(tensor_readback(vf_loss)?),
            first(tensor_readback(entropy)?),
        ))
    }
}

impl<B: AutodiffBackend> Agent for Ppo1Agent<B> {
    fn learn(&mut self, env: &mut dyn Environment, total_timesteps: u64) -> Result<LearnStats> {
        let horizon = self.config.timesteps_per_actorbatch.max(1);
        let mut stats = LearnStats::default();
        let mut finished = Vec::new();
        let mut episode_reward = 0.0f32;

        let mut obs = env.reset()?;
        self.check_observation(&obs)?;
        let mut episode_start = true;
        let mut timesteps_so_far = 0u64;
        let mut iteration = 0usize;

        while timesteps_so_far < total_timesteps {
            let lrmult = self.config.schedule.multiplier(timesteps_so_far, total_timesteps);
            let policy = self.model.valid();
            let inner_device = self.device.clone();
            let log_std = tensor_readback(policy.actor.log_std())?;
            let mut buffer = RolloutBuffer::with_capacity(horizon);

            for _ in 0..horizon {
                let (mean, value) = evaluate(&policy, &obs, &inner_device)?;
                let action = gaussian::sample(&mean, &log_std, &mut self.rng);
                let log_prob = gaussian::log_prob(&action, &mean, &log_std);
                let mut env_action = action.clone();
                self.action_space.clip(&mut env_action);

                let step = env.step(&env_action)?;
                self.num_timesteps += 1;
                episode_reward += step.reward;
                let next = if step.done {
                    finished.push(episode_reward);
                    self.episodes += 1;
                    self.log_scalar("episode_reward", episode_reward as f64);
                    episode_reward = 0.0;
                    env.reset()?
                } else {
                    step.observation
                };
                self.check_observation(&next)?;
                let current = std::mem::replace(&mut obs, next);
                buffer.push(current, action, step.reward, value, episode_start, log_prob);
                episode_start = step.done;
            }

            let (_, last_value) = evaluate(&policy, &obs, &inner_device)?;
            buffer.finish_path(self.config.gamma, self.config.lambda, last_value, episode_start);
            buffer.normalize_advantages();

            let n = buffer.len();
            let batch = self.config.optim_batchsize.clamp(1, n);
            let lr = self.config.optim_stepsize * lrmult;
            let clip = self.config.clip_param * lrmult as f32;
            let mut indices: Vec<usize> = (0..n).collect();
            for _ in 0..self.config.optim_epochs {
                indices.shuffle(&mut self.rng);
                let mut sums = (0.0f32, 0.0f32, 0.0f32);
                let mut count = 0usize;
                for chunk in indices.chunks_exact(batch) {
                    let (pol, vf, ent) = self.update_minibatch(&buffer, chunk, lr, clip)?;
                    sums = (sums.0 + pol, sums.1 + vf, sums.2 + ent);
                    count += 1;
                }
                if count > 0 {
                    let c = count as f32;
                    stats.policy_loss = sums.0 / c;
                    stats.value_loss = sums.1 / c;
                    stats.entropy = sums.2 / c;
                }
            }

            timesteps_so_far += n as u64;
            iteration += 1;
            self.log_scalar("loss/pol_surr", stats.policy_loss as f64);
            self.log_scalar("loss/vf_loss", stats.value_loss as f64);
            self.log_scalar("loss/entropy", stats.entropy as f64);
            self.flush_scalars();
            if self.config.verbose > 0 {
                tracing::info!(
                    "iteration {}: timesteps {} (total {}), episodes {}, pol_surr {:.5}, vf_loss {:.5}, entropy {:.5}",
                    iteration,
                    timesteps_so_far,
                    self.num_timesteps,
                    finished.len(),
                    stats.policy_loss,
                    stats.value_loss,
                    stats.entropy
                );
            }
        }

        stats.timesteps = timesteps_so_far;
        stats.episodes = finished.len();
        if !finished.is_empty() {
            stats.mean_episode_reward = Some(finished.iter().sum::<f32>() / finished.len() as f32);
        }
        Ok(stats)
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // The recorder swaps in its own extension, so give it the full file name.
        PrettyJsonFileRecorder::<FullPrecisionSettings>::new()
            .record(self.model.clone().into_record(), checkpoint_file(path))
            .map_err(|e| AuroraError::Checkpoint {
                path: checkpoint_file(path),
                reason: e.to_string(),
            })?;

        let meta = CheckpointMeta {
            version: META_VERSION,
            arch: self.arch.clone(),
            observation_space: self.observation_space.clone(),
            action_space: self.action_space.clone(),
            config: self.config.clone(),
            num_timesteps: self.num_timesteps,
            episodes: self.episodes,
        };
        fs::write(checkpoint_meta_file(path), serde_json::to_string_pretty(&meta)?)?;
        tracing::debug!("checkpoint saved to {}", checkpoint_file(path).display());
        Ok(())
    }

    fn load(&mut self, path: &Path, env: &dyn Environment) -> Result<()> {
        let meta_path = checkpoint_meta_file(path);
        let raw = fs::read_to_string(&meta_path).map_err(|e| AuroraError::Checkpoint {
            path: meta_path.clone(),
            reason: e.to_string(),
        })?;
        let meta: CheckpointMeta = serde_json::from_str(&raw).map_err(|e| AuroraError::Checkpoint {
            path: meta_path.clone(),
            reason: e.to_string(),
        })?;

        let mismatch = |reason: String| AuroraError::CheckpointMismatch {
            path: checkpoint_file(path),
            reason,
        };
        if meta.arch != self.arch {
            return Err(mismatch(format!(
                "saved with hidden layers {:?}, agent has {:?}",
                meta.arch, self.arch
            )));
        }
        for (what, saved, live) in [
            ("observation", &meta.observation_space, env.observation_space()),
            ("action", &meta.action_space, env.action_space()),
        ] {
            if saved.shape() != live.shape() || saved.flat_dim() != live.flat_dim() {
                return Err(mismatch(format!("saved {} space {}, environment has {}", what, saved, live)));
            }
        }

        let record = PrettyJsonFileRecorder::<FullPrecisionSettings>::new()
            .load(checkpoint_file(path), &self.device)
            .map_err(|e| AuroraError::Checkpoint {
                path: checkpoint_file(path),
                reason: e.to_string(),
            })?;
        self.model = self.model.clone().load_record(record);
        self.optim = Self::optimizer(&self.config);
        self.num_timesteps = meta.num_timesteps;
        self.episodes = meta.episodes;
        tracing::info!(
            "loaded checkpoint {} ({} timesteps)",
            checkpoint_file(path).display(),
            meta.num_timesteps
        );
        Ok(())
    }

    fn predict(&mut self, observation: &[f32], deterministic: bool) -> Result<Prediction> {
        self.check_observation(observation)?;
        let policy = self.model.valid();
        let (mean, _) = evaluate(&policy, observation, &self.device)?;
        let mut action = if deterministic {
            mean
        } else {
            let log_std = tensor_readback(policy.actor.log_std())?;
            gaussian::sample(&mean, &log_std, &mut self.rng)
        };
        self.action_space.clip(&mut action);
        Ok(Prediction { action, state: None })
    }
}

impl<B: AutodiffBackend> Exportable for Ppo1Agent<B> {
    fn serving_policy(&self) -> Result<ServingPolicy> {
        let actor = &self.model.actor;
        let count = actor.dense_layers().count();
        let mut layers = Vec::with_capacity(count);
        for (i, linear) in actor.dense_layers().enumerate() {
            let weight = linear.weight.val();
            let [d_in, d_out] = weight.dims();
            let weights = tensor_readback(weight)?;
            let bias = match &linear.bias {
                Some(bias) => tensor_readback(bias.val())?,
                None => vec![0.0; d_out],
            };
            let activation = if i + 1 == count {
                Activation::Identity
            } else {
                Activation::Tanh
            };
            layers.push(DenseLayer::from_flat(&weights, d_in, bias, activation)?);
        }
        let (action_low, action_high) = self
            .action_space
            .bounds()
            .map(|(lo, hi)| (lo.to_vec(), hi.to_vec()))
            .unwrap_or_default();
        Ok(ServingPolicy {
            layers,
            log_std: tensor_readback(actor.log_std())?,
            observation_shape: self.observation_space.shape(),
            action_shape: self.action_space.shape(),
            action_low,
            action_high,
        })
    }
}

//! ns-3 gym environment session.
//!
//! One `Ns3Env` owns the bridge socket, the simulator child process (when
//! it launched one) and a small tokio runtime that drives both. The public API
//! is synchronous: every call blocks on the runtime until the simulator
//! answers, or until the session's [`Interrupt`] fires.

use std::collections::BTreeMap;
use std::future::pending;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::runtime::Runtime;

use crate::env::bridge::Ns3Bridge;
use crate::env::launcher::SimLauncher;
use crate::env::messages::{DataContainer, EnvStateMsg};
use crate::env::{Environment, Space, StepResult};
use crate::error::{AuroraError, Result};
use crate::utils::Interrupt;

/// Grace period for the simulator to exit after a stop request.
pub const STOP_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct Ns3EnvConfig {
    /// Bridge port; `0` binds a free port and passes it to the launched simulator.
    pub port: u16,
    /// Seconds between environment steps, `0` when the scenario decides.
    pub step_time: f64,
    /// Launch the simulator ourselves instead of waiting for one started by hand.
    pub start_sim: bool,
    pub seed: u64,
    pub sim_args: BTreeMap<String, String>,
    pub debug: bool,
    pub sim_program: PathBuf,
    pub sim_script: String,
    /// Install a Ctrl-C watcher that fires the session's interrupt.
    pub watch_ctrl_c: bool,
}

impl Default for Ns3EnvConfig {
    fn default() -> Self {
        Self {
            port: 5555,
            step_time: 0.0,
            start_sim: true,
            seed: 12,
            sim_args: BTreeMap::new(),
            debug: false,
            sim_program: PathBuf::from("./ns3"),
            sim_script: "tcp-pcc-aurora".to_string(),
            watch_ctrl_c: false,
        }
    }
}

impl Ns3EnvConfig {
    fn launcher(&self, port: u16) -> SimLauncher {
        SimLauncher {
            program: self.sim_program.clone(),
            script: self.sim_script.clone(),
            port,
            seed: self.seed,
            step_time: self.step_time,
            sim_args: self.sim_args.clone(),
            debug: self.debug,
        }
    }
}

pub struct Ns3Env {
    config: Ns3EnvConfig,
    runtime: Runtime,
    interrupt: Interrupt,
    // Bound for the whole session; every simulator run connects to it.
    bridge: Option<Ns3Bridge>,
    launcher: Option<SimLauncher>,
    child: Option<Child>,
    observation_space: Space,
    action_space: Space,
    first_observation: Vec<f32>,
    // Set by the first step after a (re)start; the next reset restarts.
    dirty: bool,
    game_over: bool,
    // The simulator has sent a request and is blocked waiting for our answer.
    awaiting_reply: bool,
    closed: bool,
}

struct Episode {
    child: Option<Child>,
    observation_space: Space,
    action_space: Space,
    first_state: EnvStateMsg,
}

impl Ns3Env {
    /// Opens a session: binds the bridge, launches the simulator when asked
    /// to (or waits for one started by hand) and completes the init handshake
    /// so the spaces are known.
    pub fn connect(config: Ns3EnvConfig, interrupt: Interrupt) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("ns3-bridge")
            .enable_all()
            .build()?;
        if config.watch_ctrl_c {
            interrupt.watch_ctrl_c(runtime.handle());
        }

        let mut bridge = runtime.block_on(Ns3Bridge::bind(config.port, interrupt.clone()))?;
        let launcher = config.start_sim.then(|| config.launcher(bridge.port()));
        let episode = match runtime.block_on(start_episode(&mut bridge, launcher.as_ref())) {
            Ok(episode) => episode,
            Err(e) => {
                runtime.block_on(bridge.close());
                return Err(e);
            }
        };
        let first_observation = observation_of(&episode.first_state, &episode.observation_space)?;
        tracing::info!(
            "ns-3 session open on port {} (obs {}, act {})",
            bridge.port(),
            episode.observation_space,
            episode.action_space
        );
        Ok(Self {
            config,
            runtime,
            interrupt,
            bridge: Some(bridge),
            launcher,
            child: episode.child,
            observation_space: episode.observation_space,
            action_space: episode.action_space,
            first_observation,
            dirty: false,
            game_over: episode.first_state.is_game_over,
            awaiting_reply: true,
            closed: false,
        })
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn config(&self) -> &Ns3EnvConfig {
        &self.config
    }

    /// Port the bridge is bound to.
    pub fn port(&self) -> Option<u16> {
        self.bridge.as_ref().map(Ns3Bridge::port)
    }

    fn restart(&mut self) -> Result<()> {
        tracing::debug!("restarting simulator for a new episode");
        self.stop_simulator()?;
        let bridge = self
            .bridge
            .as_mut()
            .ok_or_else(|| AuroraError::Simulator("no simulator connection".into()))?;
        let episode = self.runtime.block_on(start_episode(bridge, self.launcher.as_ref()))?;
        self.child = episode.child;
        self.awaiting_reply = true;
        if episode.observation_space != self.observation_space || episode.action_space != self.action_space {
            return Err(AuroraError::protocol(format!(
                "simulator changed its spaces across a restart (obs {}, act {})",
                episode.observation_space, episode.action_space
            )));
        }
        self.first_observation = observation_of(&episode.first_state, &self.observation_space)?;
        self.game_over = episode.first_state.is_game_over;
        self.dirty = false;
        Ok(())
    }

    /// Answers a pending request with a stop, then reaps the launched
    /// simulator, killing it after [`STOP_GRACE`].
    fn stop_simulator(&mut self) -> Result<()> {
        let pending = std::mem::replace(&mut self.awaiting_reply, false);
        let child = self.child.take();
        let bridge = self.bridge.as_mut();
        self.runtime.block_on(async move {
            if let (true, Some(bridge)) = (pending, bridge) {
                match tokio::time::timeout(STOP_GRACE, bridge.send_stop()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::debug!("stop request not delivered: {}", e),
                    Err(_) => tracing::debug!("stop request not delivered within {:?}", STOP_GRACE),
                }
            }
            if let Some(mut child) = child {
                match tokio::time::timeout(STOP_GRACE, child.wait()).await {
                    Ok(Ok(status)) => tracing::debug!("simulator exited: {}", status),
                    Ok(Err(e)) => tracing::warn!("failed to wait for simulator: {}", e),
                    Err(_) => {
                        tracing::warn!("simulator still running after {:?}, killing it", STOP_GRACE);
                        child.kill().await?;
                    }
                }
            }
            Ok::<(), AuroraError>(())
        })
    }
}

/// Resolves when the launched simulator exits; never without one.
async fn exited(child: &mut Option<Child>) -> std::io::Result<ExitStatus> {
    match child {
        Some(child) => child.wait().await,
        None => pending().await,
    }
}

/// Launches the simulator if there is a launcher, then runs the init
/// handshake and reads the first state.
async fn start_episode(bridge: &mut Ns3Bridge, launcher: Option<&SimLauncher>) -> Result<Episode> {
    let mut child = match launcher {
        Some(launcher) => Some(launcher.spawn()?),
        None => {
            tracing::info!("waiting for a simulator on port {}", bridge.port());
            None
        }
    };

    let handshake = async {
        let init = bridge.initialize().await?;
        let first_state = bridge.recv_state().await?;
        Ok::<_, AuroraError>((init, first_state))
    };
    let (init, first_state) = tokio::select! {
        biased;
        result = handshake => result?,
        status = exited(&mut child) => {
            return Err(AuroraError::Simulator(format!(
                "simulator exited before the handshake: {}",
                status?
            )));
        }
    };

    let action_space = init
        .act_space
        .as_ref()
        .ok_or_else(|| AuroraError::protocol("init message without an action space"))?
        .to_space()?;
    let observation_space = init
        .obs_space
        .as_ref()
        .ok_or_else(|| AuroraError::protocol("init message without an observation space"))?
        .to_space()?;
    Ok(Episode {
        child,
        observation_space,
        action_space,
        first_state,
    })
}

fn observation_of(state: &EnvStateMsg, space: &Space) -> Result<Vec<f32>> {
    match &state.obs_data {
        Some(container) => {
            let obs = container.to_f32_vec()?;
            if obs.len() != space.flat_dim() {
                return Err(AuroraError::protocol(format!(
                    "observation has {} values, expected {} for {}",
                    obs.len(),
                    space.flat_dim(),
                    space
                )));
            }
            Ok(obs)
        }
        // The final state of a finished simulation may carry no observation.
        None => Ok(vec![0.0; space.flat_dim()]),
    }
}

impl Environment for Ns3Env {
    fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    fn action_space(&self) -> &Space {
        &self.action_space
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        if self.closed {
            return Err(AuroraError::Simulator("session is closed".into()));
        }
        if self.dirty {
            self.restart()?;
        }
        Ok(self.first_observation.clone())
    }

    fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        if self.closed {
            return Err(AuroraError::Simulator("session is closed".into()));
        }
        if self.game_over {
            return Err(AuroraError::EpisodeFinished);
        }
        if action.len() != self.action_space.flat_dim() {
            return Err(AuroraError::protocol(format!(
                "action has {} values, {} expects {}",
                action.len(),
                self.action_space,
                self.action_space.flat_dim()
            )));
        }
        let bridge = self
            .bridge
            .as_mut()
            .ok_or_else(|| AuroraError::Simulator("no simulator connection".into()))?;
        self.dirty = true;

        let child = &mut self.child;
        let act_data = DataContainer::for_action(&self.action_space, action);
        let state = self.runtime.block_on(async {
            bridge.send_action(act_data).await?;
            tokio::select! {
                biased;
                state = bridge.recv_state() => state,
                status = exited(child) => Err(AuroraError::Simulator(format!(
                    "simulator exited during the episode: {}",
                    status?
                ))),
            }
        });
        let state = match state {
            Ok(state) => state,
            Err(e) => {
                self.awaiting_reply = false;
                return Err(e);
            }
        };
        self.awaiting_reply = true;

        let observation = observation_of(&state, &self.observation_space)?;
        self.game_over = state.is_game_over;
        if state.is_game_over {
            tracing::debug!("simulation finished: reason {}, info {:?}", state.reason, state.info);
        }
        Ok(StepResult {
            observation,
            reward: state.reward,
            done: state.is_game_over,
            info: state.info,
        })
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        tracing::debug!("closing ns-3 session on port {:?}", self.port());
        let result = self.stop_simulator();
        if let Some(bridge) = self.bridge.take() {
            self.runtime.block_on(bridge.close());
        }
        result
    }
}

impl Drop for Ns3Env {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("error while dropping ns-3 session: {}", e);
        }
    }
}

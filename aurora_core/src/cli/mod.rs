// Command-line interface for the Aurora training and gym-test drivers
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::env::Ns3EnvConfig;
use crate::error::{AuroraError, Result};

#[derive(Parser, Debug, Clone)]
#[command(name = "aurora-solve")]
#[command(version)]
#[command(about = "Start congestion control solver and simulation script", long_about = None)]
pub struct SolveArgs {
    /// Start ns-3 simulation script 0/1
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub start: u8,

    /// Number of learning iterations
    #[arg(long, default_value_t = 0)]
    pub iterations: usize,

    /// Configuration of hidden layers, e.g. "32,16"
    #[arg(long, default_value = "32,16")]
    pub arch: String,

    /// Discount rate
    #[arg(long, default_value_t = 0.99)]
    pub gamma: f32,

    /// Base directory of the serving export; empty disables the export
    #[arg(long = "model-dir", default_value = "")]
    pub model_dir: String,

    /// Checkpoint name under the checkpoint directory
    #[arg(long = "sb-model-name", default_value = "checkpoint")]
    pub sb_model_name: String,

    /// Run one deterministic evaluation episode after training
    #[arg(long, default_value_t = false)]
    pub test: bool,

    /// Bridge port
    #[arg(long, default_value_t = 5555)]
    pub port: u16,

    /// Simulator and agent seed
    #[arg(long, default_value_t = 12)]
    pub seed: u64,

    /// ns-3 launcher program
    #[arg(long = "sim-program", default_value = "./ns3")]
    pub sim_program: PathBuf,

    /// ns-3 scenario to run
    #[arg(long = "sim-script", default_value = "tcp-pcc-aurora")]
    pub sim_script: String,

    #[arg(long = "checkpoint-dir", default_value = "./sb_saved_models")]
    pub checkpoint_dir: PathBuf,

    #[arg(long = "tensorboard-dir", default_value = "./tensorboard")]
    pub tensorboard_dir: PathBuf,

    /// Enable debug-level logging and show simulator output
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "aurora-gym-test")]
#[command(version)]
#[command(about = "Start simulation script on/off and step it with a fixed action", long_about = None)]
pub struct GymTestArgs {
    /// Start ns-3 simulation script 0/1
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub start: u8,

    /// Number of iterations
    #[arg(long, default_value_t = 1)]
    pub iterations: usize,

    #[arg(long, default_value_t = 5555)]
    pub port: u16,

    #[arg(long, default_value_t = 12)]
    pub seed: u64,

    #[arg(long = "sim-program", default_value = "./ns3")]
    pub sim_program: PathBuf,

    #[arg(long = "sim-script", default_value = "tcp-pcc-aurora")]
    pub sim_script: String,

    /// Simulated flow duration in seconds
    #[arg(long, default_value_t = 10)]
    pub duration: u64,

    /// Seconds between environment steps
    #[arg(long = "step-time", default_value_t = 0.5)]
    pub step_time: f64,

    /// Fixed action applied at every step
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub action: f32,

    /// Only query the spaces, reset once and exit
    #[arg(long, default_value_t = false)]
    pub probe: bool,

    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

/// Parses a comma-separated list of hidden layer widths.
///
/// An empty (or all-whitespace) string means no hidden layers.
pub fn parse_arch(input: &str) -> Result<Vec<usize>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    input
        .split(',')
        .map(|part| {
            let part = part.trim();
            match part.parse::<usize>() {
                Ok(0) => Err(AuroraError::InvalidArch {
                    input: input.to_string(),
                    reason: "layer widths must be positive".to_string(),
                }),
                Ok(width) => Ok(width),
                Err(e) => Err(AuroraError::InvalidArch {
                    input: input.to_string(),
                    reason: format!("{:?}: {}", part, e),
                }),
            }
        })
        .collect()
}

/// Training driver options, resolved once from [`SolveArgs`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub start_sim: bool,
    pub iterations: usize,
    pub arch: Vec<usize>,
    pub gamma: f32,
    pub model_dir: Option<PathBuf>,
    pub sb_model_name: String,
    pub test: bool,
    pub port: u16,
    pub seed: u64,
    pub sim_program: PathBuf,
    pub sim_script: String,
    pub checkpoint_dir: PathBuf,
    pub tensorboard_dir: PathBuf,
    pub debug: bool,
}

impl SolveArgs {
    pub fn into_config(self) -> Result<RunConfig> {
        let arch = parse_arch(&self.arch)?;
        Ok(RunConfig {
            start_sim: self.start == 1,
            iterations: self.iterations,
            arch,
            gamma: self.gamma,
            model_dir: if self.model_dir.is_empty() {
                None
            } else {
                Some(PathBuf::from(self.model_dir))
            },
            sb_model_name: self.sb_model_name,
            test: self.test,
            port: self.port,
            seed: self.seed,
            sim_program: self.sim_program,
            sim_script: self.sim_script,
            checkpoint_dir: self.checkpoint_dir,
            tensorboard_dir: self.tensorboard_dir,
            debug: self.debug,
        })
    }
}

impl RunConfig {
    /// Checkpoint location without extension.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_dir.join(&self.sb_model_name)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.tensorboard_dir.join(&self.sb_model_name)
    }

    /// Session settings: the scenario controls its own duration and step
    /// interval, test mode asks it for flow statistics.
    pub fn env_config(&self) -> Ns3EnvConfig {
        let mut sim_args = BTreeMap::new();
        sim_args.insert("--duration".to_string(), "0".to_string());
        if self.test {
            sim_args.insert("--test".to_string(), "1".to_string());
        }
        Ns3EnvConfig {
            port: self.port,
            step_time: 0.0,
            start_sim: self.start_sim,
            seed: self.seed,
            sim_args,
            debug: self.debug,
            sim_program: self.sim_program.clone(),
            sim_script: self.sim_script.clone(),
            watch_ctrl_c: false,
        }
    }
}

/// Manual step driver options, resolved once from [`GymTestArgs`].
#[derive(Debug, Clone, PartialEq)]
pub struct GymTestConfig {
    pub start_sim: bool,
    pub iterations: usize,
    pub port: u16,
    pub seed: u64,
    pub sim_program: PathBuf,
    pub sim_script: String,
    pub duration: u64,
    pub step_time: f64,
    pub action: f32,
    pub probe: bool,
    pub debug: bool,
}

impl From<GymTestArgs> for GymTestConfig {
    fn from(args: GymTestArgs) -> Self {
        Self {
            start_sim: args.start == 1,
            iterations: args.iterations,
            port: args.port,
            seed: args.seed,
            sim_program: args.sim_program,
            sim_script: args.sim_script,
            duration: args.duration,
            step_time: args.step_time,
            action: args.action,
            probe: args.probe,
            debug: args.debug,
        }
    }
}

impl GymTestConfig {
    pub fn env_config(&self) -> Ns3EnvConfig {
        let mut sim_args = BTreeMap::new();
        sim_args.insert("--duration".to_string(), self.duration.to_string());
        Ns3EnvConfig {
            port: self.port,
            step_time: self.step_time,
            start_sim: self.start_sim,
            seed: self.seed,
            sim_args,
            debug: self.debug,
            sim_program: self.sim_program.clone(),
            sim_script: self.sim_script.clone(),
            watch_ctrl_c: true,
        }
    }
}

/// The one console line describing the run; the rest goes to the log.
pub fn architecture_line(config: &RunConfig) -> String {
    format!("Architecture is: {:?}", config.arch)
}

pub fn print_configuration(config: &RunConfig) {
    println!("{}", architecture_line(config));
    tracing::info!(
        start_sim = config.start_sim,
        iterations = config.iterations,
        checkpoint = %config.checkpoint_path().display(),
        export_dir = ?config.model_dir,
        test = config.test,
        "run configuration"
    );
}

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::{AuroraError, Result};

/// Builds and spawns the ns-3 simulator command line.
#[derive(Debug, Clone, PartialEq)]
pub struct SimLauncher {
    pub program: PathBuf,
    pub script: String,
    pub port: u16,
    pub seed: u64,
    /// Seconds between steps; `0` leaves the interval to the scenario.
    pub step_time: f64,
    pub sim_args: BTreeMap<String, String>,
    pub debug: bool,
}

impl SimLauncher {
    /// The quoted scenario argument passed after `run`.
    pub fn command_line(&self) -> String {
        let mut line = format!(
            "{} --openGymPort={} --simSeed={}",
            self.script, self.port, self.seed
        );
        if self.step_time > 0.0 {
            line.push_str(&format!(" --envTimeStep={}", self.step_time));
        }
        for (key, value) in &self.sim_args {
            let key = key.trim_start_matches('-');
            line.push_str(&format!(" --{}={}", key, value));
        }
        line
    }

    /// Must be called from inside a tokio runtime.
    pub fn spawn(&self) -> Result<Child> {
        let line = self.command_line();
        tracing::info!("launching simulator: {} run \"{}\"", self.program.display(), line);
        let output = || if self.debug { Stdio::inherit() } else { Stdio::null() };
        Command::new(&self.program)
            .arg("run")
            .arg(&line)
            .stdin(Stdio::null())
            .stdout(output())
            .stderr(output())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AuroraError::Simulator(format!("failed to launch {}: {}", self.program.display(), e))
            })
    }
}

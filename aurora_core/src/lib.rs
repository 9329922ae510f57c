// Aurora PCC training drivers: ns-3 gym bridge, PPO1 agent, serving export

pub mod agent;
pub mod cli;
pub mod drivers;
pub mod env;
pub mod error;
pub mod export;
pub mod utils;

// Re-export main types
pub use agent::{Agent, Exportable, Ppo1Agent, Ppo1Config};
pub use cli::{GymTestConfig, RunConfig};
pub use drivers::{run_fixed_action, run_solver, GymTestReport, SolveReport};
pub use env::{Environment, Ns3Env, Ns3EnvConfig, SessionGuard, Space, StepResult};
pub use error::{AuroraError, Result};
pub use utils::Interrupt;

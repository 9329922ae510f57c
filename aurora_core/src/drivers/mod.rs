//! The two driver loops as library functions.
//!
//! Binaries build the concrete session and agent; the loops here only see
//! the [`crate::env::Environment`] and [`crate::agent::Agent`] seams.

pub mod solve;

pub use gym_test::{run_fixed_action, GymTestReport};
pub use solve::{run_solver, AgentSettings, SolveReport};

use crate::env::Environment;

pub(crate) fn print_spaces(env: &dyn Environment) {
    let ob_space = env.observation_space();
    let ac_space = env.action_space();
    println!("Observation space: {} {}", ob_space, ob_space.dtype());
    println!("Action space: {} {}", ac_space, ac_space.dtype());
}

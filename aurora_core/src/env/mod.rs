//! Stepping environments the drivers and the agent talk to.
//!
//! [`Environment`] is the narrow seam: space descriptors plus `reset`, `step`
//! and `close`. [`ns3_env::Ns3Env`] is the ns-3 gym implementation, and
//! [`SessionGuard`] makes sure a session is closed exactly once.

pub mod bridge;
pub mod launcher;
pub mod messages;
pub mod ns3_env;
pub mod session;
pub mod spaces;

pub use ns3_env::{Ns3Env, Ns3EnvConfig};
pub use session::SessionGuard;
pub use spaces::{Dtype, Space};

use crate::error::Result;

/// Outcome of a single environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub observation: Vec<f32>,
    pub reward: f32,
    pub done: bool,
    pub info: String,
}

pub trait Environment {
    fn observation_space(&self) -> &Space;

    fn action_space(&self) -> &Space;

    /// Starts a new episode and returns its first observation.
    fn reset(&mut self) -> Result<Vec<f32>>;

    fn step(&mut self, action: &[f32]) -> Result<StepResult>;

    /// Releases the session. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

impl<E: Environment + ?Sized> Environment for &mut E {
    fn observation_space(&self) -> &Space {
        (**self).observation_space()
    }

    fn action_space(&self) -> &Space {
        (**self).action_space()
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        (**self).reset()
    }

    fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        (**self).step(action)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

use serde::{Deserialize, Serialize};

/// Learning-rate multiplier schedule over one `learn` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Schedule {
    #[serde(rename = "constant")]
    #[default]
    Constant,
    #[serde(rename = "linear")]
    Linear,
}

impl Schedule {
    /// Multiplier after `done` of `total` timesteps.
    pub fn multiplier(self, done: u64, total: u64) -> f64 {
        match self {
            Schedule::Constant => 1.0,
            Schedule::Linear if total == 0 => 1.0,
            Schedule::Linear => (1.0 - done as f64 / total as f64).max(0.0),
        }
    }
}

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuroraError>;

#[derive(Debug, Error)]
pub enum AuroraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("failed to decode bridge message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("bridge protocol violation: {0}")]
    Protocol(String),

    #[error("simulator error: {0}")]
    Simulator(String),

    #[error("interrupted")]
    Interrupted,

    #[error("episode already finished, call reset() before stepping again")]
    EpisodeFinished,

    #[error("checkpoint error at {path}: {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error("checkpoint {path} does not match the agent: {reason}")]
    CheckpointMismatch { path: PathBuf, reason: String },

    #[error("recorder error: {0}")]
    Recorder(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("unsupported space {0}")]
    UnsupportedSpace(String),

    #[error("invalid architecture {input:?}: {reason}")]
    InvalidArch { input: String, reason: String },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AuroraError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

//! Error types for the pose pipeline.
//!
//! Each failure family gets its own enum so callers can match on exactly the
//! cases they can act on. None of these are fatal to a running pipeline except
//! [`PipelineError`], which only surfaces when a stage worker is lost.

use std::path::PathBuf;

/// Result alias for orchestrator-level operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure to turn an inbound image message into a canonical BGR8 frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported pixel encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("image has zero extent ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("row step {step} is shorter than one row of {row_bytes} bytes")]
    StepTooShort { step: usize, row_bytes: usize },

    #[error("image geometry {width}x{height} with row step {step} overflows the address space")]
    Oversized { width: u32, height: u32, step: usize },

    #[error("payload has {actual} bytes, expected at least {expected}")]
    PayloadTooShort { expected: usize, actual: usize },

    #[error("compressed image could not be decoded: {0}")]
    Compressed(#[from] image::ImageError),
}

/// Rejections from the goal controller.
#[derive(Debug, thiserror::Error)]
pub enum GoalError {
    #[error("goal {active} is still being processed")]
    Busy { active: String },

    #[error("goal image rejected: {0}")]
    Decode(#[from] DecodeError),

    #[error("pipeline is shutting down")]
    ShuttingDown,
}

/// Failures reported by a pose estimator implementation.
#[derive(Debug, thiserror::Error)]
pub enum EstimatorError {
    #[error("model could not be loaded from {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("inference wait was cancelled")]
    Cancelled,
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that stop the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{stage} stage worker is gone")]
    WorkerLost { stage: &'static str },

    #[error("pipeline is not running")]
    NotRunning,

    #[error("estimator initialisation failed: {0}")]
    Estimator(#[from] EstimatorError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

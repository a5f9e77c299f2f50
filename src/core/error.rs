use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Rejected task configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ntrials must be greater than zero")]
    NoTrials,

    #[error("ptrans must lie in (0.5, 1], got {0}")]
    TransitionProbability(f64),

    #[error("reward bounds must satisfy 0 <= low < high <= 1, got [{low}, {high}]")]
    RewardBounds { low: f64, high: f64 },

    #[error("{name} must be a positive finite number, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("{name} must be a non-negative finite number, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("{name} must not exceed {max} seconds, got {value}")]
    TooLong {
        name: &'static str,
        value: f64,
        max: f64,
    },

    #[error("{name} must be a probability in [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },

    #[error("reward path {path:?} lies outside [{low}, {high}]")]
    PathOutOfBounds { path: [f64; 4], low: f64, high: f64 },

    #[error("max_attempts must be at least ntrials ({ntrials}), got {max_attempts}")]
    AttemptCap { ntrials: u32, max_attempts: u32 },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure while writing or reading exported trial data.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: {message}")]
    Malformed { row: usize, message: String },
}

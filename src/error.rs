//! Error types for sleep staging

use thiserror::Error;

/// Errors that can occur while staging a recording
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid value {value:?} in column {column:?} at row {row}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Channel {0} has no valid samples")]
    EmptyChannel(&'static str),

    #[error("Recording contains no samples")]
    EmptyRecording,

    #[error("Time axis decreases at sample {index}: {previous} -> {current}")]
    NonMonotonicTime {
        index: usize,
        previous: f64,
        current: f64,
    },

    #[error("Non-finite timestamp at sample {0}")]
    NonFiniteTime(usize),

    #[error("No NREM epoch found at or after epoch {lead_in} ({epochs} epochs total)")]
    OnsetNotFound { lead_in: usize, epochs: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StagingError>;

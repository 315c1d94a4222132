//! Error types shared by the filter chain engine

use thiserror::Error;

/// Errors that can occur while configuring or driving the equalizer
///
/// None of these ever cross into the audio thread: an update that fails
/// leaves the previously installed coefficients untouched.
#[derive(Debug, Error)]
pub enum EqError {
    /// Sample rate was zero, negative or not finite
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    /// Maximum block size was zero
    #[error("Invalid block size: {0}")]
    InvalidBlockSize(usize),

    /// Cut filter order outside 1..=4, or not enough sections supplied
    #[error("Invalid cut filter order: {0} (expected 1..=4)")]
    InvalidOrder(usize),

    /// Slope choice index outside the four known slopes
    #[error("Invalid slope choice: {0}")]
    InvalidSlope(u32),

    /// Snapshot carried a value the filter design cannot use
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// `process` was called outside the prepared state
    #[error("Processor is not prepared")]
    NotPrepared,

    /// Host parameter identifier is not part of the layout
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// State blob could not be decoded
    #[error("State error: {0}")]
    State(#[from] serde_json::Error),

    /// Layout or engine configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, EqError>;

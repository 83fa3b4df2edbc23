use std::io;

use thiserror::Error;

/// Result type for sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Errors that can occur while planning or running a measurement
#[derive(Error, Debug)]
pub enum SweepError {
    /// A caller-supplied value is outside its valid domain
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An instrument rejected a command or stopped responding
    #[error("instrument '{instrument}' failed: {reason}")]
    Instrument { instrument: String, reason: String },

    /// The test plan is inconsistent with the requested test
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading the test plan or writing the report failed
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The test plan is not valid TOML for this crate
    #[error("could not parse test plan: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SweepError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SweepError::InvalidArgument(message.into())
    }

    pub fn instrument(instrument: impl Into<String>, reason: impl Into<String>) -> Self {
        SweepError::Instrument {
            instrument: instrument.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error came from the bench rather than from the plan
    pub fn is_instrument_failure(&self) -> bool {
        matches!(self, SweepError::Instrument { .. })
    }
}

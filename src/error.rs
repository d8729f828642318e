//! Error types for oscillator and control-circuit operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CpgError {
    /// NaN or Inf detected in an oscillator state or circuit activation.
    #[error("Numerical fault: non-finite values in {tensor}")]
    NumericalFault { tensor: String },

    /// Invalid configuration detected before any stepping begins.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CpgError {
    pub fn numerical(tensor: impl Into<String>) -> Self {
        Self::NumericalFault {
            tensor: tensor.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether the fault should end the current episode rather than the run.
    pub fn is_numerical(&self) -> bool {
        matches!(self, Self::NumericalFault { .. })
    }
}

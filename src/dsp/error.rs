use thiserror::Error;

/// Broad classes of decoder failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rates or factors that can never produce the requested output
    Configuration,
    /// Caller handed in sequences that break a precondition
    Input,
    /// Filter parameters that cannot be realized
    Numerical,
}

/// Errors raised by the PDM decoder and its filter design
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error(
        "PDM clock {source_rate} Hz / decimation {decimation} does not give {expected} Hz audio \
         (got {actual:.3} Hz)"
    )]
    RateMismatch {
        source_rate: u32,
        decimation: usize,
        expected: u32,
        actual: f64,
    },

    #[error("decimation factor must be at least 1")]
    ZeroDecimation,

    #[error("clock has {clk} samples but data has {dat}")]
    LengthMismatch { clk: usize, dat: usize },

    #[error("clock and data sequences are empty")]
    EmptyInput,

    #[error("{what}: need more than {needed} samples, got {got}")]
    TooShort {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("digital line {line} requested but capture has {available} lines")]
    LineOutOfRange { line: usize, available: usize },

    #[error("cutoff {cutoff_hz} Hz must lie in (0, {nyquist_hz}) Hz")]
    InvalidCutoff { cutoff_hz: f64, nyquist_hz: f64 },

    #[error("filter order must be at least 1")]
    InvalidOrder,

    #[error("filter section design failed: {0}")]
    FilterDesign(String),

    #[error(
        "low-pass step response not within {tolerance} after {samples} samples; \
         raise the cutoff or use a fixed trim"
    )]
    Unsettled { tolerance: f64, samples: usize },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::RateMismatch { .. } | DecodeError::ZeroDecimation => {
                ErrorKind::Configuration
            }
            DecodeError::LengthMismatch { .. }
            | DecodeError::EmptyInput
            | DecodeError::TooShort { .. }
            | DecodeError::LineOutOfRange { .. } => ErrorKind::Input,
            DecodeError::InvalidCutoff { .. }
            | DecodeError::InvalidOrder
            | DecodeError::FilterDesign(_)
            | DecodeError::Unsettled { .. } => ErrorKind::Numerical,
        }
    }
}

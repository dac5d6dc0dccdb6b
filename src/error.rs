use std::time::Duration;

use thiserror::Error;

/// Result type alias for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Failures a probe surfaces to its caller.
///
/// Anything not listed here degrades into unset fields inside the report.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The external facility (or the privilege it needs) is missing.
    #[error("{facility} unavailable: {reason}")]
    Unavailable {
        facility: &'static str,
        reason: String,
    },

    /// Cancelled before or while the probe ran.
    #[error("probe cancelled")]
    Cancelled,

    /// The facility did not finish within its deadline.
    #[error("{facility} did not finish within {}s", .timeout.as_secs())]
    DeadlineExceeded {
        facility: &'static str,
        timeout: Duration,
    },

    /// Rejected target or port specification.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The blocking task panicked or the worker pool was shut down.
    #[error("worker pool failure: {0}")]
    Worker(String),
}

impl ProbeError {
    pub fn unavailable(facility: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            facility,
            reason: reason.into(),
        }
    }
}

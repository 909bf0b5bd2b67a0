//! Error types for the single-flight controller

use thiserror::Error;
use tower::BoxError;

use crate::cancel::CancelReason;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, SingleFlightError>;

/// Main error type surfaced by `send`
#[derive(Debug, Error)]
pub enum SingleFlightError {
    /// The flight was cancelled before the transport settled
    #[error("request stopped: {reason}")]
    RequestStopped { reason: CancelReason },

    /// Transport-level failure, message passed through unchanged
    #[error("{0}")]
    Network(BoxError),
}

impl SingleFlightError {
    /// True for any cancellation, deadline or explicit stop alike.
    pub fn is_stopped(&self) -> bool {
        matches!(self, SingleFlightError::RequestStopped { .. })
    }

    /// True when the flight was cancelled by its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SingleFlightError::RequestStopped { reason } if reason.is_timeout()
        )
    }

    /// The cancellation reason, when this is a stop.
    pub fn reason(&self) -> Option<CancelReason> {
        match self {
            SingleFlightError::RequestStopped { reason } => Some(*reason),
            SingleFlightError::Network(_) => None,
        }
    }
}

//! Error types for device communication

use std::io;

/// Result type alias for device protocol calls
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Failure of one request/response exchange with a device
///
/// Transport failures (`Transport`, `Timeout`, `Truncated`) are safe for a
/// caller to retry. `Device` means the device answered and rejected the
/// command; retrying will not help.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Connect, write or read failed (refused, reset, ...)
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The exchange did not finish within the configured timeout
    #[error("device did not answer in time")]
    Timeout,

    /// The peer closed the connection before the full response arrived
    #[error("truncated response: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    /// The response arrived but could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The request could not be encoded (e.g. too many tracks for one byte)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The device answered with a non-success status code
    #[error("device error code {code}: {message}")]
    Device { code: u8, message: String },
}

impl DeviceError {
    /// Whether the failure happened below the protocol (worth another attempt)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DeviceError::Transport(_) | DeviceError::Timeout | DeviceError::Truncated { .. }
        )
    }

    /// Status code reported by the device, if the device answered
    pub fn device_code(&self) -> Option<u8> {
        match self {
            DeviceError::Device { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Failure while fetching a load sample from the HTTP status endpoint
#[derive(Debug, thiserror::Error)]
pub enum LoadStatusError {
    #[error("load status transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("load status HTTP error: {0}")]
    Http(u16),

    #[error("failed to parse load status: {0}")]
    Parse(String),
}

impl LoadStatusError {
    pub fn is_transport(&self) -> bool {
        matches!(self, LoadStatusError::Transport(_))
    }
}
